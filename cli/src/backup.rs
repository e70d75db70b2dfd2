//! Raw key/value backup stream.
//!
//! A backup starts with the magic header `KANE1\n`, then one frame per pair:
//! big-endian u64 key length, the key, big-endian u64 value length, the
//! value. Restoring replays every frame as a plain `set`, so a restore into
//! an empty store reproduces the keyspace byte for byte.

use std::io::{Read, Write};

use anyhow::{bail, Context};
use tokio_util::sync::CancellationToken;

/// Backup stream magic header.
pub const MAGIC: &[u8] = b"KANE1\n";

/// Streams every key/value pair in the store to `out`.
pub async fn write_backup(
    cancel: &CancellationToken,
    kv: &dyn kv::Kv,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    out.write_all(MAGIC)?;
    let mut iter = kv.iter(cancel, vec![0x00], None).await?;
    while let Some(record) = iter.next().await? {
        out.write_all(&(record.key.len() as u64).to_be_bytes())?;
        out.write_all(&record.key)?;
        out.write_all(&(record.value.len() as u64).to_be_bytes())?;
        out.write_all(&record.value)?;
    }
    out.flush()?;
    Ok(())
}

/// Replays a backup stream into the store. Returns the number of pairs
/// restored.
pub async fn read_backup(
    cancel: &CancellationToken,
    kv: &dyn kv::Kv,
    input: &mut impl Read,
) -> anyhow::Result<u64> {
    let mut header = [0u8; 6];
    input
        .read_exact(&mut header)
        .context("reading backup header")?;
    if header != MAGIC {
        bail!("invalid backup format");
    }

    let mut count = 0u64;
    loop {
        let mut len = [0u8; 8];
        match input.read_exact(&mut len) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("reading key length"),
        }
        let mut key = vec![0u8; u64::from_be_bytes(len) as usize];
        input.read_exact(&mut key).context("reading key")?;

        input
            .read_exact(&mut len)
            .context("reading value length")?;
        let mut value = vec![0u8; u64::from_be_bytes(len) as usize];
        input.read_exact(&mut value).context("reading value")?;

        kv.set(cancel, &key, &value).await?;
        count += 1;
    }
    Ok(count)
}
