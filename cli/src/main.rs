//! Command-line tooling for kane databases.

mod backup;

use std::io::Write;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use kane::Db;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "kane", about = "CLI for kane databases")]
struct Args {
    /// Connection string; falls back to $KANE_CONNECT, then the TiKV default.
    #[arg(short, long)]
    connect: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dump raw keys for debug
    Debug,
    /// Dump raw kv for backup
    Backup,
    /// Restore database from a backup on stdin
    Restore,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let uri = args
        .connect
        .or_else(|| std::env::var("KANE_CONNECT").ok())
        .unwrap_or_else(|| kv::config::DEFAULT_URI.to_string());

    let cancel = CancellationToken::new();
    let db = Db::connect(&cancel, &uri).await?;

    let result = run(&cancel, &db, args.command).await;
    db.close().await?;
    result
}

async fn run(cancel: &CancellationToken, db: &Db, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Debug => {
            let mut stdout = std::io::stdout().lock();
            let mut iter = db.engine().iter_keys(cancel, vec![0x00], None).await?;
            while let Some(key) = iter.next().await? {
                writeln!(stdout, "{}", escape_non_printable(&key))?;
            }
            Ok(())
        }
        Command::Backup => {
            let mut stdout = std::io::stdout().lock();
            backup::write_backup(cancel, db.engine().as_ref(), &mut stdout).await
        }
        Command::Restore => {
            let mut stdin = std::io::stdin().lock();
            let count = backup::read_backup(cancel, db.engine().as_ref(), &mut stdin).await?;
            println!("Restored {} key/values", count);
            Ok(())
        }
    }
}

/// Renders a raw key for the terminal, escaping every byte outside printable
/// ASCII as `\xNN`.
fn escape_non_printable(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (32..=126).contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{:02x}", b));
        }
    }
    out
}
