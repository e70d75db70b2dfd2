//! Distributed engine backed by a TiKV cluster.
//!
//! Point operations and compare-and-swap go through the raw client with
//! atomic mode enabled (CAS is undefined without it). Vector time comes from
//! the placement driver's timestamp oracle, composed from its physical and
//! logical parts, which makes it strictly monotonic across every process
//! talking to the same cluster.

use async_trait::async_trait;
use bytes::Bytes;
use tikv_client::{BoundRange, Key, KvPair, RawClient, TimestampExt, TransactionClient, Value};
use tokio_util::sync::CancellationToken;

use crate::{ensure_live, Error, Kv, KvIter, KvKeyIter, Record, Result};

/// Keys fetched per scan request.
const SCAN_BATCH: u32 = 100;

/// Distributed [`Kv`] implementation over TiKV.
pub struct TikvEngine {
    raw: RawClient,
    txn: TransactionClient,
}

impl TikvEngine {
    /// Connects to the cluster through the given PD endpoints.
    pub async fn connect(pd_endpoints: Vec<String>) -> Result<Self> {
        let raw = RawClient::new(pd_endpoints.clone())
            .await
            .map_err(Error::from_storage)?
            .with_atomic_for_cas();
        let txn = TransactionClient::new(pd_endpoints)
            .await
            .map_err(Error::from_storage)?;
        Ok(Self { raw, txn })
    }

    fn range(start: &[u8], end: Option<&[u8]>) -> BoundRange {
        let start = Key::from(start.to_vec());
        match end {
            Some(end) => BoundRange::from(start..Key::from(end.to_vec())),
            None => BoundRange::from(start..),
        }
    }
}

/// Advances a scan cursor past `last` the way the TiKV scan protocol resumes:
/// the final byte is incremented, or `0x00` is appended when it is already
/// `0xFF`.
fn advance_cursor(last: &[u8]) -> Vec<u8> {
    let mut cursor = last.to_vec();
    match cursor.last_mut() {
        Some(byte) if *byte == 0xFF => cursor.push(0x00),
        Some(byte) => *byte += 1,
        None => cursor.push(0x00),
    }
    cursor
}

struct TikvIter {
    raw: RawClient,
    cancel: CancellationToken,
    cursor: Vec<u8>,
    end: Option<Vec<u8>>,
    buffer: std::collections::VecDeque<Record>,
    exhausted: bool,
}

impl TikvIter {
    async fn advance(&mut self) -> Result<Option<Record>> {
        loop {
            ensure_live(&self.cancel)?;
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }
            let range = TikvEngine::range(&self.cursor, self.end.as_deref());
            let pairs = self
                .raw
                .scan(range, SCAN_BATCH)
                .await
                .map_err(Error::from_storage)?;
            if pairs.is_empty() {
                self.exhausted = true;
                continue;
            }
            let mut last_key: Vec<u8> = Vec::new();
            for pair in pairs {
                let (key, value): (Key, Value) = pair.into();
                let key: Vec<u8> = key.into();
                last_key = key.clone();
                self.buffer
                    .push_back(Record::new(Bytes::from(key), Bytes::from(value)));
            }
            self.cursor = advance_cursor(&last_key);
        }
    }
}

#[async_trait]
impl KvIter for TikvIter {
    async fn next(&mut self) -> Result<Option<Record>> {
        self.advance().await
    }
}

struct TikvKeyIter {
    raw: RawClient,
    cancel: CancellationToken,
    cursor: Vec<u8>,
    end: Option<Vec<u8>>,
    buffer: std::collections::VecDeque<Bytes>,
    exhausted: bool,
}

#[async_trait]
impl KvKeyIter for TikvKeyIter {
    async fn next(&mut self) -> Result<Option<Bytes>> {
        loop {
            ensure_live(&self.cancel)?;
            if let Some(key) = self.buffer.pop_front() {
                return Ok(Some(key));
            }
            if self.exhausted {
                return Ok(None);
            }
            let range = TikvEngine::range(&self.cursor, self.end.as_deref());
            let keys = self
                .raw
                .scan_keys(range, SCAN_BATCH)
                .await
                .map_err(Error::from_storage)?;
            if keys.is_empty() {
                self.exhausted = true;
                continue;
            }
            let mut last_key: Vec<u8> = Vec::new();
            for key in keys {
                let key: Vec<u8> = key.into();
                last_key = key.clone();
                self.buffer.push_back(Bytes::from(key));
            }
            self.cursor = advance_cursor(&last_key);
        }
    }
}

#[async_trait]
impl Kv for TikvEngine {
    async fn ping(&self, cancel: &CancellationToken) -> Result<()> {
        ensure_live(cancel)?;
        self.txn
            .current_timestamp()
            .await
            .map(|_| ())
            .map_err(Error::from_storage)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, cancel: &CancellationToken, key: &[u8]) -> Result<Bytes> {
        ensure_live(cancel)?;
        self.raw
            .get(key.to_vec())
            .await
            .map_err(Error::from_storage)?
            .map(Bytes::from)
            .ok_or(Error::NotFound)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn set(&self, cancel: &CancellationToken, key: &[u8], value: &[u8]) -> Result<()> {
        ensure_live(cancel)?;
        self.raw
            .put(key.to_vec(), value.to_vec())
            .await
            .map_err(Error::from_storage)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn del(&self, cancel: &CancellationToken, key: &[u8]) -> Result<()> {
        ensure_live(cancel)?;
        self.raw
            .delete(key.to_vec())
            .await
            .map_err(Error::from_storage)
    }

    async fn batch_get(&self, cancel: &CancellationToken, keys: &[Vec<u8>]) -> Result<Vec<Bytes>> {
        ensure_live(cancel)?;
        let pairs: Vec<KvPair> = self
            .raw
            .batch_get(keys.iter().cloned())
            .await
            .map_err(Error::from_storage)?;
        Ok(pairs
            .into_iter()
            .map(|pair| {
                let (_, value): (Key, Value) = pair.into();
                Bytes::from(value)
            })
            .collect())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn cas(
        &self,
        cancel: &CancellationToken,
        key: &[u8],
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<(Option<Bytes>, bool)> {
        ensure_live(cancel)?;
        let (observed, swapped) = self
            .raw
            .compare_and_swap(key.to_vec(), expected.map(|e| e.to_vec()), new.to_vec())
            .await
            .map_err(Error::from_storage)?;
        Ok((observed.map(Bytes::from), swapped))
    }

    async fn iter(
        &self,
        cancel: &CancellationToken,
        start: Vec<u8>,
        end: Option<Vec<u8>>,
    ) -> Result<Box<dyn KvIter>> {
        ensure_live(cancel)?;
        Ok(Box::new(TikvIter {
            raw: self.raw.clone(),
            cancel: cancel.clone(),
            cursor: start,
            end,
            buffer: std::collections::VecDeque::new(),
            exhausted: false,
        }))
    }

    async fn iter_keys(
        &self,
        cancel: &CancellationToken,
        start: Vec<u8>,
        end: Option<Vec<u8>>,
    ) -> Result<Box<dyn KvKeyIter>> {
        ensure_live(cancel)?;
        Ok(Box::new(TikvKeyIter {
            raw: self.raw.clone(),
            cancel: cancel.clone(),
            cursor: start,
            end,
            buffer: std::collections::VecDeque::new(),
            exhausted: false,
        }))
    }

    async fn vector_time(&self, cancel: &CancellationToken) -> Result<u64> {
        ensure_live(cancel)?;
        let ts = self
            .txn
            .current_timestamp()
            .await
            .map_err(Error::from_storage)?;
        Ok(ts.version())
    }

    async fn close(&self) -> Result<()> {
        // Clients release their PD connections on drop.
        Ok(())
    }
}
