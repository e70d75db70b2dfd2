//! Embedded engine backed by SlateDB on the local filesystem.
//!
//! SlateDB offers no compare-and-swap of its own, so the engine holds a
//! process-wide reader/writer lock: every plain operation takes it shared and
//! [`Kv::cas`] takes it exclusive, making the read-compare-write sequence
//! atomic with respect to all other operations on this handle.
//!
//! Vector time is an in-memory counter seeded from a snapshot persisted under
//! the reserved `_`-namespace key. Every 100 ticks the counter is flushed
//! asynchronously; on open the stored value plus 100 becomes the new floor,
//! so a crash can skip tokens but never re-issue one.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use slatedb::config::{PutOptions, WriteOptions};
use slatedb::object_store::local::LocalFileSystem;
use slatedb::object_store::memory::InMemory;
use slatedb::object_store::path::Path as StorePath;
use slatedb::object_store::ObjectStore;
use slatedb::Db;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{ensure_live, successor, Error, Kv, KvIter, KvKeyIter, Record, Result, VECTOR_TIME_KEY};

/// How many vector-time ticks pass between persisted snapshots. On open the
/// stored snapshot is advanced by the same amount so a crash cannot reuse a
/// token that was already handed out.
const VECTOR_TIME_GAP: u64 = 100;

/// Keys fetched per shared-lock acquisition during a range scan.
const SCAN_BATCH: usize = 100;

struct SlateInner {
    db: Db,
    lock: tokio::sync::RwLock<()>,
    vector_time: AtomicU64,
}

/// Embedded [`Kv`] implementation over SlateDB.
pub struct SlateEngine {
    inner: Arc<SlateInner>,
}

fn durable() -> WriteOptions {
    let mut options = WriteOptions::default();
    options.await_durable = true;
    options
}

impl SlateEngine {
    /// Opens (or creates) an embedded store rooted at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(Error::from_storage)?;
        let object_store: Arc<dyn ObjectStore> =
            Arc::new(LocalFileSystem::new_with_prefix(path).map_err(Error::from_storage)?);
        Self::open_with_object_store(object_store).await
    }

    /// Opens a store over an in-memory object store. Nothing is persisted;
    /// intended for tests.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_with_object_store(Arc::new(InMemory::new())).await
    }

    async fn open_with_object_store(object_store: Arc<dyn ObjectStore>) -> Result<Self> {
        let db = Db::open(StorePath::from("kane"), object_store)
            .await
            .map_err(Error::from_storage)?;

        // Seed the counter past anything a previous incarnation may have
        // handed out before crashing.
        let mut start = 0;
        if let Some(stored) = db.get(VECTOR_TIME_KEY).await.map_err(Error::from_storage)? {
            if stored.len() == 8 {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&stored);
                start = u64::from_le_bytes(buf) + VECTOR_TIME_GAP;
            }
        }

        Ok(Self {
            inner: Arc::new(SlateInner {
                db,
                lock: tokio::sync::RwLock::new(()),
                vector_time: AtomicU64::new(start),
            }),
        })
    }
}

impl SlateInner {
    /// Fetches the next batch of records starting at `cursor`, holding the
    /// shared lock only for the duration of the batch.
    async fn scan_batch(
        &self,
        cursor: &[u8],
        end: Option<&[u8]>,
    ) -> Result<Vec<Record>> {
        let _shared = self.lock.read().await;
        let start = Bytes::copy_from_slice(cursor);
        let mut iter = match end {
            Some(e) => self
                .db
                .scan(start..Bytes::copy_from_slice(e))
                .await
                .map_err(Error::from_storage)?,
            None => self.db.scan(start..).await.map_err(Error::from_storage)?,
        };
        let mut batch = Vec::with_capacity(SCAN_BATCH);
        while batch.len() < SCAN_BATCH {
            match iter.next().await.map_err(Error::from_storage)? {
                Some(kv) => batch.push(Record::new(kv.key, kv.value)),
                None => break,
            }
        }
        Ok(batch)
    }
}

struct SlateIter {
    inner: Arc<SlateInner>,
    cancel: CancellationToken,
    cursor: Vec<u8>,
    end: Option<Vec<u8>>,
    buffer: std::collections::VecDeque<Record>,
    exhausted: bool,
}

impl SlateIter {
    async fn advance(&mut self) -> Result<Option<Record>> {
        loop {
            ensure_live(&self.cancel)?;
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }
            let batch = self
                .inner
                .scan_batch(&self.cursor, self.end.as_deref())
                .await?;
            match batch.last() {
                Some(last) => self.cursor = successor(&last.key),
                None => self.exhausted = true,
            }
            if batch.len() < SCAN_BATCH {
                self.exhausted = true;
            }
            self.buffer.extend(batch);
        }
    }
}

#[async_trait]
impl KvIter for SlateIter {
    async fn next(&mut self) -> Result<Option<Record>> {
        self.advance().await
    }
}

struct SlateKeyIter {
    inner: SlateIter,
}

#[async_trait]
impl KvKeyIter for SlateKeyIter {
    async fn next(&mut self) -> Result<Option<Bytes>> {
        Ok(self.inner.advance().await?.map(|r| r.key))
    }
}

#[async_trait]
impl Kv for SlateEngine {
    async fn ping(&self, cancel: &CancellationToken) -> Result<()> {
        ensure_live(cancel)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, cancel: &CancellationToken, key: &[u8]) -> Result<Bytes> {
        ensure_live(cancel)?;
        let _shared = self.inner.lock.read().await;
        self.inner
            .db
            .get(key)
            .await
            .map_err(Error::from_storage)?
            .ok_or(Error::NotFound)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn set(&self, cancel: &CancellationToken, key: &[u8], value: &[u8]) -> Result<()> {
        ensure_live(cancel)?;
        let _shared = self.inner.lock.read().await;
        self.inner
            .db
            .put_with_options(key, value, &PutOptions::default(), &durable())
            .await
            .map_err(Error::from_storage)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn del(&self, cancel: &CancellationToken, key: &[u8]) -> Result<()> {
        ensure_live(cancel)?;
        let _shared = self.inner.lock.read().await;
        self.inner
            .db
            .delete_with_options(key, &durable())
            .await
            .map_err(Error::from_storage)
    }

    async fn batch_get(&self, cancel: &CancellationToken, keys: &[Vec<u8>]) -> Result<Vec<Bytes>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            match self.get(cancel, key).await {
                Ok(value) => values.push(value),
                Err(Error::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(values)
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
        // Exclusive: no reader or writer may interleave with the
        // read-compare-write below.
        let _exclusive = self.inner.lock.write().await;

        let current = self
            .inner
            .db
            .get(key)
            .await
            .map_err(Error::from_storage)?;
        let matches = match (&current, expected) {
            (None, None) => true,
            (Some(cur), Some(exp)) => cur.as_ref() == exp,
            _ => false,
        };
        if !matches {
            return Ok((current, false));
        }
        self.inner
            .db
            .put_with_options(key, new, &PutOptions::default(), &durable())
            .await
            .map_err(Error::from_storage)?;
        Ok((None, true))
    }

    async fn iter(
        &self,
        cancel: &CancellationToken,
        start: Vec<u8>,
        end: Option<Vec<u8>>,
    ) -> Result<Box<dyn KvIter>> {
        ensure_live(cancel)?;
        Ok(Box::new(SlateIter {
            inner: self.inner.clone(),
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
        Ok(Box::new(SlateKeyIter {
            inner: SlateIter {
                inner: self.inner.clone(),
                cancel: cancel.clone(),
                cursor: start,
                end,
                buffer: std::collections::VecDeque::new(),
                exhausted: false,
            },
        }))
    }

    async fn vector_time(&self, cancel: &CancellationToken) -> Result<u64> {
        ensure_live(cancel)?;
        let next = self.inner.vector_time.fetch_add(1, Ordering::SeqCst) + 1;
        if next % VECTOR_TIME_GAP == 0 {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                let snapshot = next.to_le_bytes();
                if let Err(e) = inner
                    .db
                    .put_with_options(
                        VECTOR_TIME_KEY,
                        &snapshot,
                        &PutOptions::default(),
                        &WriteOptions::default(),
                    )
                    .await
                {
                    warn!(error = %e, "failed to persist vector time snapshot");
                }
            });
        }
        Ok(next)
    }

    async fn close(&self) -> Result<()> {
        self.inner.db.flush().await.map_err(Error::from_storage)?;
        self.inner.db.close().await.map_err(Error::from_storage)
    }
}
