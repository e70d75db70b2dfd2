//! In-memory engine backed by a `BTreeMap`.
//!
//! Useful for tests and ephemeral stores. The map lives under a
//! `std::sync::RwLock` (no await point ever holds it) and vector time is a
//! plain atomic counter.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::{ensure_live, Error, Kv, KvIter, KvKeyIter, Record, Result};

/// In-memory [`Kv`] implementation.
pub struct MemoryEngine {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Bytes>>>,
    vector_time: AtomicU64,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            vector_time: AtomicU64::new(0),
        }
    }

    fn read_map(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<Vec<u8>, Bytes>>> {
        self.data
            .read()
            .map_err(|e| Error::Storage(format!("failed to acquire read lock: {}", e)))
    }

    fn write_map(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Bytes>>> {
        self.data
            .write()
            .map_err(|e| Error::Storage(format!("failed to acquire write lock: {}", e)))
    }

    /// Snapshots all records in `[start, end)` in key order.
    fn snapshot_range(&self, start: Vec<u8>, end: Option<Vec<u8>>) -> Result<Vec<Record>> {
        let data = self.read_map()?;
        let upper = match end {
            Some(e) => Bound::Excluded(e),
            None => Bound::Unbounded,
        };
        Ok(data
            .range((Bound::Included(start), upper))
            .map(|(k, v)| Record::new(Bytes::copy_from_slice(k), v.clone()))
            .collect())
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryIter {
    records: std::vec::IntoIter<Record>,
    cancel: CancellationToken,
}

#[async_trait]
impl KvIter for MemoryIter {
    async fn next(&mut self) -> Result<Option<Record>> {
        ensure_live(&self.cancel)?;
        Ok(self.records.next())
    }
}

struct MemoryKeyIter {
    inner: MemoryIter,
}

#[async_trait]
impl KvKeyIter for MemoryKeyIter {
    async fn next(&mut self) -> Result<Option<Bytes>> {
        Ok(self.inner.next().await?.map(|r| r.key))
    }
}

#[async_trait]
impl Kv for MemoryEngine {
    async fn ping(&self, cancel: &CancellationToken) -> Result<()> {
        ensure_live(cancel)
    }

    async fn get(&self, cancel: &CancellationToken, key: &[u8]) -> Result<Bytes> {
        ensure_live(cancel)?;
        self.read_map()?.get(key).cloned().ok_or(Error::NotFound)
    }

    async fn set(&self, cancel: &CancellationToken, key: &[u8], value: &[u8]) -> Result<()> {
        ensure_live(cancel)?;
        self.write_map()?
            .insert(key.to_vec(), Bytes::copy_from_slice(value));
        Ok(())
    }

    async fn del(&self, cancel: &CancellationToken, key: &[u8]) -> Result<()> {
        ensure_live(cancel)?;
        self.write_map()?.remove(key);
        Ok(())
    }

    async fn batch_get(&self, cancel: &CancellationToken, keys: &[Vec<u8>]) -> Result<Vec<Bytes>> {
        ensure_live(cancel)?;
        let data = self.read_map()?;
        Ok(keys
            .iter()
            .filter_map(|k| data.get(k.as_slice()).cloned())
            .collect())
    }

    async fn cas(
        &self,
        cancel: &CancellationToken,
        key: &[u8],
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<(Option<Bytes>, bool)> {
        ensure_live(cancel)?;
        let mut data = self.write_map()?;
        let current = data.get(key).cloned();
        let matches = match (&current, expected) {
            (None, None) => true,
            (Some(cur), Some(exp)) => cur.as_ref() == exp,
            _ => false,
        };
        if !matches {
            return Ok((current, false));
        }
        data.insert(key.to_vec(), Bytes::copy_from_slice(new));
        Ok((None, true))
    }

    async fn iter(
        &self,
        cancel: &CancellationToken,
        start: Vec<u8>,
        end: Option<Vec<u8>>,
    ) -> Result<Box<dyn KvIter>> {
        ensure_live(cancel)?;
        let records = self.snapshot_range(start, end)?;
        Ok(Box::new(MemoryIter {
            records: records.into_iter(),
            cancel: cancel.clone(),
        }))
    }

    async fn iter_keys(
        &self,
        cancel: &CancellationToken,
        start: Vec<u8>,
        end: Option<Vec<u8>>,
    ) -> Result<Box<dyn KvKeyIter>> {
        ensure_live(cancel)?;
        let records = self.snapshot_range(start, end)?;
        Ok(Box::new(MemoryKeyIter {
            inner: MemoryIter {
                records: records.into_iter(),
                cancel: cancel.clone(),
            },
        }))
    }

    async fn vector_time(&self, cancel: &CancellationToken) -> Result<u64> {
        ensure_live(cancel)?;
        Ok(self.vector_time.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn should_get_what_was_set() {
        // given
        let kv = MemoryEngine::new();
        let c = cancel();

        // when
        kv.set(&c, b"k", b"v").await.unwrap();
        let value = kv.get(&c, b"k").await.unwrap();

        // then
        assert_eq!(value, Bytes::from_static(b"v"));
    }

    #[tokio::test]
    async fn should_return_not_found_for_missing_key() {
        // given
        let kv = MemoryEngine::new();

        // when
        let result = kv.get(&cancel(), b"missing").await;

        // then
        assert_eq!(result, Err(Error::NotFound));
    }

    #[tokio::test]
    async fn should_delete_idempotently() {
        // given
        let kv = MemoryEngine::new();
        let c = cancel();
        kv.set(&c, b"k", b"v").await.unwrap();

        // when
        kv.del(&c, b"k").await.unwrap();
        kv.del(&c, b"k").await.unwrap();

        // then
        assert_eq!(kv.get(&c, b"k").await, Err(Error::NotFound));
    }

    #[tokio::test]
    async fn should_omit_missing_keys_from_batch_get() {
        // given
        let kv = MemoryEngine::new();
        let c = cancel();
        kv.set(&c, b"a", b"1").await.unwrap();
        kv.set(&c, b"c", b"3").await.unwrap();

        // when
        let values = kv
            .batch_get(&c, &[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
            .await
            .unwrap();

        // then
        assert_eq!(values.len(), 2);
    }

    #[tokio::test]
    async fn should_cas_only_when_key_absent_and_no_value_expected() {
        // given
        let kv = MemoryEngine::new();
        let c = cancel();

        // when
        let (observed, swapped) = kv.cas(&c, b"k", None, b"v1").await.unwrap();

        // then
        assert!(swapped);
        assert!(observed.is_none());
        assert_eq!(kv.get(&c, b"k").await.unwrap(), Bytes::from_static(b"v1"));
    }

    #[tokio::test]
    async fn should_fail_cas_and_report_observed_value() {
        // given
        let kv = MemoryEngine::new();
        let c = cancel();
        kv.set(&c, b"k", b"v1").await.unwrap();

        // when - expecting absence
        let (observed, swapped) = kv.cas(&c, b"k", None, b"v2").await.unwrap();

        // then
        assert!(!swapped);
        assert_eq!(observed, Some(Bytes::from_static(b"v1")));

        // when - expecting the wrong value
        let (observed, swapped) = kv.cas(&c, b"k", Some(b"nope"), b"v2").await.unwrap();

        // then
        assert!(!swapped);
        assert_eq!(observed, Some(Bytes::from_static(b"v1")));

        // when - expecting the observed value
        let (_, swapped) = kv.cas(&c, b"k", Some(b"v1"), b"v2").await.unwrap();

        // then
        assert!(swapped);
        assert_eq!(kv.get(&c, b"k").await.unwrap(), Bytes::from_static(b"v2"));
    }

    #[tokio::test]
    async fn should_scan_half_open_range_in_order() {
        // given
        let kv = MemoryEngine::new();
        let c = cancel();
        for key in [b"a", b"b", b"c", b"d"] {
            kv.set(&c, key, b"v").await.unwrap();
        }

        // when
        let mut iter = kv
            .iter(&c, b"b".to_vec(), Some(b"d".to_vec()))
            .await
            .unwrap();
        let mut keys = vec![];
        while let Some(record) = iter.next().await.unwrap() {
            keys.push(record.key);
        }

        // then
        assert_eq!(keys, vec![Bytes::from_static(b"b"), Bytes::from_static(b"c")]);
    }

    #[tokio::test]
    async fn should_scan_to_end_of_keyspace_when_unbounded() {
        // given
        let kv = MemoryEngine::new();
        let c = cancel();
        kv.set(&c, &[0x01], b"low").await.unwrap();
        kv.set(&c, &[0xFF, 0xFF], b"high").await.unwrap();

        // when
        let mut iter = kv.iter_keys(&c, vec![0x00], None).await.unwrap();
        let mut count = 0;
        while iter.next().await.unwrap().is_some() {
            count += 1;
        }

        // then
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn should_issue_strictly_increasing_vector_time() {
        // given
        let kv = MemoryEngine::new();
        let c = cancel();

        // when
        let mut last = 0;
        for _ in 0..1000 {
            let next = kv.vector_time(&c).await.unwrap();
            // then
            assert!(next > last);
            last = next;
        }
    }

    #[tokio::test]
    async fn should_fail_with_cancelled_after_token_fires() {
        // given
        let kv = MemoryEngine::new();
        let c = cancel();
        c.cancel();

        // when / then
        assert_eq!(kv.get(&c, b"k").await, Err(Error::Cancelled));
        assert_eq!(kv.set(&c, b"k", b"v").await, Err(Error::Cancelled));
    }
}
