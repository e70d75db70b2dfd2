//! Ordered key/value engine contract for kane.
//!
//! The [`Kv`] trait is the narrow waist the document layer builds on: a
//! lexicographically ordered byte map with point reads and writes, half-open
//! range scans, a single-key compare-and-swap, and a strictly monotonic
//! timestamp source. Three backends implement it:
//!
//! - [`TikvEngine`]: a TiKV cluster in raw atomic mode (the default).
//! - [`SlateEngine`]: an embedded SlateDB store on the local filesystem.
//! - [`MemoryEngine`]: a `BTreeMap`, for tests and ephemeral use.
//!
//! All operations take a [`CancellationToken`]; long-running scans and retry
//! loops observe it between steps. Engines are shared as `Arc<dyn Kv>` and
//! every operation is re-entrant.

pub mod config;
mod memory;
mod slate;
mod tikv;

pub use config::{connect, open, EngineConfig};
pub use memory::MemoryEngine;
pub use slate::SlateEngine;
pub use tikv::TikvEngine;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

/// Error type for engine operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested key is not present.
    NotFound,
    /// Any failure reported by the underlying store.
    Storage(String),
    /// The cancellation handle fired before the operation completed.
    Cancelled,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound => write!(f, "key not found"),
            Error::Storage(msg) => write!(f, "storage error: {}", msg),
            Error::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl Error {
    /// Wraps any displayable engine failure as [`Error::Storage`].
    pub fn from_storage(e: impl std::fmt::Display) -> Self {
        Error::Storage(e.to_string())
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A key/value pair yielded by a range scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// Pull-based iterator over key/value pairs.
///
/// Dropping the iterator releases any engine resources it holds.
#[async_trait]
pub trait KvIter: Send {
    async fn next(&mut self) -> Result<Option<Record>>;
}

/// Pull-based iterator over keys only.
#[async_trait]
pub trait KvKeyIter: Send {
    async fn next(&mut self) -> Result<Option<Bytes>>;
}

/// The ordered byte-map contract shared by all backends.
///
/// Range scans are half-open `[start, end)`; `end = None` means "to the end
/// of the keyspace". [`Kv::set`] and [`Kv::del`] are idempotent and durable
/// before returning. [`Kv::cas`] is the only multi-step atomic primitive the
/// document layer may assume.
#[async_trait]
pub trait Kv: Send + Sync {
    /// Liveness probe against the underlying store.
    async fn ping(&self, cancel: &CancellationToken) -> Result<()>;

    /// Reads one key. Returns [`Error::NotFound`] when absent.
    ///
    /// The returned [`Bytes`] is a refcounted buffer; holding it does not
    /// block the engine.
    async fn get(&self, cancel: &CancellationToken, key: &[u8]) -> Result<Bytes>;

    /// Durable idempotent overwrite.
    async fn set(&self, cancel: &CancellationToken, key: &[u8], value: &[u8]) -> Result<()>;

    /// Durable idempotent delete.
    async fn del(&self, cancel: &CancellationToken, key: &[u8]) -> Result<()>;

    /// Reads many keys at once. Absent keys are omitted from the result and
    /// callers must not rely on ordering.
    async fn batch_get(&self, cancel: &CancellationToken, keys: &[Vec<u8>]) -> Result<Vec<Bytes>>;

    /// Single-key atomic compare-and-swap.
    ///
    /// With `expected = None` the swap succeeds only when the key is absent;
    /// otherwise only when the stored value equals `expected`. Returns
    /// `(observed, swapped)`; on failure `observed` carries the currently
    /// stored value (or `None` when the key is absent) so the caller can
    /// retry from it.
    async fn cas(
        &self,
        cancel: &CancellationToken,
        key: &[u8],
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<(Option<Bytes>, bool)>;

    /// Scans key/value pairs in `[start, end)`.
    async fn iter(
        &self,
        cancel: &CancellationToken,
        start: Vec<u8>,
        end: Option<Vec<u8>>,
    ) -> Result<Box<dyn KvIter>>;

    /// Scans keys only in `[start, end)`.
    async fn iter_keys(
        &self,
        cancel: &CancellationToken,
        start: Vec<u8>,
        end: Option<Vec<u8>>,
    ) -> Result<Box<dyn KvKeyIter>>;

    /// Returns a strictly monotonic 64-bit token. Sequential calls observe
    /// strictly increasing values, across every handle to the same store.
    async fn vector_time(&self, cancel: &CancellationToken) -> Result<u64>;

    /// Releases engine resources. The handle must not be used afterwards.
    async fn close(&self) -> Result<()>;
}

/// Returns `Err(Cancelled)` once the token has fired.
pub(crate) fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Reserved key holding the embedded engine's persisted vector time.
pub(crate) const VECTOR_TIME_KEY: &[u8] = &[b'_', 0xFF, b'v', b't', b's'];

/// Smallest key strictly greater than `key`: `key` plus a `0x00` byte.
pub(crate) fn successor(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0x00);
    next
}
