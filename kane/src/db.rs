//! The database handle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use kv::{EngineConfig, Kv};

use crate::error::Result;

/// Handle to a kane store.
///
/// Cheap to clone; every clone shares the same engine. All methods take
/// `&self`, so a single handle can serve any number of concurrent readers
/// and writers.
#[derive(Clone)]
pub struct Db {
    pub(crate) kv: Arc<dyn Kv>,
}

impl Db {
    /// Opens the store named by a connection string
    /// (`tikv://…`, `slate://…`, `memory://`).
    pub async fn connect(cancel: &CancellationToken, uri: &str) -> Result<Self> {
        Ok(Self {
            kv: kv::connect(cancel, uri).await?,
        })
    }

    /// Opens the store selected by an [`EngineConfig`].
    pub async fn open(cancel: &CancellationToken, config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            kv: kv::open(cancel, config).await?,
        })
    }

    /// Wraps an already-open engine.
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    /// Direct access to the underlying engine, for tooling that works on
    /// raw keys (backup, debug dumps).
    pub fn engine(&self) -> &Arc<dyn Kv> {
        &self.kv
    }

    /// Liveness probe against the engine.
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<()> {
        Ok(self.kv.ping(cancel).await?)
    }

    /// Releases engine resources.
    pub async fn close(&self) -> Result<()> {
        Ok(self.kv.close().await?)
    }
}
