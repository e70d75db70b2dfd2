//! Engine selection and connection-string parsing.
//!
//! Connection strings follow `scheme://host[:port][/path]`:
//!
//! - `tikv://127.0.0.1:2379` — TiKV placement-driver endpoint (the default).
//! - `slate:///var/lib/kane` — embedded SlateDB store; host and path form
//!   the data directory.
//! - `memory://` — in-memory engine.
//!
//! Unknown schemes fall back to the distributed engine.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{ensure_live, Error, Kv, MemoryEngine, Result, SlateEngine, TikvEngine};

/// Connection string used when none is configured.
pub const DEFAULT_URI: &str = "tikv://127.0.0.1:2379";

/// Which engine to open, plus its backend-specific settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineConfig {
    /// TiKV cluster reached through the given PD endpoints.
    Tikv { pd_endpoints: Vec<String> },
    /// Embedded SlateDB store rooted at the given directory.
    Slate { path: PathBuf },
    /// In-memory engine; nothing survives the process.
    InMemory,
}

impl EngineConfig {
    /// Parses a connection string. Unknown schemes select the distributed
    /// engine with the whole authority as its endpoint.
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| Error::Storage(format!("invalid connection string: {:?}", uri)))?;
        match scheme {
            "slate" => {
                if rest.is_empty() {
                    return Err(Error::Storage(
                        "slate connection string is missing a data directory".to_string(),
                    ));
                }
                Ok(EngineConfig::Slate {
                    path: PathBuf::from(rest),
                })
            }
            "memory" => Ok(EngineConfig::InMemory),
            _ => Ok(EngineConfig::Tikv {
                pd_endpoints: vec![rest.to_string()],
            }),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::parse(DEFAULT_URI).expect("default connection string parses")
    }
}

impl std::str::FromStr for EngineConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Opens the engine selected by `config`.
pub async fn open(cancel: &CancellationToken, config: &EngineConfig) -> Result<Arc<dyn Kv>> {
    ensure_live(cancel)?;
    match config {
        EngineConfig::Tikv { pd_endpoints } => {
            let engine = TikvEngine::connect(pd_endpoints.clone()).await?;
            Ok(Arc::new(engine))
        }
        EngineConfig::Slate { path } => {
            let engine = SlateEngine::open(path).await?;
            Ok(Arc::new(engine))
        }
        EngineConfig::InMemory => Ok(Arc::new(MemoryEngine::new())),
    }
}

/// Parses `uri` and opens the engine it names.
pub async fn connect(cancel: &CancellationToken, uri: &str) -> Result<Arc<dyn Kv>> {
    let config = EngineConfig::parse(uri)?;
    open(cancel, &config).await
}
