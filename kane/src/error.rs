//! Error types for document operations.

/// Error type for document operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No live document matched, or a key lookup came back empty.
    NotFound,
    /// `put` found a live document under the same primary key.
    Conflict(String),
    /// User input the key schema cannot hold: `0xFF` bytes, oversized
    /// indexable strings, a primary key that is too short, and the like.
    InvalidInput(String),
    /// A stored record could not be decoded.
    Encoding(String),
    /// A failure propagated from the key/value engine.
    Engine(kv::Error),
    /// The cancellation handle fired mid-operation.
    Cancelled,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound => write!(f, "not found"),
            Error::Conflict(msg) => write!(f, "conflict: {}", msg),
            Error::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Error::Encoding(msg) => write!(f, "encoding error: {}", msg),
            Error::Engine(e) => write!(f, "engine error: {}", e),
            Error::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl From<kv::Error> for Error {
    fn from(err: kv::Error) -> Self {
        match err {
            kv::Error::NotFound => Error::NotFound,
            kv::Error::Cancelled => Error::Cancelled,
            other => Error::Engine(other),
        }
    }
}

/// Result type alias for document operations.
pub type Result<T> = std::result::Result<T, Error>;
