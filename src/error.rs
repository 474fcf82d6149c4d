//! Error types for the unified cache
//!
//! Provides unified error handling using thiserror. Only the disk tier and
//! `CacheManager::open` surface these; the facade degrades every failure to
//! "treat as absent".

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem failure in the disk tier
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload, header or statistics blob could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A disk blob exists but does not describe a valid entry
    #[error("Corrupt blob: {0}")]
    Corrupt(String),

    /// A blocking worker panicked or was cancelled
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Worker(err.to_string())
    }
}

impl From<tempfile::PersistError> for CacheError {
    fn from(err: tempfile::PersistError) -> Self {
        CacheError::Io(err.error)
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
