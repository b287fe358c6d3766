//! Error types for storage areas.

use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by storage-area implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The storage area cannot be used at all (disabled, quota, detached).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// An individual read or write failed.
    #[error("storage io error: {0}")]
    Io(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}
