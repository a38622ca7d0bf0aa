//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Keys must stay inside the store root and outside the staging area.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// An object already stored under a content-addressed key has different bytes.
    #[error("hash mismatch for {key}: expected {expected}, got {actual}")]
    HashMismatch {
        key: String,
        expected: String,
        actual: String,
    },
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
