//! Metadata store error types.

use depot_core::ParentRef;
use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The parent template a new record depends on is not cataloged.
    #[error("parent template {}@{}:{} not found", .0.name, .0.owner, .0.version)]
    DependencyMissing(ParentRef),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
