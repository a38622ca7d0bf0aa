//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown repository: {0}")]
    InvalidRepo(String),

    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("{0} not found in archive")]
    ControlNotFound(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("declared owner {declared} does not match uploader {uploader}")]
    OwnerMismatch { declared: String, uploader: String },

    #[error("parent template {name}@{owner}:{version} not found")]
    DependencyMissing {
        name: String,
        owner: String,
        version: String,
    },

    #[error("invalid {field}: {value:?} (allowed characters: a-z A-Z 0-9 . _ -)")]
    InvalidFormat { field: &'static str, value: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
