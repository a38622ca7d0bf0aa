//! Object storage abstraction and backends for depot.
//!
//! This crate provides:
//! - Atomic, streaming writes of uploaded artifacts
//! - Streaming reads for hashing, archive inspection and download
//! - Rename into content-addressed keys
//! - Backends: local filesystem

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectStore, StreamingUpload};

use depot_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
