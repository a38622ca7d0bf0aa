//! Metadata store abstraction and implementation for depot.
//!
//! This crate provides the catalog data model:
//! - Users, their public keys and quota counters
//! - Authentication challenges and session token digests
//! - Artifact records and exact-match search

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use depot_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
