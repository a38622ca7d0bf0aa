//! Artifact record repository.

use crate::error::MetadataResult;
use crate::models::ArtifactRow;
use async_trait::async_trait;
use depot_core::{ArtifactFilter, ParentRef};
use uuid::Uuid;

/// Repository for cataloged artifacts.
#[async_trait]
pub trait ArtifactRepo: Send + Sync {
    /// Insert an artifact record.
    ///
    /// When `parent` is given, the insert happens in the same transaction as
    /// the [`parent_exists`](Self::parent_exists) lookup, and fails
    /// with [`MetadataError::DependencyMissing`](crate::MetadataError::DependencyMissing)
    /// if there is none.
    async fn create_artifact(
        &self,
        artifact: &ArtifactRow,
        parent: Option<&ParentRef>,
    ) -> MetadataResult<()>;

    /// Whether a template with the parent's name, owner and version exists.
    /// The owner is compared case-insensitively.
    async fn parent_exists(&self, parent: &ParentRef) -> MetadataResult<bool>;

    /// Get an artifact by file id.
    async fn get_artifact(&self, file_id: Uuid) -> MetadataResult<Option<ArtifactRow>>;

    /// Every artifact matching all set fields of `filter`, oldest first.
    async fn search_artifacts(&self, filter: &ArtifactFilter) -> MetadataResult<Vec<ArtifactRow>>;

    /// Count artifacts whose bytes live under `storage_key`.
    async fn count_artifacts_by_storage_key(&self, storage_key: &str) -> MetadataResult<u64>;
}
