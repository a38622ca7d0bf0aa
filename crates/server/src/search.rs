//! Catalog queries behind list, info and download.
//!
//! Filters are exact matches on the given fields. Private artifacts are only
//! returned to their owner.

use crate::error::{ApiError, ApiResult};
use crate::metrics::SEARCH_REQUESTS;
use crate::state::AppState;
use depot_core::{ArtifactFilter, ArtifactRecord, RepoKind};
use serde::Deserialize;

/// Query parameters accepted by list, info and get.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchParams {
    pub id: Option<String>,
    pub name: Option<String>,
    pub owner: Option<String>,
    pub version: Option<String>,
    pub tags: Option<String>,
}

impl SearchParams {
    /// Build the filter for `repo`. Empty parameters are treated as absent.
    pub fn into_filter(self, repo: RepoKind) -> ArtifactFilter {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.is_empty())
        }
        ArtifactFilter {
            file_id: present(self.id),
            owner: present(self.owner),
            name: present(self.name),
            repo: Some(repo),
            version: present(self.version),
            tags: present(self.tags),
        }
    }
}

/// A visible match and the key its bytes are stored under.
#[derive(Clone, Debug)]
pub struct Found {
    pub record: ArtifactRecord,
    pub storage_key: String,
}

/// Every match visible to `viewer`, oldest first.
pub async fn search(
    state: &AppState,
    repo: RepoKind,
    params: SearchParams,
    viewer: Option<&str>,
) -> ApiResult<Vec<ArtifactRecord>> {
    let found = visible(state, repo, params, viewer, "list").await?;
    Ok(found.into_iter().map(|f| f.record).collect())
}

/// The single match visible to `viewer`.
///
/// No match is `NotFound`; more than one is `Conflict`, so callers can
/// narrow the query.
pub async fn find_one(
    state: &AppState,
    repo: RepoKind,
    params: SearchParams,
    viewer: Option<&str>,
    operation: &'static str,
) -> ApiResult<Found> {
    let mut found = visible(state, repo, params, viewer, operation).await?;
    match found.len() {
        0 => Err(ApiError::NotFound(format!("no matching {repo} artifact"))),
        1 => Ok(found.remove(0)),
        n => Err(ApiError::Conflict(format!(
            "{n} {repo} artifacts match, narrow the query"
        ))),
    }
}

async fn visible(
    state: &AppState,
    repo: RepoKind,
    params: SearchParams,
    viewer: Option<&str>,
    operation: &'static str,
) -> ApiResult<Vec<Found>> {
    SEARCH_REQUESTS.with_label_values(&[operation]).inc();

    let filter = params.into_filter(repo);
    let rows = state.metadata.search_artifacts(&filter).await?;

    let mut found = Vec::with_capacity(rows.len());
    for row in rows {
        let storage_key = row.storage_key.clone();
        let record = row.into_record()?;
        if record.is_visible_to(viewer) {
            found.push(Found {
                record,
                storage_key,
            });
        }
    }
    tracing::debug!(operation, repo = %repo, matches = found.len(), "catalog searched");
    Ok(found)
}
