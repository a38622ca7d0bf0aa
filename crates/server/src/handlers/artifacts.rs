//! Catalog endpoints: list, info and download.

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::search::{self, SearchParams};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use depot_core::{ArtifactRecord, RepoKind};

fn viewer(user: &Option<AuthenticatedUser>) -> Option<&str> {
    user.as_ref().map(|u| u.username.as_str())
}

/// GET /rest/{repo}/list - Every visible artifact matching the query.
pub async fn list_artifacts(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    user: Option<AuthenticatedUser>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<ArtifactRecord>>> {
    let repo: RepoKind = repo.parse()?;
    let records = search::search(&state, repo, params, viewer(&user)).await?;
    Ok(Json(records))
}

/// GET /rest/{repo}/info - The single visible artifact matching the query.
pub async fn artifact_info(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    user: Option<AuthenticatedUser>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<ArtifactRecord>> {
    let repo: RepoKind = repo.parse()?;
    let found = search::find_one(&state, repo, params, viewer(&user), "info").await?;
    Ok(Json(found.record))
}

/// GET /rest/{repo}/get - Stream the bytes of the single visible match.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    user: Option<AuthenticatedUser>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Response> {
    let repo: RepoKind = repo.parse()?;
    let found = search::find_one(&state, repo, params, viewer(&user), "get").await?;

    let stream = state
        .storage
        .get_stream(&found.storage_key)
        .await
        .map_err(|e| match e {
            depot_storage::StorageError::NotFound(_) => {
                tracing::error!(
                    file_id = %found.record.file_id,
                    storage_key = %found.storage_key,
                    "Cataloged artifact has no stored bytes"
                );
                ApiError::NotFound(format!("bytes of {} are missing", found.record.file_id))
            }
            other => other.into(),
        })?;

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (CONTENT_LENGTH, HeaderValue::from(found.record.size)),
            (
                CONTENT_DISPOSITION,
                content_disposition(&found.record.filename),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// `attachment` header naming `filename`, with characters that cannot appear
/// in a quoted header value replaced.
fn content_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
