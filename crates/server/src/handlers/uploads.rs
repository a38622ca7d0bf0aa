//! Upload endpoint.

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::upload::{self, StagedUpload, UploadOptions, sanitize_filename};
use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use depot_core::{ArtifactRecord, RepoKind, Scope};
use futures::TryStreamExt;

/// Map a multipart error, keeping the body limit distinct from a bad form.
fn bad_multipart(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(format!("invalid multipart body: {}", e.body_text()))
    }
}

/// POST /rest/{repo} - Upload an artifact.
///
/// Multipart fields: `file` (required), `private`, `version`, `tags`. The
/// file may come before or after the other fields; it is streamed to storage
/// as it arrives.
#[tracing::instrument(skip(state, user, multipart), fields(owner = %user.username))]
pub async fn upload_artifact(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> ApiResult<Json<ArtifactRecord>> {
    let repo: RepoKind = repo.parse()?;

    let mut staged = None;
    let options = match read_form(&state, &user.username, &mut multipart, &mut staged).await {
        Ok(options) => options,
        Err(e) => {
            if let Some(staged) = staged.take() {
                staged.discard().await;
            }
            return Err(e);
        }
    };
    let staged = staged.ok_or_else(|| ApiError::BadRequest("missing file field".to_string()))?;

    let record = upload::commit(&state, repo, staged, options).await?;
    tracing::info!(
        file_id = %record.file_id,
        size = record.size,
        "Upload cataloged"
    );
    Ok(Json(record))
}

/// Walk the form, staging the file field into `staged` when it is reached.
async fn read_form(
    state: &AppState,
    owner: &str,
    multipart: &mut Multipart,
    staged: &mut Option<StagedUpload>,
) -> ApiResult<UploadOptions> {
    let mut options = UploadOptions::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if staged.is_some() {
                    return Err(ApiError::BadRequest("more than one file field".to_string()));
                }
                let filename = sanitize_filename(field.file_name().unwrap_or_default())?;
                let body = field.map_err(bad_multipart);
                *staged = Some(upload::stage(state, owner, filename, body).await?);
            }
            "private" => {
                options.scope = Scope::from_private_flag(&field.text().await.map_err(bad_multipart)?);
            }
            "version" => {
                options.version = field.text().await.map_err(bad_multipart)?.trim().to_string();
            }
            "tags" => {
                options.tags = field.text().await.map_err(bad_multipart)?.trim().to_string();
            }
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }
    Ok(options)
}
