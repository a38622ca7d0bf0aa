//! The upload pipeline.
//!
//! An upload is first *staged*: the body streams into a private staging
//! object while both digests are computed and the owner's remaining quota is
//! enforced, then the owner is charged with a conditional update that can
//! never push usage past the limit. *Committing* moves the staged bytes to
//! their final key under a per-key lock and hands them to the format
//! processor. A rejected upload is refunded and its bytes are swept unless
//! another record still points at them.
//!
//! Once bytes are charged, the rest of the pipeline runs on spawned tasks, so
//! a client that disconnects mid-request never leaves a charge or a staged
//! object behind.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    self, DEDUPLICATED_UPLOADS, ORPHANS_SWEPT, QUOTA_REJECTIONS, UPLOAD_BYTES, UPLOAD_DURATION,
};
use crate::processors::{self, StoredUpload};
use crate::state::AppState;
use bytes::Bytes;
use depot_core::{ArtifactRecord, ContentDigests, RepoKind, Scope};
use depot_storage::{StorageError, StreamingUpload};
use futures::{Stream, StreamExt};
use std::fmt;
use std::time::Instant;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Key prefix for staged uploads. Never a valid final key.
pub const STAGING_PREFIX: &str = "incoming";

/// Optional form fields sent with an upload.
#[derive(Clone, Debug, Default)]
pub struct UploadOptions {
    pub scope: Scope,
    pub version: String,
    pub tags: String,
}

/// Bytes that are durably stored under a staging key and charged to `owner`.
///
/// Dropping a staged upload that was neither committed nor discarded refunds
/// the charge and deletes the staged object in the background.
pub struct StagedUpload {
    pub owner: String,
    pub filename: String,
    pub digests: ContentDigests,
    pub size: u64,
    key: String,
    started: Instant,
    /// Set while this value owns the charge and the staged object.
    pending: Option<AppState>,
}

impl StagedUpload {
    /// Drop a staged upload that will not be committed, refunding its bytes.
    pub async fn discard(mut self) {
        if let Some(task) = self.release()
            && let Err(e) = task.await
        {
            tracing::warn!(key = %self.key, error = %e, "Staged upload cleanup failed");
        }
    }

    /// Hand the charge and the staged object over to the caller.
    fn settle(&mut self) {
        self.pending = None;
    }

    /// Spawn the refund and delete, if still owed.
    fn release(&mut self) -> Option<JoinHandle<()>> {
        let state = self.pending.take()?;
        let owner = self.owner.clone();
        let key = self.key.clone();
        let size = self.size;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(async move {
                refund(&state, &owner, size).await;
                delete_quietly(&state, &key).await;
            })),
            Err(_) => {
                tracing::warn!(key = %key, owner = %owner, size, "No runtime to release staged upload");
                None
            }
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.pending.is_some() {
            tracing::debug!(key = %self.key, owner = %self.owner, "Releasing abandoned staged upload");
            self.release();
        }
    }
}

impl fmt::Debug for StagedUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedUpload")
            .field("owner", &self.owner)
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Reduce a declared filename to its last path component.
pub fn sanitize_filename(declared: &str) -> ApiResult<String> {
    let name = declared.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match name {
        "" | "." | ".." => Err(ApiError::BadRequest("Empty filename".to_string())),
        STAGING_PREFIX => Err(ApiError::BadRequest(format!("reserved filename: {name}"))),
        _ => Ok(name.to_string()),
    }
}

/// Stream `body` into a staging object and charge its size to `owner`.
///
/// Fails with `QuotaExceeded` as soon as the body outgrows the owner's
/// remaining quota, or when a concurrent upload used it up first. An error
/// yielded by `body` is returned as is. Nothing is charged and nothing stays
/// stored on failure.
#[tracing::instrument(skip(state, body), fields(owner = %owner, filename = %filename))]
pub async fn stage<S>(
    state: &AppState,
    owner: &str,
    filename: String,
    body: S,
) -> ApiResult<StagedUpload>
where
    S: Stream<Item = ApiResult<Bytes>>,
{
    let started = Instant::now();
    let user = state
        .metadata
        .get_user(owner)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(format!("unknown user {owner}")))?;
    let remaining = user.remaining_quota();

    let key = format!("{STAGING_PREFIX}/{}", Uuid::new_v4());
    let mut sink = state
        .storage
        .put_stream(&key)
        .await
        .map_err(|e| ApiError::WriteFailed(e.to_string()))?;
    let mut hasher = ContentDigests::hasher();
    let mut body = std::pin::pin!(body);

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                abort(sink, &key).await;
                return Err(e);
            }
        };
        if remaining.is_some_and(|limit| hasher.bytes_hashed() + chunk.len() as u64 > limit) {
            abort(sink, &key).await;
            QUOTA_REJECTIONS.inc();
            return Err(quota_exceeded(owner, remaining));
        }
        hasher.update(&chunk);
        if let Err(e) = sink.write(chunk).await {
            abort(sink, &key).await;
            return Err(ApiError::WriteFailed(e.to_string()));
        }
    }

    let staged = StagedUpload {
        owner: owner.to_string(),
        filename,
        digests: hasher.finalize(),
        size: 0,
        key,
        started,
        pending: None,
    };
    let task = tokio::spawn(publish(state.clone(), sink, staged, remaining));
    task.await
        .map_err(|e| ApiError::Internal(format!("staging task failed: {e}")))?
}

/// Finish the staging object and charge the owner.
///
/// The returned upload owns the charge from the moment it is taken, even if
/// nobody is left to receive it.
async fn publish(
    state: AppState,
    sink: Box<dyn StreamingUpload>,
    mut staged: StagedUpload,
    remaining: Option<u64>,
) -> ApiResult<StagedUpload> {
    staged.size = sink
        .finish()
        .await
        .map_err(|e| ApiError::WriteFailed(e.to_string()))?;

    match state.metadata.charge_quota(&staged.owner, staged.size).await {
        Ok(true) => {}
        Ok(false) => {
            delete_quietly(&state, &staged.key).await;
            QUOTA_REJECTIONS.inc();
            return Err(quota_exceeded(&staged.owner, remaining));
        }
        Err(e) => {
            delete_quietly(&state, &staged.key).await;
            return Err(e.into());
        }
    }

    tracing::debug!(key = %staged.key, size = staged.size, md5 = %staged.digests.md5_hex(), "upload staged");
    staged.pending = Some(state);
    Ok(staged)
}

/// Place staged bytes under their final key and catalog them.
///
/// Apt packages keep their filename as key; every other kind is keyed by its
/// MD5 digest. If the key is already taken by identical bytes the staged copy
/// is dropped; different bytes under the same key are a conflict.
///
/// The work runs on its own task and completes even if the caller goes away.
pub async fn commit(
    state: &AppState,
    repo: RepoKind,
    staged: StagedUpload,
    options: UploadOptions,
) -> ApiResult<ArtifactRecord> {
    let task = tokio::spawn(commit_owned(state.clone(), repo, staged, options));
    task.await
        .map_err(|e| ApiError::Internal(format!("commit task failed: {e}")))?
}

#[tracing::instrument(skip_all, fields(repo = %repo, owner = %staged.owner, filename = %staged.filename))]
async fn commit_owned(
    state: AppState,
    repo: RepoKind,
    mut staged: StagedUpload,
    options: UploadOptions,
) -> ApiResult<ArtifactRecord> {
    let final_key = if repo.is_content_addressed() {
        staged.digests.md5_hex()
    } else {
        staged.filename.clone()
    };
    let _lock = state.key_locks.lock(&final_key).await;

    let deduplicated = match place(&state, &staged, &final_key).await {
        Ok(deduplicated) => deduplicated,
        Err(e) => {
            metrics::record_upload(repo.as_str(), "failed");
            staged.discard().await;
            return Err(e);
        }
    };
    // The staged key is gone; the charge now follows the final key.
    staged.settle();

    let upload = StoredUpload {
        repo,
        owner: staged.owner.clone(),
        filename: staged.filename.clone(),
        scope: options.scope,
        version: options.version,
        tags: options.tags,
        digests: staged.digests,
        size: staged.size,
        storage_key: final_key,
    };

    match processors::process(&state, &upload).await {
        Ok(record) => {
            let outcome = if deduplicated { "deduplicated" } else { "stored" };
            metrics::record_upload(repo.as_str(), outcome);
            UPLOAD_BYTES
                .with_label_values(&[repo.as_str()])
                .inc_by(upload.size);
            UPLOAD_DURATION
                .with_label_values(&[repo.as_str()])
                .observe(staged.started.elapsed().as_secs_f64());
            Ok(record)
        }
        Err(e) => {
            tracing::info!(error = %e, storage_key = %upload.storage_key, "upload rejected");
            metrics::record_upload(repo.as_str(), "rejected");
            refund(&state, &upload.owner, upload.size).await;
            sweep_orphan(&state, &upload.storage_key).await;
            Err(e)
        }
    }
}

/// Delete staged objects left behind by a previous run.
///
/// Their owners were charged, but nothing records who; the bytes are only
/// reclaimed. Returns the number of objects removed.
pub async fn sweep_staging(state: &AppState) -> ApiResult<usize> {
    let keys = state.storage.list(STAGING_PREFIX).await?;
    for key in &keys {
        delete_quietly(state, key).await;
    }
    if !keys.is_empty() {
        tracing::warn!(count = keys.len(), "Removed staged uploads left by a previous run");
    }
    Ok(keys.len())
}

/// Move the staged object to `final_key`. Returns true when identical bytes
/// were already there.
async fn place(state: &AppState, staged: &StagedUpload, final_key: &str) -> ApiResult<bool> {
    if state.storage.exists(final_key).await? {
        let existing = hash_object(state, final_key).await?;
        if existing.sha256() != staged.digests.sha256() {
            return Err(StorageError::HashMismatch {
                key: final_key.to_string(),
                expected: existing.sha256_hex(),
                actual: staged.digests.sha256_hex(),
            }
            .into());
        }
        delete_quietly(state, &staged.key).await;
        DEDUPLICATED_UPLOADS.inc();
        tracing::debug!(key = %final_key, "content already stored");
        return Ok(true);
    }

    state
        .storage
        .rename(&staged.key, final_key)
        .await
        .map_err(|e| ApiError::WriteFailed(e.to_string()))?;
    Ok(false)
}

/// Recompute the digests of a stored object.
async fn hash_object(state: &AppState, key: &str) -> ApiResult<ContentDigests> {
    let hash_failed = |e: StorageError| ApiError::HashFailed(format!("{key}: {e}"));

    let mut stream = state.storage.get_stream(key).await.map_err(hash_failed)?;
    let mut hasher = ContentDigests::hasher();
    while let Some(chunk) = stream.next().await {
        hasher.update(&chunk.map_err(hash_failed)?);
    }
    Ok(hasher.finalize())
}

/// Delete `key` unless an artifact record still references it.
///
/// Callers hold the key lock.
async fn sweep_orphan(state: &AppState, key: &str) {
    match state.metadata.count_artifacts_by_storage_key(key).await {
        Ok(0) => {
            delete_quietly(state, key).await;
            ORPHANS_SWEPT.inc();
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Failed to count references, keeping object");
        }
    }
}

async fn refund(state: &AppState, owner: &str, bytes: u64) {
    if let Err(e) = state.metadata.refund_quota(owner, bytes).await {
        tracing::warn!(owner = %owner, bytes, error = %e, "Failed to refund quota");
    }
}

async fn abort(sink: Box<dyn StreamingUpload>, key: &str) {
    if let Err(e) = sink.abort().await {
        tracing::warn!(key = %key, error = %e, "Failed to abort staged upload");
    }
}

async fn delete_quietly(state: &AppState, key: &str) {
    match state.storage.delete(key).await {
        Ok(()) | Err(StorageError::NotFound(_)) => {}
        Err(e) => tracing::warn!(key = %key, error = %e, "Failed to delete stored object"),
    }
}

fn quota_exceeded(owner: &str, remaining: Option<u64>) -> ApiError {
    match remaining {
        Some(remaining) => {
            ApiError::QuotaExceeded(format!("{owner} has {remaining} bytes of quota left"))
        }
        None => ApiError::QuotaExceeded(format!("{owner} has no quota left")),
    }
}
