//! Format processors.
//!
//! Each repository kind turns durably stored bytes into a cataloged
//! [`ArtifactRecord`]. Archive decoding runs on the blocking pool and reads the
//! stored object as a stream, so large bundles are never buffered whole.

pub mod apt;
pub mod raw;
pub mod template;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use bytes::{Buf, Bytes};
use depot_core::{ArtifactRecord, ContentDigests, ParentRef, RepoKind, Scope};
use depot_metadata::MetadataError;
use depot_metadata::models::ArtifactRow;
use depot_storage::ByteStream;
use futures::executor::{BlockingStream, block_on_stream};
use std::io::{self, Read};
use time::OffsetDateTime;
use uuid::Uuid;

/// An upload whose bytes are stored, hashed and charged to the owner.
#[derive(Clone, Debug)]
pub struct StoredUpload {
    pub repo: RepoKind,
    pub owner: String,
    /// Declared filename, already reduced to its last path component.
    pub filename: String,
    pub scope: Scope,
    pub version: String,
    pub tags: String,
    pub digests: ContentDigests,
    pub size: u64,
    /// Object store key holding the bytes.
    pub storage_key: String,
}

impl StoredUpload {
    /// The record every kind starts from.
    fn base_row(&self) -> ArtifactRow {
        ArtifactRow {
            file_id: Uuid::new_v4(),
            owner: self.owner.clone(),
            name: self.filename.clone(),
            filename: self.filename.clone(),
            repo: self.repo.as_str().to_string(),
            version: self.version.clone(),
            tags: self.tags.clone(),
            md5: self.digests.md5_hex(),
            sha256: self.digests.sha256_hex(),
            size: i64::try_from(self.size).unwrap_or(i64::MAX),
            uploaded_at: OffsetDateTime::now_utc(),
            description: String::new(),
            architecture: String::new(),
            parent: String::new(),
            parent_owner: String::new(),
            parent_version: String::new(),
            pref_size: String::new(),
            storage_key: self.storage_key.clone(),
            private: self.scope.is_private(),
        }
    }
}

/// Extract, validate and catalog an upload according to its kind.
pub async fn process(state: &AppState, upload: &StoredUpload) -> ApiResult<ArtifactRecord> {
    let (row, parent) = match upload.repo {
        RepoKind::Raw => (raw::build(upload), None),
        RepoKind::Apt => (apt::build(state, upload).await?, None),
        RepoKind::Template => template::build(state, upload).await?,
    };
    record(state, row, parent.as_ref()).await
}

/// Persist the finished record. The parent check repeats inside the insert
/// transaction.
async fn record(
    state: &AppState,
    row: ArtifactRow,
    parent: Option<&ParentRef>,
) -> ApiResult<ArtifactRecord> {
    match state.metadata.create_artifact(&row, parent).await {
        Ok(()) => {}
        Err(MetadataError::DependencyMissing(p)) => {
            return Err(depot_core::Error::DependencyMissing {
                name: p.name,
                owner: p.owner,
                version: p.version,
            }
            .into());
        }
        Err(e) => return Err(e.into()),
    }
    tracing::info!(
        file_id = %row.file_id,
        repo = %row.repo,
        owner = %row.owner,
        name = %row.name,
        "artifact recorded"
    );
    Ok(row.into_record()?)
}

/// Run `decode` on the blocking pool with a reader over the stored object.
pub(crate) async fn decode_stored<T, F>(state: &AppState, key: &str, decode: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn Read) -> depot_core::Result<T> + Send + 'static,
{
    let stream = state.storage.get_stream(key).await?;
    tokio::task::spawn_blocking(move || {
        let mut reader = StreamReader::new(stream);
        decode(&mut reader)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("archive decoding task failed: {e}")))?
    .map_err(ApiError::from)
}

/// Blocking [`Read`] over a storage byte stream. Only usable off the async
/// executor threads.
struct StreamReader {
    chunks: BlockingStream<ByteStream>,
    current: Bytes,
}

impl StreamReader {
    fn new(stream: ByteStream) -> Self {
        Self {
            chunks: block_on_stream(stream),
            current: Bytes::new(),
        }
    }
}

impl Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while !self.current.has_remaining() {
            match self.chunks.next() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => return Err(io::Error::other(e)),
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.remaining());
        self.current.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn stream_reader_concatenates_chunks() {
        let chunks: Vec<depot_storage::StorageResult<Bytes>> = vec![
            Ok(Bytes::from_static(b"hel")),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"lo world")),
        ];
        let stream: ByteStream = Box::pin(stream::iter(chunks));

        let mut out = String::new();
        StreamReader::new(stream).read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn stream_reader_surfaces_errors() {
        let chunks: Vec<depot_storage::StorageResult<Bytes>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(depot_storage::StorageError::NotFound("gone".into())),
        ];
        let stream: ByteStream = Box::pin(stream::iter(chunks));

        let mut out = Vec::new();
        assert!(StreamReader::new(stream).read_to_end(&mut out).is_err());
    }
}
