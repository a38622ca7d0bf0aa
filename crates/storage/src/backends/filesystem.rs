//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore, StreamingUpload};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Directory under the root holding in-flight uploads.
const STAGING_DIR: &str = ".staging";

/// Local filesystem object store.
///
/// Objects live at `<root>/<key>`. Streaming uploads are written to
/// `<root>/.staging/<uuid>` and renamed into place on finish.
pub struct FilesystemBackend {
    root: PathBuf,
}

fn not_found_or_io(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| {
        if e.kind() == ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    ///
    /// Uploads left in the staging area by a previous process are removed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        let staging = root.join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;

        let mut removed = 0usize;
        let mut entries = fs::read_dir(&staging).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::warn!(count = removed, "Removed unfinished uploads from staging");
        }
        Ok(Self { root })
    }

    /// Resolve a key to a path inside the root.
    ///
    /// Runs the symlink checks on the blocking pool since they stat and
    /// canonicalize.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Reject keys that would escape the root, directly or through a symlink,
    /// and keys that point into the staging area.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        let mut components = Path::new(key).components().peekable();
        if components
            .peek()
            .is_some_and(|c| c.as_os_str() == STAGING_DIR)
        {
            return Err(StorageError::InvalidKey(format!("reserved key: {key}")));
        }
        if key.starts_with('\\') || components.any(|c| !matches!(c, Component::Normal(_))) {
            return Err(StorageError::InvalidKey(format!(
                "contains unsafe path component: {key}"
            )));
        }

        let path = root.join(key);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Check the path itself if present, otherwise its nearest existing ancestor.
        let mut probe = path.as_path();
        loop {
            match std::fs::symlink_metadata(probe) {
                Ok(meta) => {
                    let canonical = probe.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(e)
                        }
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::NotFound => match probe.parent() {
                    Some(parent) => probe = parent,
                    None => return Ok(path),
                },
                Err(err) => return Err(StorageError::Io(err)),
            }
        }
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        self.root.join(STAGING_DIR).join(Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        Ok(fs::try_exists(&path).await? && fs::metadata(&path).await?.is_file())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key).await?;
        let data = fs::read(&path).await.map_err(not_found_or_io(key))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(key).await?;
        let file = fs::File::open(&path).await.map_err(not_found_or_io(key))?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let mut upload = self.put_stream(key).await?;
        if let Err(e) = upload.write(data).await {
            upload.abort().await?;
            return Err(e);
        }
        upload.finish().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let final_path = self.key_path(key).await?;
        let temp_path = self.staging_path();
        let file = fs::File::create(&temp_path).await?;

        Ok(Box::new(FilesystemUpload {
            file: Some(file),
            temp_path,
            final_path,
            bytes_written: 0,
            closed: false,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        fs::remove_file(&path).await.map_err(not_found_or_io(key))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let from_path = self.key_path(from).await?;
        let to_path = self.key_path(to).await?;
        self.ensure_parent(&to_path).await?;
        fs::rename(&from_path, &to_path)
            .await
            .map_err(not_found_or_io(from))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let base_path = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.key_path(prefix).await?
        };
        let staging = self.root.join(STAGING_DIR);
        let mut results = Vec::new();

        match fs::try_exists(&base_path).await {
            Ok(true) => {}
            Ok(false) => return Ok(results),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(results),
            Err(e) => return Err(StorageError::Io(e)),
        }

        let mut stack = vec![base_path];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                // file_type() does not follow symlinks; links are skipped.
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if path != staging {
                        stack.push(path);
                    }
                } else if file_type.is_file()
                    && let Ok(rel) = path.strip_prefix(&self.root)
                {
                    results.push(rel.to_string_lossy().to_string());
                }
            }
        }

        results.sort();
        Ok(results)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

/// Streaming upload for filesystem backend.
///
/// The temp file is removed on drop unless the upload was finished or
/// aborted.
struct FilesystemUpload {
    file: Option<fs::File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
    closed: bool,
}

impl Drop for FilesystemUpload {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        drop(self.file.take());
        match std::fs::remove_file(&self.temp_path) {
            Ok(()) => tracing::debug!(path = ?self.temp_path, "Removed abandoned upload"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = ?self.temp_path, error = %e, "Failed to remove abandoned upload")
            }
        }
    }
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StorageError::Io(std::io::Error::other("upload already closed")))?;
        file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        if let Some(file) = self.file.take() {
            file.sync_all().await?;
        }
        if let Some(parent) = self.final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&self.temp_path, &self.final_path).await?;
        self.closed = true;
        Ok(self.bytes_written)
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        drop(self.file.take());
        let result = match fs::remove_file(&self.temp_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        };
        self.closed = true;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn backend() -> (tempfile::TempDir, FilesystemBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, backend) = backend().await;

        backend.put("pkg.deb", Bytes::from("hello world")).await.unwrap();
        assert!(backend.exists("pkg.deb").await.unwrap());
        assert_eq!(backend.get("pkg.deb").await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn test_streaming_upload_invisible_until_finish() {
        let (_dir, backend) = backend().await;

        let mut upload = backend.put_stream("big.bin").await.unwrap();
        upload.write(Bytes::from_static(b"abc")).await.unwrap();
        upload.write(Bytes::from_static(b"def")).await.unwrap();
        assert_eq!(upload.bytes_written(), 6);
        assert!(!backend.exists("big.bin").await.unwrap());

        assert_eq!(upload.finish().await.unwrap(), 6);
        assert_eq!(backend.get("big.bin").await.unwrap(), "abcdef");
        assert_eq!(backend.list("").await.unwrap(), vec!["big.bin".to_string()]);
    }

    #[tokio::test]
    async fn test_abort_leaves_nothing_behind() {
        let (dir, backend) = backend().await;

        let mut upload = backend.put_stream("partial.bin").await.unwrap();
        upload.write(Bytes::from_static(b"partial")).await.unwrap();
        upload.abort().await.unwrap();

        assert!(!backend.exists("partial.bin").await.unwrap());
        assert!(backend.list("").await.unwrap().is_empty());
        let staged = std::fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count();
        assert_eq!(staged, 0);
    }

    #[tokio::test]
    async fn test_dropped_upload_leaves_nothing_behind() {
        let (dir, backend) = backend().await;

        let mut upload = backend.put_stream("dropped.bin").await.unwrap();
        upload.write(Bytes::from_static(b"half")).await.unwrap();
        drop(upload);

        assert!(!backend.exists("dropped.bin").await.unwrap());
        let staged = std::fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count();
        assert_eq!(staged, 0);
    }

    #[tokio::test]
    async fn test_new_clears_stale_staging() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join(STAGING_DIR);
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("left-over"), b"stale").unwrap();
        std::fs::write(dir.path().join("kept.bin"), b"kept").unwrap();

        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
        assert_eq!(backend.list("").await.unwrap(), vec!["kept.bin".to_string()]);
    }

    #[tokio::test]
    async fn test_get_stream_reads_everything() {
        let (_dir, backend) = backend().await;
        let data = vec![7u8; STREAM_CHUNK_SIZE * 2 + 10];
        backend.put("blob", Bytes::from(data.clone())).await.unwrap();

        let mut stream = backend.get_stream("blob").await.unwrap();
        let mut read = Vec::new();
        while let Some(chunk) = stream.next().await {
            read.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn test_rename_replaces_destination() {
        let (_dir, backend) = backend().await;
        backend.put("a", Bytes::from_static(b"new")).await.unwrap();
        backend.put("b", Bytes::from_static(b"old")).await.unwrap();

        backend.rename("a", "b").await.unwrap();
        assert!(!backend.exists("a").await.unwrap());
        assert_eq!(backend.get("b").await.unwrap(), "new");

        assert!(matches!(
            backend.rename("missing", "c").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_objects() {
        let (_dir, backend) = backend().await;
        assert!(!backend.exists("nope").await.unwrap());
        assert!(matches!(backend.get("nope").await, Err(StorageError::NotFound(_))));
        assert!(matches!(backend.delete("nope").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unsafe_keys_rejected() {
        let (_dir, backend) = backend().await;

        for key in ["../escape", "/absolute/path", "foo/../bar", "./x", "", ".staging/x"] {
            assert!(
                matches!(backend.exists(key).await, Err(StorageError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
        }
        assert!(backend.exists("valid/nested/key").await.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlink_traversal_rejected() {
        use std::os::unix::fs::symlink;

        let (dir, backend) = backend().await;
        let outside_dir = tempfile::tempdir().unwrap();
        let outside_file = outside_dir.path().join("secret.txt");
        std::fs::write(&outside_file, "secret data").unwrap();

        symlink(&outside_file, dir.path().join("malicious_link")).unwrap();
        match backend.get("malicious_link").await {
            Err(StorageError::InvalidKey(msg)) => assert!(msg.contains("escapes storage root")),
            other => panic!("expected InvalidKey error, got: {other:?}"),
        }

        // Writes through a symlinked ancestor must not create anything outside
        symlink(outside_dir.path(), dir.path().join("escape")).unwrap();
        let result = backend
            .put("escape/nested/deep/file.txt", Bytes::from("data"))
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        assert!(!outside_dir.path().join("nested").exists());
    }
}
