//! The object store seam between the upload pipeline and durable bytes.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// Chunks of a stored object, in order.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Durable artifact bytes.
///
/// Apt packages are keyed by filename; everything else by the hex MD5 of its
/// content. Keys are relative paths and never start with the staging area.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Whether a finished object is stored under `key`.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Read a whole object into memory.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Read an object chunk by chunk, for hashing, archive decoding and
    /// downloads.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Store `data` under `key` in one step.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Begin writing `key`. Readers see nothing until
    /// [`StreamingUpload::finish`] returns.
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Move `from` to `to` in one step, overwriting `to`.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Finished keys under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Short backend name for logs and the health endpoint.
    fn backend_name(&self) -> &'static str;

    /// Checked once at startup and on every health request.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// An object being written.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Append a chunk.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    fn bytes_written(&self) -> u64;

    /// Publish the object under its key. Returns its size.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Drop everything written so far.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
