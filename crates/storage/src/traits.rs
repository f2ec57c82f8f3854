//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Blob store keyed by slash-separated relative paths.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Get an object as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Put an object atomically, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete an object. Returns `NotFound` if it does not exist.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List object keys under a prefix.
    ///
    /// The request path never enumerates keys; this exists for tests and
    /// maintenance tooling that inspect what a backend holds.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Static identifier for the backend type, used in logs.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called at startup before the server accepts requests.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
