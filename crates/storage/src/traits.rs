//! Object store abstraction underneath the blob store.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// Payload bytes of a blob, yielded one chunk at a time.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Flat key/value storage. Keys look like `blobs/<blob_id>/chunks/<sha256>`.
///
/// Writes are all-or-nothing: a reader never sees a half-written object.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Whole object. `NotFound` when absent.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Create or replace.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Create unless present. Returns whether this call created it.
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool>;

    /// `NotFound` when absent.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Keys under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Remove every key under `prefix` and return how many went away.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u64> {
        let mut removed = 0;
        for key in self.list(prefix).await? {
            match self.delete(&key).await {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    /// Short name for logs.
    fn backend_name(&self) -> &'static str;

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
