//! Chunked blob store.
//!
//! A blob is stored as content-addressed chunks under `blobs/<id>/chunks/`
//! followed by `blobs/<id>/manifest.json`. The manifest is written last and
//! is the commit point: a blob without a manifest is unreachable and its
//! chunks are garbage.

use crate::chunk::{BlobManifest, ChunkHash, ChunkRef};
use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore};
use archivo_core::BlobId;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

/// Result of a committed upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobReceipt {
    pub blob_id: BlobId,
    pub size: u64,
}

/// A blob opened for reading.
pub struct BlobDownload {
    pub manifest: BlobManifest,
    /// Payload bytes. Each chunk is verified before it is yielded.
    pub stream: ByteStream,
}

impl std::fmt::Debug for BlobDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobDownload")
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

/// Streaming write into the blob store.
#[async_trait]
pub trait BlobUpload: Send {
    /// Append payload bytes.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Bytes accepted so far.
    fn bytes_written(&self) -> u64;

    /// Commit the blob and return its identifier.
    async fn finish(self: Box<Self>) -> StorageResult<BlobReceipt>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Storage for arbitrary-size payloads addressed by [`BlobId`].
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn open_upload(&self, filename: &str) -> StorageResult<Box<dyn BlobUpload>>;

    /// Open a committed blob. `NotFound` when no manifest exists.
    async fn open_download(&self, blob_id: BlobId) -> StorageResult<BlobDownload>;

    /// Remove a committed blob. `NotFound` when no manifest exists.
    async fn delete(&self, blob_id: BlobId) -> StorageResult<()>;

    async fn exists(&self, blob_id: BlobId) -> StorageResult<bool>;

    async fn health_check(&self) -> StorageResult<()>;
}

/// [`BlobStore`] that splits payloads into fixed-size chunks on an
/// [`ObjectStore`].
#[derive(Clone)]
pub struct ChunkedBlobStore {
    objects: Arc<dyn ObjectStore>,
    chunk_size: usize,
}

impl ChunkedBlobStore {
    pub fn new(objects: Arc<dyn ObjectStore>, chunk_size: u64) -> Self {
        Self {
            objects,
            chunk_size: usize::try_from(chunk_size.max(1)).unwrap_or(usize::MAX),
        }
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    async fn read_manifest(&self, blob_id: BlobId) -> StorageResult<BlobManifest> {
        let data = self
            .objects
            .get(&blob_id.manifest_key())
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => StorageError::NotFound(blob_id.to_string()),
                other => other,
            })?;
        BlobManifest::from_bytes(blob_id, &data)
    }
}

#[async_trait]
impl BlobStore for ChunkedBlobStore {
    #[instrument(skip(self))]
    async fn open_upload(&self, filename: &str) -> StorageResult<Box<dyn BlobUpload>> {
        let upload = ChunkedUpload {
            objects: self.objects.clone(),
            blob_id: BlobId::new(),
            filename: filename.to_string(),
            chunk_size: self.chunk_size,
            buffer: BytesMut::new(),
            chunks: Vec::new(),
            size: 0,
            closed: false,
            runtime_handle: tokio::runtime::Handle::try_current().ok(),
        };
        Ok(Box::new(upload))
    }

    #[instrument(skip(self), fields(blob_id = %blob_id))]
    async fn open_download(&self, blob_id: BlobId) -> StorageResult<BlobDownload> {
        let manifest = self.read_manifest(blob_id).await?;
        let objects = self.objects.clone();
        let chunks = manifest.chunks.clone();

        let stream = async_stream::try_stream! {
            for chunk in chunks {
                let data = objects.get(&chunk.hash.object_key(blob_id)).await?;
                chunk.hash.verify(&data)?;
                yield data;
            }
        };

        Ok(BlobDownload {
            manifest,
            stream: Box::pin(stream),
        })
    }

    #[instrument(skip(self), fields(blob_id = %blob_id))]
    async fn delete(&self, blob_id: BlobId) -> StorageResult<()> {
        // Unpublish first so readers stop seeing the blob before its chunks go.
        self.objects
            .delete(&blob_id.manifest_key())
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => StorageError::NotFound(blob_id.to_string()),
                other => other,
            })?;

        if let Err(e) = self.objects.delete_prefix(&blob_id.object_prefix()).await {
            tracing::warn!(
                blob_id = %blob_id,
                error = %e,
                "blob unpublished but chunk cleanup failed"
            );
        }
        Ok(())
    }

    async fn exists(&self, blob_id: BlobId) -> StorageResult<bool> {
        self.objects.exists(&blob_id.manifest_key()).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.objects.health_check().await
    }
}

/// In-progress upload. Dropping it before `finish` or `abort` removes the
/// chunks written so far in a background task.
struct ChunkedUpload {
    objects: Arc<dyn ObjectStore>,
    blob_id: BlobId,
    filename: String,
    chunk_size: usize,
    buffer: BytesMut,
    chunks: Vec<ChunkRef>,
    size: u64,
    closed: bool,
    runtime_handle: Option<tokio::runtime::Handle>,
}

impl ChunkedUpload {
    async fn store_chunk(&mut self, data: Bytes) -> StorageResult<()> {
        let hash = ChunkHash::compute(&data);
        let size = data.len() as u64;
        self.objects
            .put_if_not_exists(&hash.object_key(self.blob_id), data)
            .await?;
        self.chunks.push(ChunkRef { hash, size });
        Ok(())
    }

    async fn discard(&self) -> StorageResult<()> {
        self.objects
            .delete_prefix(&self.blob_id.object_prefix())
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl BlobUpload for ChunkedUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::UploadClosed);
        }
        self.size += data.len() as u64;
        self.buffer.extend_from_slice(&data);
        while self.buffer.len() >= self.chunk_size {
            let chunk = self.buffer.split_to(self.chunk_size).freeze();
            self.store_chunk(chunk).await?;
        }
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.size
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<BlobReceipt> {
        if self.closed {
            return Err(StorageError::UploadClosed);
        }
        if !self.buffer.is_empty() {
            let rest = self.buffer.split().freeze();
            self.store_chunk(rest).await?;
        }

        let manifest = BlobManifest {
            blob_id: self.blob_id,
            filename: self.filename.clone(),
            size: self.size,
            chunk_size: self.chunk_size as u64,
            chunks: std::mem::take(&mut self.chunks),
            created_at: OffsetDateTime::now_utc(),
        };
        self.objects
            .put(&self.blob_id.manifest_key(), manifest.to_bytes()?)
            .await?;
        self.closed = true;

        tracing::debug!(
            blob_id = %self.blob_id,
            size = self.size,
            chunks = manifest.chunks.len(),
            "blob committed"
        );
        Ok(BlobReceipt {
            blob_id: self.blob_id,
            size: self.size,
        })
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        self.closed = true;
        self.discard().await
    }
}

impl Drop for ChunkedUpload {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let objects = self.objects.clone();
        let prefix = self.blob_id.object_prefix();
        let blob_id = self.blob_id;
        match &self.runtime_handle {
            Some(handle) => {
                handle.spawn(async move {
                    if let Err(e) = objects.delete_prefix(&prefix).await {
                        tracing::error!(blob_id = %blob_id, error = %e, "failed to discard abandoned upload");
                    } else {
                        tracing::info!(blob_id = %blob_id, "discarded abandoned upload");
                    }
                });
            }
            None => {
                tracing::warn!(blob_id = %blob_id, "upload dropped without runtime; chunks may be orphaned");
            }
        }
    }
}
