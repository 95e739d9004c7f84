//! Blob storage for Archivo.
//!
//! This crate provides:
//! - A key/value object store abstraction with atomic writes
//! - A chunked blob store on top of it, addressed by random blob ids
//! - Backends: local filesystem

pub mod backends;
pub mod blob;
pub mod chunk;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use blob::{BlobDownload, BlobReceipt, BlobStore, BlobUpload, ChunkedBlobStore};
pub use chunk::{BlobManifest, ChunkHash, ChunkRef};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectStore};

use archivo_core::config::{BlobConfig, StorageConfig};
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}

/// Create the blob store described by the storage and chunking sections.
pub async fn blob_store_from_config(
    storage: &StorageConfig,
    blobs: &BlobConfig,
) -> StorageResult<Arc<dyn BlobStore>> {
    blobs.validate().map_err(StorageError::Config)?;
    let objects = from_config(storage).await?;
    Ok(Arc::new(ChunkedBlobStore::new(
        objects,
        blobs.chunk_size_bytes,
    )))
}
