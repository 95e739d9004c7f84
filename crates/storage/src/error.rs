//! Blob and object store errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Unknown key or blob id.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Key outside the accepted key space.
    #[error("rejected object key {0}")]
    InvalidKey(String),

    /// A stored chunk no longer matches its recorded digest.
    #[error("chunk digest mismatch: manifest says {expected}, content is {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("blob {blob_id} has an unreadable manifest: {reason}")]
    CorruptManifest { blob_id: String, reason: String },

    /// Write after `finish` or `abort`.
    #[error("blob upload is no longer open")]
    UploadClosed,

    #[error("invalid storage configuration: {0}")]
    Config(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
