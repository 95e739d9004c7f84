//! Chunk hashing and the blob manifest.

use crate::error::{StorageError, StorageResult};
use archivo_core::BlobId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use time::OffsetDateTime;

/// SHA-256 of a chunk's contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkHash([u8; 32]);

impl ChunkHash {
    /// Compute the hash of chunk data.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, String> {
        if s.len() != 64 {
            return Err(format!("expected 64 hex chars, got {}", s.len()));
        }
        let mut bytes = [0u8; 32];
        for (i, pair) in s.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(pair).map_err(|e| e.to_string())?;
            bytes[i] = u8::from_str_radix(hex, 16).map_err(|e| e.to_string())?;
        }
        Ok(Self(bytes))
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Object store key of this chunk within a blob.
    pub fn object_key(&self, blob_id: BlobId) -> String {
        format!("{}chunks/{}", blob_id.object_prefix(), self.to_hex())
    }

    /// Check that `data` hashes to this value.
    pub fn verify(&self, data: &[u8]) -> StorageResult<()> {
        let actual = Self::compute(data);
        if actual != *self {
            return Err(StorageError::HashMismatch {
                expected: self.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }
}

impl TryFrom<String> for ChunkHash {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ChunkHash> for String {
    fn from(hash: ChunkHash) -> Self {
        hash.to_hex()
    }
}

impl fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// One entry of a blob manifest, in payload order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub hash: ChunkHash,
    pub size: u64,
}

/// Description of a committed blob. Its presence in the object store is
/// what makes the blob reachable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobManifest {
    pub blob_id: BlobId,
    pub filename: String,
    pub size: u64,
    pub chunk_size: u64,
    pub chunks: Vec<ChunkRef>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl BlobManifest {
    pub fn to_bytes(&self) -> StorageResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| StorageError::CorruptManifest {
                blob_id: self.blob_id.to_string(),
                reason: e.to_string(),
            })
    }

    /// Decode a manifest and check it is consistent with the blob it was
    /// read for.
    pub fn from_bytes(blob_id: BlobId, data: &[u8]) -> StorageResult<Self> {
        let corrupt = |reason: String| StorageError::CorruptManifest {
            blob_id: blob_id.to_string(),
            reason,
        };
        let manifest: BlobManifest =
            serde_json::from_slice(data).map_err(|e| corrupt(e.to_string()))?;
        if manifest.blob_id != blob_id {
            return Err(corrupt(format!("manifest names blob {}", manifest.blob_id)));
        }
        let total: u64 = manifest.chunks.iter().map(|c| c.size).sum();
        if total != manifest.size {
            return Err(corrupt(format!(
                "chunk sizes sum to {total}, manifest says {}",
                manifest.size
            )));
        }
        Ok(manifest)
    }
}
