//! Blob identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of a payload in the blob store.
///
/// Identifiers are random v4 UUIDs. Downloads are not authorized beyond
/// knowledge of the identifier, so they must stay unguessable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(Uuid);

impl BlobId {
    /// Generate a new random blob ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse from the hyphenated or simple string form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| crate::Error::InvalidBlobId(format!("{s:?}: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Object store prefix under which this blob's objects live.
    pub fn object_prefix(&self) -> String {
        format!("blobs/{}/", self.0)
    }

    /// Object store key of this blob's manifest.
    pub fn manifest_key(&self) -> String {
        format!("blobs/{}/manifest.json", self.0)
    }

    /// File name used in the attachment disposition of a download.
    pub fn attachment_name(&self) -> String {
        format!("{}.{}", self.0, crate::DOCUMENT_EXTENSION)
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
