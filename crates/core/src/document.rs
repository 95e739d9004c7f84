//! Document records.

use crate::blob::BlobId;
use crate::identity::ClientId;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Positive identifier of the case record a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct CaseId(i64);

impl CaseId {
    pub fn new(id: i64) -> crate::Result<Self> {
        if id <= 0 {
            return Err(crate::Error::InvalidCaseId(id.to_string()));
        }
        Ok(Self(id))
    }

    /// Parse a case identifier as received from a caller. Surrounding
    /// whitespace is not accepted.
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let id: i64 = raw
            .parse()
            .map_err(|_| crate::Error::InvalidCaseId(raw.to_string()))?;
        Self::new(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for CaseId {
    type Error = crate::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CaseId> for i64 {
    fn from(id: CaseId) -> Self {
        id.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A document about to be inserted into the metadata index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub blob_id: BlobId,
    pub filename: String,
    pub size: u64,
    pub owner_id: ClientId,
    pub case_id: CaseId,
    pub created_at: OffsetDateTime,
}

/// A persisted document record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    /// Store-generated identifier.
    pub id: i64,
    pub blob_id: BlobId,
    pub filename: String,
    pub size: u64,
    pub owner_id: ClientId,
    pub case_id: CaseId,
    pub created_at: OffsetDateTime,
}

impl DocumentRecord {
    pub fn from_new(id: i64, doc: NewDocument) -> Self {
        Self {
            id,
            blob_id: doc.blob_id,
            filename: doc.filename,
            size: doc.size,
            owner_id: doc.owner_id,
            case_id: doc.case_id,
            created_at: doc.created_at,
        }
    }
}
