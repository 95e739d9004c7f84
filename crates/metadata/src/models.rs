//! Database rows mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use archivo_core::{BlobId, CaseId, ClientId, DocumentRecord};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Document row as stored in PostgreSQL.
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: i64,
    pub blob_id: Uuid,
    pub filename: String,
    pub size: i64,
    pub owner_id: i64,
    pub case_id: i64,
    pub created_at: OffsetDateTime,
}

/// Document row as stored in SQLite.
///
/// `created_at` is kept as integer microseconds since the epoch so that
/// ordering by it is numeric rather than textual.
#[derive(Debug, Clone, FromRow)]
pub struct SqliteDocumentRow {
    pub id: i64,
    pub blob_id: Uuid,
    pub filename: String,
    pub size: i64,
    pub owner_id: i64,
    pub case_id: i64,
    pub created_at_us: i64,
}

impl DocumentRow {
    pub fn into_record(self) -> MetadataResult<DocumentRecord> {
        let corrupt = |e: archivo_core::Error| {
            MetadataError::CorruptRow(format!("document {}: {e}", self.id))
        };
        Ok(DocumentRecord {
            id: self.id,
            blob_id: BlobId::from_uuid(self.blob_id),
            size: u64::try_from(self.size).map_err(|_| {
                MetadataError::CorruptRow(format!("document {}: negative size", self.id))
            })?,
            owner_id: ClientId::new(self.owner_id).map_err(corrupt)?,
            case_id: CaseId::new(self.case_id).map_err(corrupt)?,
            filename: self.filename,
            created_at: self.created_at,
        })
    }
}

impl SqliteDocumentRow {
    pub fn into_record(self) -> MetadataResult<DocumentRecord> {
        let created_at = micros_to_datetime(self.created_at_us).ok_or_else(|| {
            MetadataError::CorruptRow(format!("document {}: bad timestamp", self.id))
        })?;
        DocumentRow {
            id: self.id,
            blob_id: self.blob_id,
            filename: self.filename,
            size: self.size,
            owner_id: self.owner_id,
            case_id: self.case_id,
            created_at,
        }
        .into_record()
    }
}

pub(crate) fn datetime_to_micros(at: OffsetDateTime) -> i64 {
    let micros = at.unix_timestamp_nanos() / 1_000;
    i64::try_from(micros).unwrap_or(i64::MAX)
}

pub(crate) fn micros_to_datetime(micros: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000).ok()
}
