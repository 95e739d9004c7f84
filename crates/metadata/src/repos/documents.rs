//! Document repository.

use crate::error::MetadataResult;
use archivo_core::{BlobId, ClientId, DocumentFilter, DocumentRecord, NewDocument};
use async_trait::async_trait;

/// Repository for document records.
#[async_trait]
pub trait DocumentRepo: Send + Sync {
    /// Insert a record. Fails with `AlreadyExists` when the blob id is taken.
    async fn insert_document(&self, doc: &NewDocument) -> MetadataResult<DocumentRecord>;

    /// Records matching the filter, newest first (ties by id, descending).
    async fn list_documents(&self, filter: &DocumentFilter)
    -> MetadataResult<Vec<DocumentRecord>>;

    /// Get a record by blob id.
    async fn get_document(&self, blob_id: BlobId) -> MetadataResult<Option<DocumentRecord>>;

    /// Whether a record for this blob exists and belongs to `owner_id`.
    async fn document_owned_by(&self, blob_id: BlobId, owner_id: ClientId)
    -> MetadataResult<bool>;

    /// Delete the record for a blob. Returns whether a row was removed.
    async fn delete_document(&self, blob_id: BlobId) -> MetadataResult<bool>;
}
