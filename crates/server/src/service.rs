//! Document storage and retrieval.
//!
//! A document is a blob in the [`BlobStore`] plus one record in the metadata
//! index. The blob is always written before the record, and an upload is
//! undone record first, so compensation never leaves a record pointing at a
//! missing blob. When the record cannot be written the upload is undone
//! inline; if the request is dropped after the blob commits,
//! [`CompensationGuard`] does the same in the background.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use archivo_core::policy::{self, DeleteRequirement, ListRequest};
use archivo_core::{
    BlobId, CaseId, DocumentFilter, DocumentRecord, Identity, NewDocument, UploadPhase,
    UploadSaga,
};
use archivo_metadata::MetadataStore;
use archivo_storage::{BlobDownload, BlobStore, BlobUpload, StorageError};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedDocument {
    pub doc_id: BlobId,
    pub filename: String,
    pub size: u64,
    pub id_expediente: CaseId,
}

/// A document record as returned by the listing endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    #[serde(rename = "_id")]
    pub id: i64,
    pub doc_id: BlobId,
    pub filename: String,
    pub size: u64,
    pub id_cliente: i64,
    pub id_expediente: i64,
    pub created_at: String,
}

impl TryFrom<DocumentRecord> for DocumentView {
    type Error = ApiError;

    fn try_from(record: DocumentRecord) -> ApiResult<Self> {
        let created_at = record
            .created_at
            .format(&Rfc3339)
            .map_err(|e| ApiError::Internal(format!("failed to format created_at: {e}")))?;
        Ok(Self {
            id: record.id,
            doc_id: record.blob_id,
            filename: record.filename,
            size: record.size,
            id_cliente: record.owner_id.get(),
            id_expediente: record.case_id.get(),
            created_at,
        })
    }
}

/// Undo an upload whose record may or may not have been committed.
///
/// The record goes first. The blob is only deleted once no record for it can
/// be found, so a failed compensation leaves an orphan blob, never a record
/// without its blob. Returns whether the upload was fully undone.
async fn undo_upload(
    blobs: &dyn BlobStore,
    metadata: &dyn MetadataStore,
    blob_id: BlobId,
) -> bool {
    match metadata.delete_document(blob_id).await {
        Ok(true) => {
            tracing::warn!(%blob_id, "removed record committed by an unfinished upload")
        }
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(%blob_id, error = %e, "record delete failed during compensation");
            match metadata.get_document(blob_id).await {
                Ok(None) => {}
                Ok(Some(_)) => {
                    metrics::record_compensation("failed");
                    tracing::error!(%blob_id, "record still present; keeping blob");
                    return false;
                }
                Err(e) => {
                    metrics::record_compensation("failed");
                    tracing::error!(
                        %blob_id,
                        error = %e,
                        "cannot confirm record is gone; keeping blob"
                    );
                    return false;
                }
            }
        }
    }

    match blobs.delete(blob_id).await {
        Ok(()) => {
            metrics::record_compensation("compensated");
            true
        }
        Err(e) if e.is_not_found() => {
            metrics::record_compensation("compensated");
            true
        }
        Err(e) => {
            metrics::record_compensation("failed");
            tracing::error!(
                %blob_id,
                error = %e,
                "compensating blob delete failed; blob is orphaned"
            );
            false
        }
    }
}

/// Owns the saga of one upload and compensates if the upload is dropped.
///
/// Dropping it while the saga still owes compensation, or while an inline
/// compensation was interrupted, means the upload future was cancelled after
/// the blob committed. The record insert may have landed, so the background
/// task removes the record and then the blob.
struct CompensationGuard {
    saga: UploadSaga,
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    runtime_handle: Option<tokio::runtime::Handle>,
}

impl CompensationGuard {
    fn new(blobs: Arc<dyn BlobStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            saga: UploadSaga::new(),
            blobs,
            metadata,
            runtime_handle: tokio::runtime::Handle::try_current().ok(),
        }
    }

    /// Compensate inline after a failed metadata write.
    async fn compensate(&mut self) -> ApiResult<()> {
        self.saga.meta_failed()?;
        let blob_id = self.saga.begin_compensation()?;
        if undo_upload(self.blobs.as_ref(), self.metadata.as_ref(), blob_id).await {
            self.saga.compensated()?;
        } else {
            self.saga.compensation_failed()?;
        }
        Ok(())
    }
}

impl Drop for CompensationGuard {
    fn drop(&mut self) {
        if self.saga.phase().owes_compensation() && self.saga.begin_compensation().is_err() {
            return;
        }
        if self.saga.phase() != UploadPhase::Compensating {
            return;
        }
        let Some(blob_id) = self.saga.blob_id() else {
            return;
        };
        let Some(handle) = self.runtime_handle.as_ref() else {
            tracing::warn!(
                %blob_id,
                "upload abandoned outside a runtime; blob left for cleanup"
            );
            return;
        };

        let blobs = self.blobs.clone();
        let metadata = self.metadata.clone();
        let mut saga = self.saga.clone();
        handle.spawn(async move {
            let settled = if undo_upload(blobs.as_ref(), metadata.as_ref(), blob_id).await {
                saga.compensated()
            } else {
                saga.compensation_failed()
            };
            match settled {
                Ok(()) => {
                    tracing::info!(%blob_id, phase = %saga.phase(), "abandoned upload settled")
                }
                Err(e) => {
                    tracing::error!(%blob_id, error = %e, "abandoned upload in unexpected state")
                }
            }
        });
    }
}

/// Upload, list, download and delete with role-scoped access.
pub struct DocumentService {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    max_upload_bytes: u64,
}

impl DocumentService {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            blobs,
            metadata,
            max_upload_bytes,
        }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    fn too_large(&self) -> ApiError {
        ApiError::PayloadTooLarge {
            limit_mb: self.max_upload_bytes / (1024 * 1024),
        }
    }

    /// Store a payload and its record for `identity` under `case_id`.
    ///
    /// `body` yields the payload; an `Err` item aborts the upload with that
    /// error. Nothing is buffered beyond one blob chunk.
    #[tracing::instrument(
        skip(self, identity, body),
        fields(owner_id = %identity.subject_id, case_id = %case_id)
    )]
    pub async fn upload<S>(
        &self,
        identity: &Identity,
        case_id: CaseId,
        filename: &str,
        body: S,
    ) -> ApiResult<UploadedDocument>
    where
        S: Stream<Item = ApiResult<Bytes>> + Send,
    {
        let started = Instant::now();
        let result = self.run_upload(identity, case_id, filename, body).await;
        match &result {
            Ok(doc) => {
                metrics::DOCUMENTS_UPLOADED.inc();
                metrics::BYTES_UPLOADED.inc_by(doc.size);
                metrics::UPLOAD_DURATION.observe(started.elapsed().as_secs_f64());
                tracing::info!(blob_id = %doc.doc_id, size = doc.size, "document stored");
            }
            Err(e) => metrics::record_upload_error(e.code()),
        }
        result
    }

    async fn run_upload<S>(
        &self,
        identity: &Identity,
        case_id: CaseId,
        filename: &str,
        body: S,
    ) -> ApiResult<UploadedDocument>
    where
        S: Stream<Item = ApiResult<Bytes>> + Send,
    {
        let mut guard = CompensationGuard::new(self.blobs.clone(), self.metadata.clone());

        let mut upload = match self.blobs.open_upload(filename).await {
            Ok(upload) => upload,
            Err(e) => {
                guard.saga.blob_failed()?;
                return Err(ApiError::StorageWriteFailed(e.to_string()));
            }
        };

        if let Err(e) = self.copy_body(upload.as_mut(), body).await {
            guard.saga.blob_failed()?;
            if let Err(abort_err) = upload.abort().await {
                tracing::warn!(error = %abort_err, "failed to discard partial blob");
            }
            return Err(e);
        }

        let receipt = match upload.finish().await {
            Ok(receipt) => receipt,
            Err(e) => {
                guard.saga.blob_failed()?;
                return Err(ApiError::StorageWriteFailed(e.to_string()));
            }
        };
        guard.saga.blob_written(receipt.blob_id)?;

        let new = NewDocument {
            blob_id: receipt.blob_id,
            filename: filename.to_string(),
            size: receipt.size,
            owner_id: identity.subject_id,
            case_id,
            created_at: OffsetDateTime::now_utc(),
        };

        match self.metadata.insert_document(&new).await {
            Ok(record) => {
                guard.saga.meta_written()?;
                Ok(UploadedDocument {
                    doc_id: record.blob_id,
                    filename: record.filename,
                    size: record.size,
                    id_expediente: record.case_id,
                })
            }
            Err(meta_err) => {
                tracing::error!(
                    blob_id = %receipt.blob_id,
                    error = %meta_err,
                    "metadata write failed, undoing upload"
                );
                guard.compensate().await?;
                Err(ApiError::MetadataWriteFailed(meta_err.to_string()))
            }
        }
    }

    async fn copy_body<S>(&self, upload: &mut dyn BlobUpload, body: S) -> ApiResult<()>
    where
        S: Stream<Item = ApiResult<Bytes>> + Send,
    {
        let mut body = std::pin::pin!(body);
        let mut total: u64 = 0;
        while let Some(part) = body.next().await {
            let part = part?;
            total = total.saturating_add(part.len() as u64);
            if total > self.max_upload_bytes {
                return Err(self.too_large());
            }
            upload
                .write(part)
                .await
                .map_err(|e| ApiError::StorageWriteFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// List documents visible to `identity`.
    pub async fn list(
        &self,
        identity: &Identity,
        request: ListRequest,
    ) -> ApiResult<Vec<DocumentView>> {
        self.query(policy::effective_filter(identity, request)).await
    }

    /// Every record, for the unrestricted listing.
    pub async fn list_all(&self, page: archivo_core::Page) -> ApiResult<Vec<DocumentView>> {
        self.query(DocumentFilter::all(page)).await
    }

    async fn query(&self, filter: DocumentFilter) -> ApiResult<Vec<DocumentView>> {
        let records = self
            .metadata
            .list_documents(&filter)
            .await
            .map_err(|e| ApiError::MetadataReadFailed(e.to_string()))?;
        records.into_iter().map(DocumentView::try_from).collect()
    }

    /// Open a blob for streaming. No ownership check: blob ids are capabilities.
    pub async fn download(&self, blob_id: BlobId) -> ApiResult<BlobDownload> {
        match self.blobs.open_download(blob_id).await {
            Ok(download) => {
                metrics::DOCUMENTS_DOWNLOADED.inc();
                Ok(download)
            }
            Err(StorageError::NotFound(_)) => {
                Err(ApiError::NotFound(format!("document {blob_id} not found")))
            }
            Err(e) => Err(ApiError::StorageReadFailed(e.to_string())),
        }
    }

    /// Delete a blob and then its record.
    #[tracing::instrument(skip(self, identity), fields(subject_id = %identity.subject_id))]
    pub async fn delete(&self, identity: &Identity, blob_id: BlobId) -> ApiResult<()> {
        if let DeleteRequirement::OwnedBy(owner_id) = policy::delete_requirement(identity) {
            let owned = self
                .metadata
                .document_owned_by(blob_id, owner_id)
                .await
                .map_err(|e| ApiError::MetadataReadFailed(e.to_string()))?;
            if !owned {
                return Err(ApiError::Forbidden(
                    "document does not belong to caller".to_string(),
                ));
            }
        }

        if let Err(e) = self.blobs.delete(blob_id).await {
            if !e.is_not_found() {
                tracing::error!(%blob_id, error = %e, "blob delete failed");
            }
            return Err(ApiError::NotFound(format!("document {blob_id} not found")));
        }

        match self.metadata.delete_document(blob_id).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(%blob_id, "blob had no record"),
            Err(e) => tracing::warn!(%blob_id, error = %e, "record delete failed after blob delete"),
        }
        metrics::DOCUMENTS_DELETED.inc();
        Ok(())
    }
}
