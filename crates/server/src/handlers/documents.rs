//! Document endpoints.

use crate::error::{ApiError, ApiResult};
use crate::service::{DocumentView, UploadedDocument};
use crate::state::AppState;
use archivo_core::policy::{self, ListRequest};
use archivo_core::{BlobId, CaseId, DOCUMENT_CONTENT_TYPE, Identity, Page};
use axum::body::Body;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures::StreamExt;
use serde::Deserialize;

/// Multipart field carrying the case identifier.
const CASE_FIELD: &str = "id_expediente";
/// Multipart field carrying the payload.
const FILE_FIELD: &str = "file";

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub id_expediente: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

fn parse_case_id(raw: Option<&str>) -> ApiResult<CaseId> {
    let raw = raw.ok_or_else(|| ApiError::BadRequest(format!("{CASE_FIELD} is required")))?;
    Ok(CaseId::parse(raw)?)
}

/// Errors while reading multipart structure are the client's fault.
fn malformed(limit_mb: u64) -> impl Fn(MultipartError) -> ApiError {
    move |e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge { limit_mb }
        } else {
            ApiError::BadRequest(format!("malformed multipart body: {}", e.body_text()))
        }
    }
}

/// Errors while streaming the payload abort the blob write.
fn payload_failed(limit_mb: u64) -> impl Fn(MultipartError) -> ApiError {
    move |e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge { limit_mb }
        } else {
            ApiError::StorageWriteFailed(format!("reading upload body: {}", e.body_text()))
        }
    }
}

/// POST /documentos - Upload a document.
///
/// The case id comes from the `id_expediente` form field (which must precede
/// the `file` field) or from the query string.
pub async fn upload_document(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<UploadQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadedDocument>> {
    let mut multipart =
        multipart.map_err(|e| ApiError::BadRequest(format!("expected multipart body: {e}")))?;
    let limit_mb = state.config.server.max_upload_mb;
    let mut case_raw = query.id_expediente;

    while let Some(field) = multipart.next_field().await.map_err(malformed(limit_mb))? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(CASE_FIELD) => {
                case_raw = Some(field.text().await.map_err(malformed(limit_mb))?);
            }
            Some(FILE_FIELD) => {
                let case_id = parse_case_id(case_raw.as_deref())?;
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("file part has no filename".to_string()))?;
                let body = field.map(|part| part.map_err(payload_failed(limit_mb)));
                let doc = state
                    .documents
                    .upload(&identity, case_id, &filename, body)
                    .await?;
                return Ok(Json(doc));
            }
            _ => {}
        }
    }

    // Report a bad case id ahead of the missing file.
    parse_case_id(case_raw.as_deref())?;
    Err(ApiError::BadRequest(format!("{FILE_FIELD} part is required")))
}

/// GET /mis-documentos - The caller's own documents.
pub async fn list_own_documents(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<DocumentView>>> {
    let docs = state.documents.list(&identity, ListRequest::Own).await?;
    Ok(Json(docs))
}

/// GET /expedientes/{id_expediente}/documentos - Documents of one case.
pub async fn list_case_documents(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(case_raw): Path<String>,
) -> ApiResult<Json<Vec<DocumentView>>> {
    let case_id = CaseId::parse(&case_raw)?;
    let docs = state
        .documents
        .list(&identity, ListRequest::Case(case_id))
        .await?;
    Ok(Json(docs))
}

/// GET /admin/documentos - Every document, newest first.
///
/// Open to anyone while `server.expose_unrestricted_listing` is set;
/// otherwise restricted to `ADMIN` and `OPERADOR`.
pub async fn list_all_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<DocumentView>>> {
    let page = Page::from_query(query.limit.as_deref(), query.offset.as_deref());

    if state.config.server.expose_unrestricted_listing {
        return Ok(Json(state.documents.list_all(page).await?));
    }

    let identity = state.verifier.verify_headers(&headers)?;
    if !policy::may_list_all(&identity) {
        return Err(ApiError::Forbidden(format!(
            "role {} may not list all documents",
            identity.role
        )));
    }
    let docs = state
        .documents
        .list(&identity, ListRequest::All(page))
        .await?;
    Ok(Json(docs))
}

/// GET /documentos/{doc_id} - Stream a document. Public.
pub async fn download_document(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Response> {
    let blob_id = BlobId::parse(&raw_id)?;
    let download = state.documents.download(blob_id).await?;

    let body_stream = download
        .stream
        .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));
    let disposition = format!("attachment; filename={}", blob_id.attachment_name());

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, DOCUMENT_CONTENT_TYPE.to_string()),
            (CONTENT_LENGTH, download.manifest.size.to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(body_stream),
    )
        .into_response())
}

/// DELETE /documentos/{doc_id} - Delete a document and its record.
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(raw_id): Path<String>,
) -> ApiResult<StatusCode> {
    let blob_id = BlobId::parse(&raw_id)?;
    state.documents.delete(&identity, blob_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
