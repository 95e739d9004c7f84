//! Health endpoint.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health - Probe both stores. Intentionally unauthenticated for load balancers.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state
        .documents
        .metadata()
        .health_check()
        .await
        .map_err(|e| ApiError::MetadataReadFailed(e.to_string()))?;
    state
        .documents
        .blobs()
        .health_check()
        .await
        .map_err(|e| ApiError::StorageReadFailed(e.to_string()))?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}
