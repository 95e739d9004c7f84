//! Route configuration.

use crate::auth::{require_identity, trace_middleware};
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use archivo_core::config::ServerConfig;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::{delete, get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::{RequestBodyTimeoutLayer, ResponseBodyTimeoutLayer};
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and the case field on top of the payload cap.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins = if config.allows_any_origin() {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(%origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;
    let auth = middleware::from_fn_with_state(state.clone(), require_identity);
    let body_limit = usize::try_from(server.max_upload_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let mut router = Router::new()
        // Health check (intentionally unauthenticated for load balancers/k8s probes)
        .route("/health", get(handlers::health_check))
        .route(
            "/documentos",
            post(handlers::upload_document).route_layer(auth.clone()),
        )
        .route(
            "/documentos/{doc_id}",
            // Download is public; blob ids are capabilities.
            get(handlers::download_document)
                .merge(delete(handlers::delete_document).route_layer(auth.clone())),
        )
        .route(
            "/mis-documentos",
            get(handlers::list_own_documents).route_layer(auth.clone()),
        )
        .route(
            "/expedientes/{id_expediente}/documentos",
            get(handlers::list_case_documents).route_layer(auth),
        )
        // Credentials are checked in the handler when the listing is not exposed.
        .route("/admin/documentos", get(handlers::list_all_documents));

    // SECURITY: When enabled, this endpoint should be network-restricted
    // to the Prometheus scraper. See crate::metrics.
    if server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyTimeoutLayer::new(server.read_timeout()))
        .layer(ResponseBodyTimeoutLayer::new(server.write_timeout()))
        .layer(cors_layer(server))
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
