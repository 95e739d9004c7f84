//! Application state shared across handlers.

use crate::auth::IdentityVerifier;
use crate::service::DocumentService;
use archivo_core::config::AppConfig;
use archivo_metadata::MetadataStore;
use archivo_storage::BlobStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Credential verifier built from `config.auth`.
    pub verifier: Arc<IdentityVerifier>,
    /// Document operations over both stores.
    pub documents: Arc<DocumentService>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Logs a warning when the unrestricted listing is exposed without
    /// credentials.
    pub fn new(
        config: AppConfig,
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        if config.server.expose_unrestricted_listing {
            tracing::warn!(
                "server.expose_unrestricted_listing is enabled: GET /admin/documentos \
                 lists every document without credentials"
            );
        }

        let verifier = IdentityVerifier::new(&config.auth);
        let documents = DocumentService::new(blobs, metadata, config.server.max_upload_bytes());

        Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            documents: Arc::new(documents),
        }
    }
}
