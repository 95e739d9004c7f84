//! Credential verification and request tracing middleware.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use archivo_core::config::AuthConfig;
use archivo_core::{ClientId, Identity, Role};
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    /// The value is truncated to MAX_TRACE_ID_LEN characters and non-printable characters removed.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Claims carried by a bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (client id).
    pub sub: i64,
    /// Role name: `CLIENTE`, `ADMIN` or `OPERADOR`.
    pub tipo: String,
    /// Expiry (seconds since epoch).
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
}

/// Why a credential was rejected. Only ever logged.
#[derive(Debug, thiserror::Error)]
enum Rejection {
    #[error("no bearer credential")]
    Missing,
    #[error("{0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("unknown role {0:?}")]
    UnknownRole(String),
    #[error("non-positive subject {0}")]
    BadSubject(i64),
}

/// Checks HMAC-signed bearer credentials and turns them into an [`Identity`].
pub struct IdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl IdentityVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = config.leeway_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    /// Verify a raw credential (without the `Bearer ` prefix).
    pub fn verify(&self, credential: &str) -> ApiResult<Identity> {
        self.check(credential).map_err(reject)
    }

    /// Verify the `Authorization` header of a request.
    pub fn verify_headers(&self, headers: &HeaderMap) -> ApiResult<Identity> {
        let credential = extract_bearer_token(headers).ok_or(Rejection::Missing);
        credential
            .and_then(|credential| self.check(credential))
            .map_err(reject)
    }

    fn check(&self, credential: &str) -> Result<Identity, Rejection> {
        let data = jsonwebtoken::decode::<Claims>(credential, &self.key, &self.validation)?;
        let claims = data.claims;
        let role: Role = claims
            .tipo
            .parse()
            .map_err(|_| Rejection::UnknownRole(claims.tipo.clone()))?;
        let subject_id = ClientId::new(claims.sub).map_err(|_| Rejection::BadSubject(claims.sub))?;
        Ok(Identity::new(subject_id, role))
    }
}

fn reject(rejection: Rejection) -> ApiError {
    tracing::debug!(reason = %rejection, "credential rejected");
    ApiError::Unauthorized
}

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let scheme = value.get(..7)?;
    if scheme.eq_ignore_ascii_case("bearer ") {
        value.get(7..).map(str::trim).filter(|token| !token.is_empty())
    } else {
        None
    }
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Tag every request with a trace id and run it inside a span carrying it.
pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(&req);
    let span = tracing::info_span!("request", trace_id = %trace_id);
    req.extensions_mut().insert(trace_id);
    next.run(req).instrument(span).await
}

/// Require a valid bearer credential and attach the [`Identity`] to the request.
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = state.verifier.verify_headers(req.headers())?;
    tracing::debug!(
        subject_id = %identity.subject_id,
        role = %identity.role,
        "credential accepted"
    );
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
