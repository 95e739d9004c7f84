//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Smallest accepted blob chunk size.
pub const MIN_CHUNK_SIZE: u64 = 1024;

/// Largest accepted blob chunk size.
pub const MAX_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// Default blob chunk size (255 KiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 255 * 1024;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8081").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upload size cap in MiB.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
    /// Request body read timeout in seconds.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Response body write timeout in seconds.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    /// CORS allowed origins. `["*"]` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Serve `GET /admin/documentos` without a credential.
    /// When false the endpoint requires an ADMIN or OPERADOR credential.
    #[serde(default = "default_expose_unrestricted_listing")]
    pub expose_unrestricted_listing: bool,
    /// Enable the /metrics endpoint for Prometheus scraping.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_max_upload_mb() -> u64 {
    50
}

fn default_read_timeout_secs() -> u64 {
    20
}

fn default_write_timeout_secs() -> u64 {
    120
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_expose_unrestricted_listing() -> bool {
    true
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_mb: default_max_upload_mb(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            allowed_origins: default_allowed_origins(),
            expose_unrestricted_listing: default_expose_unrestricted_listing(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Upload cap in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Whether any origin is allowed.
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o.trim() == "*")
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_upload_mb == 0 {
            return Err("server.max_upload_mb must be at least 1".to_string());
        }
        if self.read_timeout_secs == 0 || self.write_timeout_secs == 0 {
            return Err("server timeouts must be at least 1 second".to_string());
        }
        if self.allowed_origins.is_empty() {
            return Err("server.allowed_origins cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Object storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/blobs"),
        }
    }
}

/// Chunking parameters of the blob store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlobConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: u64,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: default_chunk_size(),
        }
    }
}

impl BlobConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size_bytes) {
            return Err(format!(
                "blobs.chunk_size_bytes {} outside [{MIN_CHUNK_SIZE}, {MAX_CHUNK_SIZE}]",
                self.chunk_size_bytes
            ));
        }
        Ok(())
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (testing and small deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds. Advisory only: slow queries are logged,
        /// not cancelled.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL.
        url: String,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                max_connections,
                ..
            } => {
                if url.trim().is_empty() {
                    return Err("postgres config requires a non-empty 'url'".to_string());
                }
                if *max_connections == 0 {
                    return Err("metadata.max_connections must be at least 1".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Credential verification settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for bearer credentials. Required.
    pub jwt_secret: String,
    /// Clock skew tolerated when checking expiry, in seconds.
    #[serde(default)]
    pub leeway_secs: u64,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl AuthConfig {
    /// Test configuration with a fixed secret.
    pub fn for_testing() -> Self {
        Self {
            jwt_secret: "test-secret-do-not-use".to_string(),
            leeway_secs: 0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.trim().is_empty() {
            return Err("auth.jwt_secret is required".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub blobs: BlobConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Credential verification (required).
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata
    /// and a fixed signing secret.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            blobs: BlobConfig::default(),
            metadata: MetadataConfig::default(),
            auth: AuthConfig::for_testing(),
        }
    }

    /// Check every section.
    pub fn validate(&self) -> crate::Result<()> {
        self.server
            .validate()
            .and_then(|_| self.blobs.validate())
            .and_then(|_| self.metadata.validate())
            .and_then(|_| self.auth.validate())
            .map_err(crate::Error::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "0.0.0.0:8081");
        assert_eq!(config.max_upload_bytes(), 50 * 1024 * 1024);
        assert_eq!(config.read_timeout(), Duration::from_secs(20));
        assert_eq!(config.write_timeout(), Duration::from_secs(120));
        assert!(config.allows_any_origin());
        assert!(config.expose_unrestricted_listing);
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_minimal_config_only_needs_secret() {
        let json = r#"{"auth": {"jwt_secret": "s3cr3t"}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.auth.jwt_secret, "s3cr3t");
        assert_eq!(config.auth.leeway_secs, 0);
        assert_eq!(config.blobs.chunk_size_bytes, DEFAULT_CHUNK_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_auth_section_rejected() {
        let json = r#"{"server": {"bind": "127.0.0.1:0"}}"#;
        assert!(serde_json::from_str::<AppConfig>(json).is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let mut config = AppConfig::for_testing();
        config.auth.jwt_secret = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_redacted_in_debug() {
        let config = AuthConfig::for_testing();
        let debug = format!("{config:?}");
        assert!(!debug.contains("test-secret-do-not-use"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_chunk_size_bounds() {
        let mut blobs = BlobConfig::default();
        assert!(blobs.validate().is_ok());
        blobs.chunk_size_bytes = 512;
        assert!(blobs.validate().is_err());
        blobs.chunk_size_bytes = MAX_CHUNK_SIZE + 1;
        assert!(blobs.validate().is_err());
        blobs.chunk_size_bytes = MIN_CHUNK_SIZE;
        assert!(blobs.validate().is_ok());
    }

    #[test]
    fn test_metadata_config_tagged() {
        let json = r#"{"type":"postgres","url":"postgres://localhost/archivo"}"#;
        let config: MetadataConfig = serde_json::from_str(json).unwrap();
        match config {
            MetadataConfig::Postgres {
                max_connections,
                statement_timeout_ms,
                ..
            } => {
                assert_eq!(max_connections, 10);
                assert_eq!(statement_timeout_ms, Some(30_000));
            }
            _ => panic!("expected postgres config"),
        }

        let empty = MetadataConfig::Postgres {
            url: String::new(),
            max_connections: 1,
            statement_timeout_ms: None,
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_zero_upload_cap_rejected() {
        let mut config = AppConfig::for_testing();
        config.server.max_upload_mb = 0;
        assert!(config.validate().is_err());
    }
}
