//! Archivo server binary.

use anyhow::{Context, Result};
use archivo_core::config::AppConfig;
use archivo_server::{AppState, create_router};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Archivo - multi-tenant document storage
#[derive(Parser, Debug)]
#[command(name = "archivo-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "ARCHIVO_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Merge the optional TOML file with `ARCHIVO_`-prefixed environment variables.
fn load_config(config_path: &str) -> Result<AppConfig> {
    let path = Path::new(config_path);
    let mut figment = Figment::new();
    let has_config_file = path.exists();

    if has_config_file {
        tracing::info!(config_path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", config_path);
    }

    // ARCHIVO_CONFIG is just the path
    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("ARCHIVO_") && key != "ARCHIVO_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: archivo-server --config /path/to/config.toml\n  \
             2. Environment variables: ARCHIVO_AUTH__JWT_SECRET=... archivo-server\n\n\
             Set ARCHIVO_CONFIG to specify a default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("ARCHIVO_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Archivo v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    if config.server.metrics_enabled {
        archivo_server::metrics::register_metrics();
        tracing::info!("Prometheus metrics registered");
    }

    let blobs = archivo_storage::blob_store_from_config(&config.storage, &config.blobs)
        .await
        .context("failed to initialize blob storage")?;
    // Catch misconfigured storage before reporting healthy.
    blobs
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(
        chunk_size_bytes = config.blobs.chunk_size_bytes,
        "Blob storage initialized"
    );

    let metadata = archivo_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!(backend = metadata.backend_name(), "Metadata store initialized");

    let state = AppState::new(config.clone(), blobs, metadata);
    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivo_core::config::{MetadataConfig, StorageConfig};
    use tempfile::tempdir;

    #[test]
    fn load_config_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "127.0.0.1:9000"
max_upload_mb = 10
expose_unrestricted_listing = false

[storage]
type = "filesystem"
path = "/srv/archivo/blobs"

[metadata]
type = "sqlite"
path = "/srv/archivo/metadata.db"

[auth]
jwt_secret = "file-secret"
leeway_secs = 5
"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.server.max_upload_mb, 10);
        assert!(!config.server.expose_unrestricted_listing);
        assert_eq!(config.auth.leeway_secs, 5);
        assert!(matches!(config.storage, StorageConfig::Filesystem { .. }));
        assert!(matches!(config.metadata, MetadataConfig::Sqlite { .. }));
    }

    #[test]
    fn load_config_rejects_invalid_values() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[blobs]
chunk_size_bytes = 10

[auth]
jwt_secret = "file-secret"
"#,
        )
        .unwrap();

        assert!(load_config(path.to_str().unwrap()).is_err());
    }
}
