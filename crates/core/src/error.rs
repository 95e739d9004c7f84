//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid blob id: {0}")]
    InvalidBlobId(String),

    #[error("invalid case id: {0}")]
    InvalidCaseId(String),

    #[error("invalid client id: {0}")]
    InvalidClientId(String),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("invalid upload transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
