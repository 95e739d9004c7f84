//! HTTP document storage service.
//!
//! This crate provides:
//! - Bearer credential verification and role-scoped access
//! - Document upload with blob/record compensation
//! - Owner, case and unrestricted listings
//! - Public streaming download and delete
//! - Health and Prometheus endpoints

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod service;
pub mod state;

pub use auth::{IdentityVerifier, TraceId};
pub use error::ApiError;
pub use routes::create_router;
pub use service::DocumentService;
pub use state::AppState;
