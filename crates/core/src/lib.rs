//! Core domain types and shared logic for the Archivo document service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Blob identifiers and document records
//! - Caller identity and roles
//! - The role-based access policy for listing and deletion
//! - Pagination parameters
//! - The upload saga (blob write, metadata write, compensation)
//! - Process-wide configuration

pub mod blob;
pub mod config;
pub mod document;
pub mod error;
pub mod identity;
pub mod pagination;
pub mod policy;
pub mod upload;

pub use blob::BlobId;
pub use document::{CaseId, DocumentRecord, NewDocument};
pub use error::{Error, Result};
pub use identity::{ClientId, Identity, Role};
pub use pagination::Page;
pub use policy::{DeleteRequirement, DocumentFilter, ListRequest};
pub use upload::{UploadPhase, UploadSaga};

/// Content type served for every downloaded document.
pub const DOCUMENT_CONTENT_TYPE: &str = "application/pdf";

/// File extension appended to the blob id in download dispositions.
pub const DOCUMENT_EXTENSION: &str = "pdf";
