//! Repository traits for metadata operations.

pub mod documents;

pub use documents::DocumentRepo;
