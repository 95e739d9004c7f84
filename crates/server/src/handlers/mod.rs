//! HTTP request handlers.

pub mod documents;
pub mod health;

pub use documents::*;
pub use health::*;
