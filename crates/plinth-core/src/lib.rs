//! # plinth-core
//!
//! Core types, traits, and abstractions for the plinth content backend.
//!
//! This crate provides the domain models, the shared error type, and the
//! repository trait definitions that the storage, search, job, and HTTP
//! crates depend on.

pub mod defaults;
pub mod error;
pub mod file_safety;
pub mod logging;
pub mod models;
pub mod slug;
pub mod traits;
pub mod uuid_utils;
pub mod validation;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use file_safety::{detect_content_type, sanitize_filename, validate_file, ValidationResult};
pub use models::*;
pub use slug::{slugify, validate_slug};
pub use traits::*;
pub use uuid_utils::new_v7;
