//! # plinth-search
//!
//! Post search for plinth.
//!
//! This crate provides:
//! - The [`SearchIndex`] trait over an external search engine
//! - [`MeilisearchIndex`], an HTTP client for Meilisearch
//! - [`HybridSearchEngine`], which queries the engine while it is healthy and
//!   falls back to PostgreSQL full-text search otherwise
//!
//! ## Example
//!
//! ```ignore
//! use plinth_search::{HybridSearchEngine, SearchConfig};
//! use plinth_db::Database;
//!
//! let db = Database::connect("postgres://...").await?;
//! let index = SearchConfig::from_env().build_index()?;
//! let engine = HybridSearchEngine::new(db, index);
//!
//! let results = engine.search_posts("rust ownership", 20, 0).await?;
//! println!("{} hits via {}", results.total, results.backend);
//! ```

pub mod hybrid;
pub mod index;
pub mod meilisearch;

// Re-export core types
pub use plinth_core::*;

pub use hybrid::{HybridSearchEngine, PostSearchResults, SearchBackend};
pub use index::{SearchConfig, SearchHits, SearchIndex};
pub use meilisearch::MeilisearchIndex;
