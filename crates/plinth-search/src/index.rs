//! Search engine abstraction and its configuration.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use plinth_core::{defaults, PostDocument, Result};

use crate::meilisearch::MeilisearchIndex;

/// Ranked post ids returned by the engine, plus its total hit estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHits {
    pub ids: Vec<Uuid>,
    pub total: i64,
}

/// An external full-text index holding public posts.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Whether the engine is reachable and ready. Never errors.
    async fn health(&self) -> bool;

    /// Add or replace one post document.
    async fn index_post(&self, doc: &PostDocument) -> Result<()>;

    /// Add or replace a batch of post documents.
    async fn index_posts(&self, docs: &[PostDocument]) -> Result<()> {
        for doc in docs {
            self.index_post(doc).await?;
        }
        Ok(())
    }

    async fn remove_post(&self, id: Uuid) -> Result<()>;

    async fn search(&self, query: &str, limit: i64, offset: i64) -> Result<SearchHits>;

    /// Remove every document from the index.
    async fn clear(&self) -> Result<()>;
}

/// Search engine settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Engine base URL. `None` disables the engine; search runs on SQL only.
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub index: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            index: defaults::SEARCH_INDEX.to_string(),
            timeout_secs: defaults::SEARCH_TIMEOUT_SECS,
        }
    }
}

impl SearchConfig {
    /// Read `SEARCH_URL`, `SEARCH_API_KEY`, `SEARCH_INDEX` and
    /// `SEARCH_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        Self {
            url: non_empty("SEARCH_URL").map(|u| u.trim_end_matches('/').to_string()),
            api_key: non_empty("SEARCH_API_KEY"),
            index: non_empty("SEARCH_INDEX").unwrap_or_else(|| defaults::SEARCH_INDEX.to_string()),
            timeout_secs: std::env::var("SEARCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::SEARCH_TIMEOUT_SECS),
        }
    }

    /// Build the configured engine client, or `None` when no URL is set.
    pub fn build_index(&self) -> Result<Option<Arc<dyn SearchIndex>>> {
        match &self.url {
            Some(url) => {
                info!(
                    subsystem = "search",
                    component = "meilisearch",
                    url = %url,
                    index = %self.index,
                    "Search engine configured"
                );
                let index = MeilisearchIndex::new(
                    url.clone(),
                    self.index.clone(),
                    self.api_key.clone(),
                    self.timeout_secs,
                )?;
                Ok(Some(Arc::new(index)))
            }
            None => {
                debug!(
                    subsystem = "search",
                    "SEARCH_URL not set, search runs on PostgreSQL only"
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_no_engine() {
        let config = SearchConfig::default();
        assert!(config.url.is_none());
        assert_eq!(config.index, "posts");
        assert!(config.build_index().unwrap().is_none());
    }

    #[test]
    fn test_configured_url_builds_client() {
        let config = SearchConfig {
            url: Some("http://localhost:7700".to_string()),
            ..Default::default()
        };
        assert!(config.build_index().unwrap().is_some());
    }
}
