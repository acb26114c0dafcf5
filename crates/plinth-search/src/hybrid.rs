//! Engine-first post search with a PostgreSQL fallback.
//!
//! The engine is consulted only when it is configured and its health probe
//! passes. Any engine failure degrades the request to full-text SQL; there
//! is no caching and no attempt to keep the engine consistent beyond the
//! indexing jobs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use plinth_core::{defaults, Error, Post, PostDocument, PostRepository, Result};
use plinth_db::Database;

use crate::index::SearchIndex;

/// Which backend answered a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    Engine,
    Sql,
}

impl fmt::Display for SearchBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchBackend::Engine => "engine",
            SearchBackend::Sql => "sql",
        })
    }
}

/// Search results hydrated from the database.
#[derive(Debug, Clone, Serialize)]
pub struct PostSearchResults {
    pub items: Vec<Post>,
    pub total: i64,
    pub backend: SearchBackend,
}

/// Post search over an optional engine, falling back to SQL.
#[derive(Clone)]
pub struct HybridSearchEngine {
    db: Database,
    index: Option<Arc<dyn SearchIndex>>,
}

impl HybridSearchEngine {
    pub fn new(db: Database, index: Option<Arc<dyn SearchIndex>>) -> Self {
        Self { db, index }
    }

    /// Whether an engine is configured at all.
    pub fn engine_configured(&self) -> bool {
        self.index.is_some()
    }

    /// Probe the engine. `None` when no engine is configured.
    pub async fn engine_status(&self) -> Option<bool> {
        match &self.index {
            Some(index) => Some(index.health().await),
            None => None,
        }
    }

    #[instrument(skip(self), fields(subsystem = "search", component = "hybrid_search", op = "search_posts"))]
    pub async fn search_posts(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<PostSearchResults> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("search query must not be empty".to_string()));
        }
        let start = Instant::now();

        if let Some(index) = &self.index {
            if index.health().await {
                match self.search_engine(index.as_ref(), query, limit, offset).await {
                    Ok(results) => {
                        info!(
                            backend = %SearchBackend::Engine,
                            result_count = results.items.len(),
                            duration_ms = start.elapsed().as_millis() as u64,
                            "Search completed"
                        );
                        return Ok(results);
                    }
                    Err(e) => warn!(error = %e, "Engine search failed, falling back to SQL"),
                }
            } else {
                warn!("Search engine unhealthy, falling back to SQL");
            }
        }

        let page = self.db.posts.search_fulltext(query, limit, offset).await?;
        info!(
            backend = %SearchBackend::Sql,
            result_count = page.items.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Search completed"
        );
        Ok(PostSearchResults {
            items: page.items,
            total: page.total,
            backend: SearchBackend::Sql,
        })
    }

    async fn search_engine(
        &self,
        index: &dyn SearchIndex,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<PostSearchResults> {
        let hits = index.search(query, limit, offset).await?;
        let posts = self.db.posts.get_public_many(&hits.ids).await?;
        let items = order_by_ids(&hits.ids, posts);
        if items.len() < hits.ids.len() {
            debug!(
                dropped = hits.ids.len() - items.len(),
                "Engine returned posts that are no longer public"
            );
        }
        Ok(PostSearchResults {
            items,
            total: hits.total,
            backend: SearchBackend::Engine,
        })
    }

    /// Bring the engine's copy of one post up to date: index it while public,
    /// remove it otherwise. A no-op without an engine.
    #[instrument(skip(self), fields(subsystem = "search", component = "hybrid_search", op = "sync_post"))]
    pub async fn sync_post(&self, post_id: Uuid) -> Result<()> {
        let Some(index) = &self.index else {
            return Ok(());
        };

        match self.db.posts.get(post_id).await? {
            Some(post) if post.is_public() => {
                let doc = self.document_for(&post).await?;
                index.index_post(&doc).await?;
                debug!("Post indexed");
            }
            _ => {
                index.remove_post(post_id).await?;
                debug!("Post removed from index");
            }
        }
        Ok(())
    }

    /// Drop one post from the engine. A no-op without an engine.
    pub async fn remove_post(&self, post_id: Uuid) -> Result<()> {
        match &self.index {
            Some(index) => index.remove_post(post_id).await,
            None => Ok(()),
        }
    }

    /// Clear the engine and push every public post in batches. Returns the
    /// number of documents indexed.
    #[instrument(skip(self), fields(subsystem = "search", component = "hybrid_search", op = "reindex_all"))]
    pub async fn reindex_all(&self) -> Result<usize> {
        let Some(index) = &self.index else {
            debug!("No search engine configured, nothing to reindex");
            return Ok(0);
        };
        let start = Instant::now();

        index.clear().await?;

        let mut indexed = 0usize;
        let mut after = None;
        loop {
            let batch = self
                .db
                .posts
                .list_public_after(after, defaults::SEARCH_REINDEX_BATCH)
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            after = Some(last.id);

            let mut docs = Vec::with_capacity(batch.len());
            for post in &batch {
                docs.push(self.document_for(post).await?);
            }
            index.index_posts(&docs).await?;
            indexed += docs.len();

            if (batch.len() as i64) < defaults::SEARCH_REINDEX_BATCH {
                break;
            }
        }

        info!(
            result_count = indexed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Reindex completed"
        );
        Ok(indexed)
    }

    async fn document_for(&self, post: &Post) -> Result<PostDocument> {
        let tags = self
            .db
            .posts
            .tags(post.id)
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        Ok(PostDocument::from_post(post, tags))
    }
}

/// Arrange posts in the engine's ranking order, dropping ids with no post.
fn order_by_ids(ids: &[Uuid], posts: Vec<Post>) -> Vec<Post> {
    let mut by_id: HashMap<Uuid, Post> = posts.into_iter().map(|p| (p.id, p)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use plinth_core::PostStatus;

    fn post(id: Uuid) -> Post {
        let now = Utc::now();
        Post {
            id,
            author_id: Uuid::nil(),
            organization_id: None,
            title: id.to_string(),
            slug: id.simple().to_string(),
            excerpt: None,
            body: String::new(),
            status: PostStatus::Published,
            published_at: Some(now),
            featured_media_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_order_follows_engine_ranking() {
        let ids: Vec<Uuid> = (1..=3).map(Uuid::from_u128).collect();
        let posts = vec![post(ids[2]), post(ids[0]), post(ids[1])];

        let ordered: Vec<Uuid> = order_by_ids(&ids, posts).iter().map(|p| p.id).collect();
        assert_eq!(ordered, ids);
    }

    #[test]
    fn test_order_drops_missing_posts() {
        let ids: Vec<Uuid> = (1..=3).map(Uuid::from_u128).collect();
        let posts = vec![post(ids[2])];

        let ordered = order_by_ids(&ids, posts);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].id, ids[2]);
    }

    #[test]
    fn test_backend_serializes_lowercase() {
        assert_eq!(serde_json::to_value(SearchBackend::Engine).unwrap(), "engine");
        assert_eq!(SearchBackend::Sql.to_string(), "sql");
    }
}
