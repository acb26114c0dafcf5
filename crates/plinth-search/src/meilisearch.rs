//! Meilisearch HTTP client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use plinth_core::{Error, PostDocument, Result};

use crate::index::{SearchHits, SearchIndex};

/// Timeout for health probes, kept short so a dead engine does not stall
/// every search request.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    q: &'a str,
    limit: i64,
    offset: i64,
    attributes_to_retrieve: [&'static str; 1],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    hits: Vec<HitId>,
    #[serde(default)]
    estimated_total_hits: Option<i64>,
}

#[derive(Deserialize)]
struct HitId {
    id: Uuid,
}

/// A Meilisearch index holding post documents keyed by `id`.
pub struct MeilisearchIndex {
    client: Client,
    base_url: String,
    index: String,
    api_key: Option<String>,
}

impl MeilisearchIndex {
    pub fn new(
        base_url: String,
        index: String,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build search client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index,
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/indexes/{}{}", self.base_url, self.index, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, op: &str) -> Result<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| Error::Search(format!("{} request failed: {}", op, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Search(format!(
                "{} returned {}: {}",
                op, status, body
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl SearchIndex for MeilisearchIndex {
    async fn health(&self) -> bool {
        let request = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT);

        match self.send(request, "health").await {
            Ok(resp) => match resp.json::<HealthResponse>().await {
                Ok(body) if body.status == "available" => true,
                Ok(body) => {
                    warn!(
                        subsystem = "search",
                        component = "meilisearch",
                        status = %body.status,
                        "Search engine not available"
                    );
                    false
                }
                Err(e) => {
                    warn!(subsystem = "search", component = "meilisearch", error = %e, "Unreadable health response");
                    false
                }
            },
            Err(e) => {
                warn!(subsystem = "search", component = "meilisearch", error = %e, "Search engine health check failed");
                false
            }
        }
    }

    #[instrument(skip(self, doc), fields(subsystem = "search", component = "meilisearch", op = "index_post", post_id = %doc.id))]
    async fn index_post(&self, doc: &PostDocument) -> Result<()> {
        self.index_posts(std::slice::from_ref(doc)).await
    }

    async fn index_posts(&self, docs: &[PostDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let request = self
            .client
            .post(self.url("/documents"))
            .query(&[("primaryKey", "id")])
            .json(docs);
        self.send(request, "index documents").await?;
        debug!(
            subsystem = "search",
            component = "meilisearch",
            result_count = docs.len(),
            "Documents submitted"
        );
        Ok(())
    }

    #[instrument(skip(self), fields(subsystem = "search", component = "meilisearch", op = "remove_post"))]
    async fn remove_post(&self, id: Uuid) -> Result<()> {
        let request = self.client.delete(self.url(&format!("/documents/{}", id)));
        self.send(request, "remove document").await?;
        Ok(())
    }

    async fn search(&self, query: &str, limit: i64, offset: i64) -> Result<SearchHits> {
        let start = Instant::now();
        let body = SearchRequest {
            q: query,
            limit,
            offset,
            attributes_to_retrieve: ["id"],
        };
        let request = self.client.post(self.url("/search")).json(&body);
        let response: SearchResponse = self
            .send(request, "search")
            .await?
            .json()
            .await
            .map_err(|e| Error::Search(format!("failed to parse search response: {}", e)))?;

        let ids: Vec<Uuid> = response.hits.into_iter().map(|h| h.id).collect();
        let total = response.estimated_total_hits.unwrap_or(ids.len() as i64);
        debug!(
            subsystem = "search",
            component = "meilisearch",
            result_count = ids.len(),
            total,
            duration_ms = start.elapsed().as_millis() as u64,
            "Engine query complete"
        );
        Ok(SearchHits { ids, total })
    }

    async fn clear(&self) -> Result<()> {
        let request = self.client.delete(self.url("/documents"));
        self.send(request, "clear index").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_strip_trailing_slash() {
        let index =
            MeilisearchIndex::new("http://search:7700/".to_string(), "posts".to_string(), None, 5)
                .unwrap();
        assert_eq!(index.url("/search"), "http://search:7700/indexes/posts/search");
    }

    #[test]
    fn test_search_request_uses_engine_field_names() {
        let body = SearchRequest {
            q: "rust",
            limit: 20,
            offset: 40,
            attributes_to_retrieve: ["id"],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"q": "rust", "limit": 20, "offset": 40, "attributesToRetrieve": ["id"]})
        );
    }
}
