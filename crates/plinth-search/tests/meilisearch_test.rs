//! Meilisearch client against a mock server.

use plinth_search::{MeilisearchIndex, PostDocument, SearchIndex};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, key: Option<&str>) -> MeilisearchIndex {
    MeilisearchIndex::new(
        server.uri(),
        "posts".to_string(),
        key.map(str::to_string),
        5,
    )
    .expect("client")
}

fn document(id: Uuid) -> PostDocument {
    PostDocument {
        id,
        title: "Rust ownership explained".to_string(),
        slug: "rust-ownership-explained".to_string(),
        excerpt: None,
        body: "Borrowing rules".to_string(),
        author_id: Uuid::nil(),
        organization_id: None,
        tags: vec!["rust".to_string()],
        published_at: Some(1_700_000_000),
    }
}

#[tokio::test]
async fn health_requires_available_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "available"})))
        .mount(&server)
        .await;

    assert!(client(&server, None).health().await);
}

#[tokio::test]
async fn health_is_false_on_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(!client(&server, None).health().await);
}

#[tokio::test]
async fn health_is_false_when_unreachable() {
    let index = MeilisearchIndex::new(
        "http://127.0.0.1:9".to_string(),
        "posts".to_string(),
        None,
        1,
    )
    .unwrap();
    assert!(!index.health().await);
}

#[tokio::test]
async fn index_post_sends_document_with_key() {
    let server = MockServer::start().await;
    let id = Uuid::now_v7();
    Mock::given(method("POST"))
        .and(path("/indexes/posts/documents"))
        .and(query_param("primaryKey", "id"))
        .and(header("Authorization", "Bearer secret"))
        .and(body_partial_json(serde_json::json!([{"id": id, "slug": "rust-ownership-explained"}])))
        .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({"taskUid": 1})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server, Some("secret"))
        .index_post(&document(id))
        .await
        .expect("index");
}

#[tokio::test]
async fn search_returns_ids_in_engine_order() {
    let server = MockServer::start().await;
    let first = Uuid::now_v7();
    let second = Uuid::now_v7();
    Mock::given(method("POST"))
        .and(path("/indexes/posts/search"))
        .and(body_partial_json(serde_json::json!({"q": "rust", "limit": 10, "offset": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "hits": [{"id": second}, {"id": first}],
            "estimatedTotalHits": 7
        })))
        .mount(&server)
        .await;

    let hits = client(&server, None).search("rust", 10, 0).await.unwrap();
    assert_eq!(hits.ids, vec![second, first]);
    assert_eq!(hits.total, 7);
}

#[tokio::test]
async fn engine_errors_surface_as_search_errors() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/indexes/posts/documents"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client(&server, None).clear().await.unwrap_err();
    assert!(matches!(err, plinth_search::Error::Search(_)));
    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn remove_post_targets_document() {
    let server = MockServer::start().await;
    let id = Uuid::now_v7();
    Mock::given(method("DELETE"))
        .and(path(format!("/indexes/posts/documents/{}", id)))
        .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({"taskUid": 2})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server, None).remove_post(id).await.unwrap();
}
