//! Post visibility, filters, full-text search and tag assignment.

use plinth_db::test_fixtures::{seed_minimal_data, TestDataBuilder, TestDatabase};
use plinth_db::{
    ListPostsRequest, PostRepository, PostStatus, TagRepository, UserRole,
};

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn anonymous_listing_only_shows_published_posts() {
    let test_db = TestDatabase::new().await;
    seed_minimal_data(&test_db.db).await;

    let page = test_db
        .db
        .posts
        .list(ListPostsRequest {
            published_only: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    assert!(page.items.iter().all(|p| p.status == PostStatus::Published));
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn authors_see_their_own_drafts() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("one@example.com", UserRole::Author)
        .await
        .with_post("Draft by one")
        .await
        .with_user("two@example.com", UserRole::Author)
        .await
        .with_post("Draft by two")
        .await
        .with_published_post("Published by two")
        .await
        .build();

    let one = data.users[0].id;
    let page = test_db
        .db
        .posts
        .list(ListPostsRequest {
            visible_to: Some(one),
            ..Default::default()
        })
        .await
        .unwrap();

    let titles: Vec<&str> = page.items.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(page.total, 2);
    assert!(titles.contains(&"Draft by one"));
    assert!(titles.contains(&"Published by two"));
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn soft_deleted_posts_disappear_until_restored() {
    let test_db = TestDatabase::new().await;
    let data = seed_minimal_data(&test_db.db).await;
    let posts = &test_db.db.posts;
    let target = &data.posts[0];

    posts.soft_delete(target.id).await.unwrap();
    assert!(posts.get_by_slug(&target.slug).await.unwrap().is_none());
    assert!(posts.get(target.id).await.unwrap().unwrap().deleted_at.is_some());

    let restored = posts.restore(target.id).await.unwrap();
    assert!(restored.deleted_at.is_none());
    assert!(posts.get_by_slug(&target.slug).await.unwrap().is_some());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn republishing_keeps_first_publish_time() {
    let test_db = TestDatabase::new().await;
    let data = seed_minimal_data(&test_db.db).await;
    let posts = &test_db.db.posts;
    let post = &data.posts[0];
    let first_published = post.published_at.expect("seeded as published");

    posts.set_status(post.id, PostStatus::Draft).await.unwrap();
    let again = posts.set_status(post.id, PostStatus::Published).await.unwrap();
    assert_eq!(again.published_at, Some(first_published));
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn fulltext_search_matches_published_posts_only() {
    let test_db = TestDatabase::new().await;
    seed_minimal_data(&test_db.db).await;

    let hits = test_db.db.posts.search_fulltext("ownership", 10, 0).await.unwrap();
    assert_eq!(hits.total, 1);
    assert_eq!(hits.items[0].title, "Rust ownership explained");

    let none = test_db.db.posts.search_fulltext("unfinished", 10, 0).await.unwrap();
    assert_eq!(none.total, 0, "drafts are never searchable");
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn tag_filter_and_counts() {
    let test_db = TestDatabase::new().await;
    let data = seed_minimal_data(&test_db.db).await;
    let db = &test_db.db;

    let rust = db.tags.get_or_create("Rust", "rust").await.unwrap();
    let again = db.tags.get_or_create("RUST", "rust").await.unwrap();
    assert_eq!(rust.id, again.id);

    db.posts.set_tags(data.posts[0].id, &[rust.id]).await.unwrap();
    db.posts.set_tags(data.posts[1].id, &[rust.id]).await.unwrap();

    let tagged = db
        .posts
        .list(ListPostsRequest {
            tag_slug: Some("rust".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(tagged.total, 2);

    let tags = db.tags.list(Some("ru"), 10, 0).await.unwrap();
    assert_eq!(tags.items.len(), 1);
    assert_eq!(tags.items[0].post_count, 2);

    db.posts.set_tags(data.posts[1].id, &[]).await.unwrap();
    assert!(db.posts.tags(data.posts[1].id).await.unwrap().is_empty());
    test_db.cleanup().await;
}
