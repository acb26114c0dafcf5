//! Service flows against a real database.
//!
//! These need PostgreSQL (see `plinth_db::test_fixtures`) and are ignored by
//! default. Run with `cargo test -- --ignored`.

use std::sync::Arc;

use plinth_api::config::AppConfig;
use plinth_api::email::{EmailService, LogMailer};
use plinth_api::services::comments::CreateCommentInput;
use plinth_api::services::menus::CreateMenuItemInput;
use plinth_api::services::organizations::{CreateOrganizationInput, UpdateOrganizationInput};
use plinth_api::services::posts::CreatePostInput;
use plinth_api::services::taxonomies::{CreateTaxonomyInput, CreateTermInput};
use plinth_api::services::users::{LoginInput, RegisterInput};
use plinth_api::services::Services;
use plinth_core::{CommentStatus, Error, PostStatus, UserRole};
use plinth_db::test_fixtures::{TestDataBuilder, TestDatabase};
use plinth_db::Database;
use uuid::Uuid;
use plinth_search::{HybridSearchEngine, SearchBackend};

fn services(db: &Database) -> Services {
    let search = HybridSearchEngine::new(db.clone(), None);
    let email = EmailService::new(Arc::new(LogMailer), db.clone(), "http://localhost:3000");
    Services::new(db.clone(), search, email, &AppConfig::default())
}

fn taxonomy_input(name: &str, hierarchical: bool) -> CreateTaxonomyInput {
    CreateTaxonomyInput {
        name: name.to_string(),
        slug: None,
        description: None,
        hierarchical,
    }
}

fn term_input(name: &str, parent_id: Option<Uuid>) -> CreateTermInput {
    CreateTermInput {
        name: name.to_string(),
        slug: None,
        description: None,
        parent_id,
    }
}

fn post_input(title: &str) -> CreatePostInput {
    CreatePostInput {
        title: title.to_string(),
        slug: None,
        excerpt: None,
        body: format!("{} body", title),
        organization_id: None,
        featured_media_id: None,
        tags: None,
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn register_login_and_logout() {
    let test_db = TestDatabase::new().await;
    let svc = services(&test_db.db);

    let weak = svc
        .users
        .register(RegisterInput {
            email: "weak@example.com".to_string(),
            password: "no digits in here".to_string(),
            display_name: "Weak".to_string(),
        })
        .await;
    assert!(matches!(weak, Err(Error::InvalidInput(_))));

    let user = svc
        .users
        .register(RegisterInput {
            email: "Reader@Example.com".to_string(),
            password: "correct horse battery 9".to_string(),
            display_name: "Reader".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(user.email, "reader@example.com");
    assert_eq!(user.role, UserRole::Subscriber);

    let duplicate = svc
        .users
        .register(RegisterInput {
            email: "reader@example.com".to_string(),
            password: "another long password 7".to_string(),
            display_name: "Copy".to_string(),
        })
        .await;
    assert!(matches!(duplicate, Err(Error::Conflict(_))));

    let wrong = svc
        .users
        .login(LoginInput {
            email: "reader@example.com".to_string(),
            password: "not the password".to_string(),
        })
        .await;
    assert!(matches!(wrong, Err(Error::Unauthorized(_))));

    let login = svc
        .users
        .login(LoginInput {
            email: "reader@example.com".to_string(),
            password: "correct horse battery 9".to_string(),
        })
        .await
        .unwrap();
    let (_, authed) = svc.users.authenticate(&login.token).await.unwrap();
    assert_eq!(authed.id, user.id);

    svc.users.logout(&login.token).await.unwrap();
    assert!(svc.users.authenticate(&login.token).await.is_err());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn derived_slugs_get_suffixes() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("author@example.com", UserRole::Author)
        .await
        .build();
    let svc = services(&test_db.db);
    let author = &data.users[0];

    let first = svc.posts.create(author, post_input("Hello World")).await.unwrap();
    let second = svc.posts.create(author, post_input("Hello World")).await.unwrap();
    assert_eq!(first.slug, "hello-world");
    assert_eq!(second.slug, "hello-world-2");

    let mut explicit = post_input("Other");
    explicit.slug = Some("hello-world".to_string());
    let clash = svc.posts.create(author, explicit).await;
    assert!(matches!(clash, Err(Error::Conflict(_))));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn subscribers_cannot_author_posts() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("sub@example.com", UserRole::Subscriber)
        .await
        .build();
    let svc = services(&test_db.db);

    let result = svc.posts.create(&data.users[0], post_input("Nope")).await;
    assert!(matches!(result, Err(Error::Forbidden(_))));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn search_falls_back_to_sql_for_published_posts() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("author@example.com", UserRole::Author)
        .await
        .with_published_post("Gardening in winter")
        .await
        .with_post("Gardening draft")
        .await
        .build();
    let svc = services(&test_db.db);
    assert_eq!(data.posts[0].status, PostStatus::Published);

    let results = svc.posts.search("gardening", 20, 0).await.unwrap();
    assert_eq!(results.backend, SearchBackend::Sql);
    assert_eq!(results.total, 1);
    assert_eq!(results.items[0].id, data.posts[0].id);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn comment_from_reader_notifies_author_and_waits_for_moderation() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("author@example.com", UserRole::Author)
        .await
        .with_published_post("Open thread")
        .await
        .with_user("reader@example.com", UserRole::Subscriber)
        .await
        .build();
    let svc = services(&test_db.db);
    let (author, reader) = (&data.users[0], &data.users[1]);
    let post = &data.posts[0];

    let comment = svc
        .comments
        .create(
            reader,
            post.id,
            CreateCommentInput {
                body: "Nice post".to_string(),
                parent_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(comment.status, CommentStatus::Pending);
    assert_eq!(svc.notifications.unread_count(author).await.unwrap(), 1);

    let own = svc
        .comments
        .create(
            author,
            post.id,
            CreateCommentInput {
                body: "Thanks".to_string(),
                parent_id: Some(comment.id),
            },
        )
        .await
        .unwrap();
    assert_eq!(own.status, CommentStatus::Approved);
    assert_eq!(svc.notifications.unread_count(reader).await.unwrap(), 1);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn organization_tree_guards_deletes_and_cycles() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("admin@example.com", UserRole::Admin)
        .await
        .build();
    let svc = services(&test_db.db);
    let admin = &data.users[0];

    let root = svc
        .organizations
        .create(
            admin,
            CreateOrganizationInput {
                name: "Acme".to_string(),
                slug: None,
                description: None,
                parent_id: None,
            },
        )
        .await
        .unwrap();
    let child = svc
        .organizations
        .create(
            admin,
            CreateOrganizationInput {
                name: "Acme Labs".to_string(),
                slug: None,
                description: None,
                parent_id: Some(root.id),
            },
        )
        .await
        .unwrap();

    let descendants = svc.organizations.descendants(root.id, None).await.unwrap();
    assert_eq!(descendants.len(), 1);
    assert_eq!(descendants[0].node.id, child.id);
    assert_eq!(descendants[0].depth, 1);

    let cycle = svc.organizations.move_to(admin, root.id, Some(child.id)).await;
    assert!(matches!(cycle, Err(Error::InvalidInput(_))));

    let blocked = svc.organizations.delete(admin, root.id).await;
    assert!(matches!(blocked, Err(Error::Conflict(_))));

    svc.organizations.delete(admin, child.id).await.unwrap();
    svc.organizations.delete(admin, root.id).await.unwrap();

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn deleting_a_menu_item_promotes_its_children() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("editor@example.com", UserRole::Editor)
        .await
        .build();
    let svc = services(&test_db.db);
    let editor = &data.users[0];

    let menu = svc.menus.create(editor, "Main", "header").await.unwrap();
    let link = |label: &str, parent_id| CreateMenuItemInput {
        label: label.to_string(),
        parent_id,
        url: Some(format!("/{}", label.to_lowercase())),
        post_id: None,
        term_id: None,
        position: None,
    };
    let about = svc.menus.add_item(editor, menu.id, link("About", None)).await.unwrap();
    svc.menus
        .add_item(editor, menu.id, link("Team", Some(about.id)))
        .await
        .unwrap();

    let tree = svc.menus.get_by_location("header").await.unwrap();
    assert_eq!(tree.id, menu.id);
    let nested = svc.menus.tree(menu.id).await.unwrap();
    assert_eq!(nested.items.len(), 1);
    assert_eq!(nested.items[0].children.len(), 1);

    svc.menus.delete_item(editor, about.id).await.unwrap();
    let flat = svc.menus.tree(menu.id).await.unwrap();
    assert_eq!(flat.items.len(), 1);
    assert_eq!(flat.items[0].item.label, "Team");
    assert!(flat.items[0].children.is_empty());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn missing_organization_is_not_found_before_permission_check() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("author@example.com", UserRole::Author)
        .await
        .build();
    let svc = services(&test_db.db);
    let author = &data.users[0];
    let missing = Uuid::new_v4();

    let update = svc
        .organizations
        .update(author, missing, UpdateOrganizationInput::default())
        .await;
    assert!(matches!(update, Err(Error::NotFound(_))));
    let delete = svc.organizations.delete(author, missing).await;
    assert!(matches!(delete, Err(Error::NotFound(_))));
    let moved = svc.organizations.move_to(author, missing, None).await;
    assert!(matches!(moved, Err(Error::NotFound(_))));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn terms_stay_inside_their_taxonomy() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("editor@example.com", UserRole::Editor)
        .await
        .build();
    let svc = services(&test_db.db);
    let editor = &data.users[0];

    let topics = svc
        .taxonomies
        .create(editor, taxonomy_input("Topics", true))
        .await
        .unwrap();
    let regions = svc
        .taxonomies
        .create(editor, taxonomy_input("Regions", true))
        .await
        .unwrap();
    let formats = svc
        .taxonomies
        .create(editor, taxonomy_input("Formats", false))
        .await
        .unwrap();

    let rust = svc
        .taxonomies
        .create_term(editor, topics.id, term_input("Rust", None))
        .await
        .unwrap();
    let europe = svc
        .taxonomies
        .create_term(editor, regions.id, term_input("Europe", None))
        .await
        .unwrap();
    let video = svc
        .taxonomies
        .create_term(editor, formats.id, term_input("Video", None))
        .await
        .unwrap();

    // Nesting is refused in a flat taxonomy.
    let nested = svc
        .taxonomies
        .create_term(editor, formats.id, term_input("Short", Some(video.id)))
        .await;
    assert!(matches!(nested, Err(Error::InvalidInput(_))));

    // A parent from another taxonomy is refused on create and on move.
    let foreign = svc
        .taxonomies
        .create_term(editor, topics.id, term_input("Async", Some(europe.id)))
        .await;
    assert!(matches!(foreign, Err(Error::InvalidInput(_))));
    let moved = svc.taxonomies.move_term(editor, rust.id, Some(europe.id)).await;
    assert!(matches!(moved, Err(Error::InvalidInput(_))));

    let own_parent = svc.taxonomies.move_term(editor, rust.id, Some(rust.id)).await;
    assert!(matches!(own_parent, Err(Error::InvalidInput(_))));

    let post = svc.posts.create(editor, post_input("Tagged")).await.unwrap();
    let mixed = svc
        .taxonomies
        .set_post_terms(editor, post.id, topics.id, &[rust.id, europe.id])
        .await;
    assert!(matches!(mixed, Err(Error::InvalidInput(_))));
    assert!(svc.taxonomies.post_terms(post.id).await.unwrap().is_empty());

    let assigned = svc
        .taxonomies
        .set_post_terms(editor, post.id, topics.id, &[rust.id, rust.id])
        .await
        .unwrap();
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].id, rust.id);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn menu_moves_reject_cycles_and_foreign_parents() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("editor@example.com", UserRole::Editor)
        .await
        .build();
    let svc = services(&test_db.db);
    let editor = &data.users[0];

    let header = svc.menus.create(editor, "Main", "header").await.unwrap();
    let footer = svc.menus.create(editor, "Footer", "footer").await.unwrap();
    let link = |label: &str, parent_id| CreateMenuItemInput {
        label: label.to_string(),
        parent_id,
        url: Some(format!("/{}", label.to_lowercase())),
        post_id: None,
        term_id: None,
        position: None,
    };

    let docs = svc.menus.add_item(editor, header.id, link("Docs", None)).await.unwrap();
    let guides = svc
        .menus
        .add_item(editor, header.id, link("Guides", Some(docs.id)))
        .await
        .unwrap();
    let legal = svc.menus.add_item(editor, footer.id, link("Legal", None)).await.unwrap();

    let cycle = svc.menus.move_item(editor, docs.id, Some(guides.id), None).await;
    assert!(matches!(cycle, Err(Error::InvalidInput(_))));

    let own_parent = svc.menus.move_item(editor, docs.id, Some(docs.id), None).await;
    assert!(matches!(own_parent, Err(Error::InvalidInput(_))));

    let cross_menu = svc.menus.move_item(editor, guides.id, Some(legal.id), None).await;
    assert!(matches!(cross_menu, Err(Error::InvalidInput(_))));

    let tree = svc.menus.tree(header.id).await.unwrap();
    assert_eq!(tree.items.len(), 1);
    assert_eq!(tree.items[0].children[0].item.id, guides.id);

    test_db.cleanup().await;
}
