//! Sessions and single-use account tokens.

use chrono::{Duration, Utc};

use plinth_db::test_fixtures::{TestDataBuilder, TestDatabase};
use plinth_db::{AccountTokenKind, AuthRepository, UserRepository, UserRole};

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn session_resolves_to_active_user() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("reader@example.com", UserRole::Subscriber)
        .await
        .build();
    let user = &data.users[0];
    let auth = &test_db.db.auth;

    auth.create_session(user.id, "hash-1", Utc::now() + Duration::hours(1))
        .await
        .unwrap();

    let (session, found) = auth.find_session("hash-1").await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert!(session.last_used_at.is_some());

    // Deleting the user revokes the session.
    test_db.db.users.soft_delete(user.id).await.unwrap();
    assert!(auth.find_session("hash-1").await.unwrap().is_none());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn expired_sessions_do_not_resolve() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("reader@example.com", UserRole::Subscriber)
        .await
        .build();
    let auth = &test_db.db.auth;

    auth.create_session(data.users[0].id, "old", Utc::now() - Duration::minutes(1))
        .await
        .unwrap();
    assert!(auth.find_session("old").await.unwrap().is_none());
    assert_eq!(auth.purge_expired_sessions().await.unwrap(), 1);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn revoking_other_sessions_keeps_current() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("reader@example.com", UserRole::Subscriber)
        .await
        .build();
    let user_id = data.users[0].id;
    let auth = &test_db.db.auth;
    let expires = Utc::now() + Duration::hours(1);

    let current = auth.create_session(user_id, "a", expires).await.unwrap();
    auth.create_session(user_id, "b", expires).await.unwrap();
    auth.create_session(user_id, "c", expires).await.unwrap();

    assert_eq!(auth.delete_user_sessions(user_id, Some(current.id)).await.unwrap(), 2);
    assert!(auth.find_session("a").await.unwrap().is_some());
    assert!(auth.find_session("b").await.unwrap().is_none());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn account_tokens_work_once_and_replace_earlier_ones() {
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_user("reader@example.com", UserRole::Subscriber)
        .await
        .build();
    let user_id = data.users[0].id;
    let auth = &test_db.db.auth;
    let expires = Utc::now() + Duration::hours(1);
    let kind = AccountTokenKind::PasswordReset;

    auth.create_account_token(user_id, kind, "first", expires).await.unwrap();
    auth.create_account_token(user_id, kind, "second", expires).await.unwrap();

    assert!(auth.consume_account_token(kind, "first").await.unwrap().is_none());
    assert_eq!(
        auth.consume_account_token(kind, "second").await.unwrap(),
        Some(user_id)
    );
    assert!(auth.consume_account_token(kind, "second").await.unwrap().is_none());

    // A token of one kind is useless as another.
    auth.create_account_token(user_id, kind, "third", expires).await.unwrap();
    assert!(auth
        .consume_account_token(AccountTokenKind::EmailVerification, "third")
        .await
        .unwrap()
        .is_none());
    test_db.cleanup().await;
}
