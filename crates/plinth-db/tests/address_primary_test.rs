//! One primary address per owner, with promotion on delete.

use uuid::Uuid;

use plinth_db::test_fixtures::TestDatabase;
use plinth_db::{AddressRepository, CreateAddressRequest, OwnerType, UpdateAddressRequest};

fn address(owner_id: Uuid, line1: &str) -> CreateAddressRequest {
    CreateAddressRequest {
        owner_type: OwnerType::User,
        owner_id,
        label: None,
        line1: line1.to_string(),
        line2: None,
        city: "Lisbon".to_string(),
        region: None,
        postal_code: Some("1100-148".to_string()),
        country_code: "PT".to_string(),
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn first_address_becomes_primary() {
    let test_db = TestDatabase::new().await;
    let addresses = &test_db.db.addresses;
    let owner = Uuid::now_v7();

    let first = addresses.create(address(owner, "Rua A 1")).await.unwrap();
    let second = addresses.create(address(owner, "Rua B 2")).await.unwrap();

    assert!(first.is_primary);
    assert!(!second.is_primary);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn set_primary_moves_the_flag() {
    let test_db = TestDatabase::new().await;
    let addresses = &test_db.db.addresses;
    let owner = Uuid::now_v7();

    let first = addresses.create(address(owner, "Rua A 1")).await.unwrap();
    let second = addresses.create(address(owner, "Rua B 2")).await.unwrap();

    let promoted = addresses.set_primary(second.id).await.unwrap();
    assert!(promoted.is_primary);

    let list = addresses
        .list_for_owner(OwnerType::User, owner)
        .await
        .unwrap();
    assert_eq!(list[0].id, second.id, "primary is listed first");
    assert_eq!(list.iter().filter(|a| a.is_primary).count(), 1);
    assert!(!addresses.get(first.id).await.unwrap().unwrap().is_primary);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn deleting_primary_promotes_oldest_remaining() {
    let test_db = TestDatabase::new().await;
    let addresses = &test_db.db.addresses;
    let owner = Uuid::now_v7();

    let first = addresses.create(address(owner, "Rua A 1")).await.unwrap();
    let second = addresses.create(address(owner, "Rua B 2")).await.unwrap();
    let _third = addresses.create(address(owner, "Rua C 3")).await.unwrap();

    addresses.delete(first.id).await.unwrap();
    assert!(addresses.get(second.id).await.unwrap().unwrap().is_primary);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn owners_are_independent() {
    let test_db = TestDatabase::new().await;
    let addresses = &test_db.db.addresses;

    let a = addresses.create(address(Uuid::now_v7(), "Rua A 1")).await.unwrap();
    let b = addresses.create(address(Uuid::now_v7(), "Rua B 2")).await.unwrap();
    assert!(a.is_primary && b.is_primary);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn update_clears_only_requested_fields() {
    let test_db = TestDatabase::new().await;
    let addresses = &test_db.db.addresses;
    let owner = Uuid::now_v7();

    let mut req = address(owner, "Rua A 1");
    req.label = Some("Home".to_string());
    req.region = Some("Lisboa".to_string());
    let created = addresses.create(req).await.unwrap();

    let updated = addresses
        .update(
            created.id,
            UpdateAddressRequest {
                label: Some(None),
                city: Some("Porto".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.label, None);
    assert_eq!(updated.city, "Porto");
    assert_eq!(updated.region.as_deref(), Some("Lisboa"));
    assert_eq!(updated.postal_code.as_deref(), Some("1100-148"));
    assert!(updated.updated_at >= created.updated_at);
    test_db.cleanup().await;
}
