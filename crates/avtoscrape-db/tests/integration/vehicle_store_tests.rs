use avtoscrape_core::duplicates::collapse_duplicates;
use avtoscrape_core::models::{VehicleCategory, VehicleRecord, VehicleState};
use avtoscrape_core::staleness::purge_absent;
use std::collections::HashSet;

use avtoscrape_db::Database;

use crate::integration::common::{car, count, find_by_link, setup_test_db};

const AVTONET: &str = "https://www.avto.net/";

#[tokio::test]
async fn insert_and_read_back() {
    let (db, _container) = setup_test_db().await;
    let repo = db.vehicle_repo();

    let mut electric = VehicleRecord::new("https://www.avto.net/Ads/details.asp?id=2");
    electric.make = Some("Tesla".into());
    electric.model = Some("Model 3".into());
    electric.battery_kwh = Some(57.5);
    electric.state = VehicleState::Novo;

    let records = vec![car("https://www.avto.net/Ads/details.asp?id=1"), electric.clone()];
    let inserted = repo.insert_many(VehicleCategory::Car, &records).await.unwrap();
    assert_eq!(inserted, 2);

    let stored = find_by_link(db.pool(), VehicleCategory::Car, &electric.link).await;
    assert_eq!(stored, vec![electric]);

    let stored = find_by_link(db.pool(), VehicleCategory::Car, &records[0].link).await;
    assert_eq!(stored, vec![records[0].clone()]);
}

#[tokio::test]
async fn categories_are_separate() {
    let (db, _container) = setup_test_db().await;
    let repo = db.vehicle_repo();
    let link = "https://www.avto.net/Ads/details.asp?id=5";

    repo.insert_many(VehicleCategory::Motorcycle, &[car(link)])
        .await
        .unwrap();

    assert!(repo.exists_by_link(VehicleCategory::Motorcycle, link).await.unwrap());
    assert!(!repo.exists_by_link(VehicleCategory::Car, link).await.unwrap());
    assert_eq!(count(db.pool(), VehicleCategory::Car).await, 0);
    assert_eq!(count(db.pool(), VehicleCategory::Motorcycle).await, 1);
}

#[tokio::test]
async fn insert_many_empty_is_noop() {
    let (db, _container) = setup_test_db().await;
    let repo = db.vehicle_repo();

    assert_eq!(repo.insert_many(VehicleCategory::Car, &[]).await.unwrap(), 0);
    assert_eq!(repo.delete_by_links(VehicleCategory::Car, &[]).await.unwrap(), 0);
    assert_eq!(repo.delete_by_ids(VehicleCategory::Car, &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn namespace_listing_is_prefix_scoped_and_ordered() {
    let (db, _container) = setup_test_db().await;
    let repo = db.vehicle_repo();

    let records = vec![
        car("https://www.avto.net/Ads/details.asp?id=3"),
        car("https://autobid.de/sl/podrobnosti/1"),
        car("https://www.avto.net/Ads/details.asp?id=1"),
    ];
    repo.insert_many(VehicleCategory::Car, &records).await.unwrap();

    let links = repo
        .links_in_namespace(VehicleCategory::Car, AVTONET)
        .await
        .unwrap();
    assert_eq!(
        links,
        vec![
            "https://www.avto.net/Ads/details.asp?id=3",
            "https://www.avto.net/Ads/details.asp?id=1",
        ]
    );
}

#[tokio::test]
async fn delete_by_links_removes_every_copy() {
    let (db, _container) = setup_test_db().await;
    let repo = db.vehicle_repo();
    let gone = "https://www.avto.net/Ads/details.asp?id=9";

    repo.insert_many(
        VehicleCategory::Car,
        &[car(gone), car(gone), car("https://www.avto.net/Ads/details.asp?id=10")],
    )
    .await
    .unwrap();

    let deleted = repo
        .delete_by_links(VehicleCategory::Car, &[gone.to_string()])
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(count(db.pool(), VehicleCategory::Car).await, 1);
}

#[tokio::test]
async fn duplicate_groups_follow_storage_order() {
    let (db, _container) = setup_test_db().await;
    let repo = db.vehicle_repo();

    let a = "https://www.avto.net/Ads/details.asp?id=1";
    let b = "https://autobid.de/sl/podrobnosti/2";
    repo.insert_many(
        VehicleCategory::Car,
        &[car(a), car(b), car(a), car(b), car(a), car("https://www.avto.net/x")],
    )
    .await
    .unwrap();

    let groups = repo.duplicate_groups(VehicleCategory::Car, None).await.unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].link, a);
    assert_eq!(groups[0].ids.len(), 3);
    assert_eq!(groups[1].link, b);
    assert_eq!(groups[1].ids.len(), 2);

    let scoped = repo
        .duplicate_groups(VehicleCategory::Car, Some(AVTONET))
        .await
        .unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].link, a);
}

#[tokio::test]
async fn collapse_duplicates_is_idempotent() {
    let (db, _container) = setup_test_db().await;
    let repo = db.vehicle_repo();

    let a = "https://www.avto.net/Ads/details.asp?id=1";
    repo.insert_many(VehicleCategory::Car, &[car(a), car(a), car(a)])
        .await
        .unwrap();

    let first = repo.duplicate_groups(VehicleCategory::Car, None).await.unwrap();
    let keep = first[0].ids[0];

    assert_eq!(collapse_duplicates(&repo, VehicleCategory::Car, None).await.unwrap(), 2);
    assert_eq!(collapse_duplicates(&repo, VehicleCategory::Car, None).await.unwrap(), 0);

    assert_eq!(count(db.pool(), VehicleCategory::Car).await, 1);
    assert!(repo.duplicate_groups(VehicleCategory::Car, None).await.unwrap().is_empty());
    assert_eq!(find_by_link(db.pool(), VehicleCategory::Car, a).await.len(), 1);
    assert_eq!(repo.delete_by_ids(VehicleCategory::Car, &[keep]).await.unwrap(), 1);
}

#[tokio::test]
async fn purge_absent_keeps_valid_and_foreign_links() {
    let (db, _container) = setup_test_db().await;
    let repo = db.vehicle_repo();

    let live = "https://www.avto.net/Ads/details.asp?id=1";
    let stale = "https://www.avto.net/Ads/details.asp?id=2";
    let foreign = "https://autobid.de/sl/podrobnosti/3";
    repo.insert_many(VehicleCategory::Car, &[car(live), car(stale), car(foreign)])
        .await
        .unwrap();

    let valid: HashSet<String> = [live.to_string()].into_iter().collect();
    let deleted = purge_absent(&repo, VehicleCategory::Car, AVTONET, &valid)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    assert!(repo.exists_by_link(VehicleCategory::Car, live).await.unwrap());
    assert!(!repo.exists_by_link(VehicleCategory::Car, stale).await.unwrap());
    assert!(repo.exists_by_link(VehicleCategory::Car, foreign).await.unwrap());
}

#[tokio::test]
async fn prepare_is_repeatable() {
    let (db, _container) = setup_test_db().await;
    db.vehicle_repo()
        .insert_many(VehicleCategory::Car, &[car("https://www.avto.net/Ads/details.asp?id=77")])
        .await
        .unwrap();

    let again = Database::prepare(db.pool().clone()).await.unwrap();
    assert_eq!(count(again.pool(), VehicleCategory::Car).await, 1);
}
