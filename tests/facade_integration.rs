//! Integration tests for the connection façade.
//!
//! These run against the in-memory driver and cover:
//! - Lifecycle guards and single-flight connection
//! - Wildcard filters for find, update and remove
//! - Insert identities and retrieval
//! - Aggregation pipelines

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use gomongo::memory::MemoryDriver;
use gomongo::prelude::*;
use pretty_assertions::assert_eq;

const DB: &str = "inventory";
const WIDGETS: &str = "widgets";

fn facade() -> (MemoryDriver, GoMongo<MemoryDriver>) {
    let driver = MemoryDriver::new();
    (driver.clone(), GoMongo::with_driver(driver))
}

async fn seed(db: &GoMongo<MemoryDriver>) {
    db.add(
        DB,
        WIDGETS,
        vec![
            doc! { "name": "bolt", "qty": 10, "color": "grey" },
            doc! { "name": "nut", "qty": 4, "color": "grey" },
            doc! { "name": "gear", "qty": 1, "color": "red" },
        ],
        None,
    )
    .await
    .expect("seeding failed");
}

/// Add one widget, then find it again by name
#[tokio::test]
async fn test_add_then_find_scenario() {
    let (_, db) = facade();

    let outcome = db
        .add(DB, WIDGETS, vec![doc! { "name": "a" }], None)
        .await
        .unwrap();
    assert_eq!(outcome.inserted_count(), 1);

    let found = db
        .find_all(DB, WIDGETS, doc! { "name": "a" }, None)
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get_str("name").unwrap(), "a");
    assert!(found[0].get_object_id("_id").is_ok());
}

/// Destroy first, then find: lifecycle error and no handshake
#[tokio::test]
async fn test_destroy_then_find_scenario() {
    let (driver, db) = facade();
    db.destroy().await.unwrap();

    let err = db.find_all(DB, WIDGETS, doc! {}, None).await.unwrap_err();

    assert!(err.is_destroyed());
    assert_eq!(driver.connect_count(), 0);
}

/// Every operation after destroy fails, whether or not a connection existed
#[tokio::test]
async fn test_all_operations_fail_after_destroy() {
    for connect_first in [false, true] {
        let (_, db) = facade();
        if connect_first {
            seed(&db).await;
        }
        db.destroy().await.unwrap();

        assert!(db.count(DB, WIDGETS, doc! {}, None).await.unwrap_err().is_destroyed());
        assert!(matches!(
            db.find(DB, WIDGETS, doc! {}, None).await,
            Err(GoMongoError::Destroyed)
        ));
        assert!(db.add(DB, WIDGETS, vec![doc! {}], None).await.unwrap_err().is_destroyed());
        assert!(
            db.update(DB, WIDGETS, doc! {}, doc! { "$set": { "x": 1 } }, None)
                .await
                .unwrap_err()
                .is_destroyed()
        );
        assert!(db.remove(DB, WIDGETS, doc! {}, None).await.unwrap_err().is_destroyed());
        assert!(matches!(
            db.aggregate(DB, WIDGETS, vec![doc! { "$limit": 1 }], None).await,
            Err(GoMongoError::Destroyed)
        ));
        assert_eq!(db.state(), Lifecycle::Destroyed);
    }
}

/// N concurrent first operations share a single handshake
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_flight_connect() {
    let driver = MemoryDriver::with_connect_delay(Duration::from_millis(25));
    let db = Arc::new(GoMongo::with_driver(driver.clone()));

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let db = Arc::clone(&db);
            tokio::spawn(async move {
                db.add(DB, WIDGETS, vec![doc! { "i": i }], None)
                    .await
                    .map(|outcome| outcome.inserted_count())
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 1);
    }

    assert_eq!(driver.connect_count(), 1);
    assert_eq!(db.count(DB, WIDGETS, doc! {}, None).await.unwrap(), 32);
}

/// Empty filter finds everything; a filter matching nothing finds nothing
#[tokio::test]
async fn test_find_wildcard_and_no_match() {
    let (_, db) = facade();
    seed(&db).await;

    let all = db.find_all(DB, WIDGETS, doc! {}, None).await.unwrap();
    assert_eq!(all.len(), 3);

    let none = db
        .find_all(DB, WIDGETS, doc! { "name": "sprocket" }, None)
        .await
        .unwrap();
    assert!(none.is_empty());

    let unknown_collection = db.find_all(DB, "gadgets", doc! {}, None).await.unwrap();
    assert!(unknown_collection.is_empty());
}

/// Inserted identities retrieve each document independently
#[tokio::test]
async fn test_add_generates_retrievable_ids() {
    let (_, db) = facade();
    let items: Vec<Document> = (0..5).map(|n| doc! { "n": n }).collect();

    let outcome = db.add(DB, WIDGETS, items, None).await.unwrap();
    assert_eq!(outcome.inserted_count(), 5);

    for (index, id) in &outcome.inserted_ids {
        let found = db
            .find_all(DB, WIDGETS, doc! { "_id": id.clone() }, None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get_i32("n").unwrap(), *index as i32);
    }
}

/// Update reports matched documents and leaves the rest untouched
#[tokio::test]
async fn test_update_touches_only_matches() {
    let (driver, db) = facade();
    seed(&db).await;
    let before = driver.documents(DB, WIDGETS);

    let outcome = db
        .update(
            DB,
            WIDGETS,
            doc! { "color": "grey" },
            doc! { "$inc": { "qty": 5 }, "$set": { "restocked": true } },
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.matched_count, 2);
    assert_eq!(outcome.modified_count, 2);

    let after = driver.documents(DB, WIDGETS);
    for (old, new) in before.iter().zip(&after) {
        if old.get_str("color").unwrap() == "grey" {
            assert_eq!(new.get_i32("qty").unwrap(), old.get_i32("qty").unwrap() + 5);
            assert!(new.get_bool("restocked").unwrap());
        } else {
            assert_eq!(new, old);
        }
    }
}

/// An empty update filter updates every document
#[tokio::test]
async fn test_update_wildcard() {
    let (_, db) = facade();
    seed(&db).await;

    let outcome = db
        .update(DB, WIDGETS, doc! {}, doc! { "$set": { "audited": true } }, None)
        .await
        .unwrap();
    assert_eq!(outcome.matched_count, 3);

    let audited = db
        .count(DB, WIDGETS, doc! { "audited": true }, None)
        .await
        .unwrap();
    assert_eq!(audited, 3);
}

/// Remove with an empty filter clears the collection
#[tokio::test]
async fn test_remove_wildcard_then_count() {
    let (_, db) = facade();
    seed(&db).await;

    let outcome = db.remove(DB, WIDGETS, doc! {}, None).await.unwrap();
    assert_eq!(outcome.deleted_count, 3);
    assert_eq!(db.count(DB, WIDGETS, doc! {}, None).await.unwrap(), 0);
}

/// Remove with a filter keeps non-matching documents
#[tokio::test]
async fn test_remove_filtered() {
    let (_, db) = facade();
    seed(&db).await;

    let outcome = db
        .remove(DB, WIDGETS, doc! { "qty": { "$lt": 5 } }, None)
        .await
        .unwrap();
    assert_eq!(outcome.deleted_count, 2);

    let left = db.find_all(DB, WIDGETS, doc! {}, None).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].get_str("name").unwrap(), "bolt");
}

/// Count honours filters and options
#[tokio::test]
async fn test_count_with_options() {
    let (_, db) = facade();
    seed(&db).await;

    assert_eq!(db.count(DB, WIDGETS, doc! {}, None).await.unwrap(), 3);
    assert_eq!(
        db.count(DB, WIDGETS, doc! { "color": "grey" }, None)
            .await
            .unwrap(),
        2
    );

    let options = gomongo::mongodb::options::CountOptions::builder()
        .limit(1_u64)
        .build();
    assert_eq!(db.count(DB, WIDGETS, doc! {}, options).await.unwrap(), 1);
}

/// The lazy cursor yields documents one at a time in order
#[tokio::test]
async fn test_find_cursor_streams() {
    let (_, db) = facade();
    seed(&db).await;

    let options = gomongo::mongodb::options::FindOptions::builder()
        .sort(doc! { "qty": 1 })
        .build();
    let mut cursor = db.find(DB, WIDGETS, doc! {}, options).await.unwrap();

    let mut names = Vec::new();
    while let Some(widget) = cursor.try_next().await.unwrap() {
        names.push(widget.get_str("name").unwrap().to_string());
    }
    assert_eq!(names, vec!["gear", "nut", "bolt"]);
}

/// Pipeline stages run in order
#[tokio::test]
async fn test_aggregate_stage_order() {
    let (_, db) = facade();
    seed(&db).await;

    let limit_then_match = db
        .aggregate_all(
            DB,
            WIDGETS,
            vec![
                doc! { "$sort": { "qty": -1 } },
                doc! { "$limit": 1 },
                doc! { "$match": { "color": "red" } },
            ],
            None,
        )
        .await
        .unwrap();
    assert!(limit_then_match.is_empty());

    let match_then_limit = db
        .aggregate_all(
            DB,
            WIDGETS,
            vec![
                doc! { "$match": { "color": "red" } },
                doc! { "$sort": { "qty": -1 } },
                doc! { "$limit": 1 },
            ],
            None,
        )
        .await
        .unwrap();
    assert_eq!(match_then_limit.len(), 1);
    assert_eq!(match_then_limit[0].get_str("name").unwrap(), "gear");
}

/// Collections are isolated per database
#[tokio::test]
async fn test_databases_are_isolated() {
    let (_, db) = facade();
    db.add("a", WIDGETS, vec![doc! { "k": 1 }], None).await.unwrap();
    db.add("b", WIDGETS, vec![doc! { "k": 2 }, doc! { "k": 3 }], None)
        .await
        .unwrap();

    assert_eq!(db.count("a", WIDGETS, doc! {}, None).await.unwrap(), 1);
    assert_eq!(db.count("b", WIDGETS, doc! {}, None).await.unwrap(), 2);
}
