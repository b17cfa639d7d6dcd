//! Transaction lifecycle against a recording backend.

mod common;

use common::*;
use oxide_pg::{Batch, Database, IsolationLevel};
use oxide_pg_core::{col, Delete, Insert, PgValue, ResultSet, Select};

#[tokio::test]
async fn test_commit() {
    let backend = RecordingBackend::new();
    let db = Database::new(backend.clone());

    let mut tx = db.begin(IsolationLevel::Serializable).await.unwrap();
    assert_eq!(tx.isolation(), IsolationLevel::Serializable);

    backend.respond(vec![ResultSet {
        rows: vec![vec![PgValue::Int(5)]],
        rows_affected: 1,
    }]);
    let inserted = tx
        .execute(&Insert::<Item>::new().row(&item(5, "e")).build().unwrap())
        .await
        .unwrap();
    assert_eq!(inserted.keys, vec![PgValue::Int(5)]);
    tx.commit().await.unwrap();

    let events = backend.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0], Event::Begin(IsolationLevel::Serializable));
    assert!(matches!(events[1], Event::Run { statements: 1, .. }));
    assert_eq!(events[2], Event::Commit);
}

#[tokio::test]
async fn test_explicit_rollback() {
    let backend = RecordingBackend::new();
    let db = Database::new(backend.clone());

    let mut tx = db.begin(IsolationLevel::default()).await.unwrap();
    tx.execute(&Delete::<Item>::new().filter(col("id").eq(1)).build().unwrap())
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let events = backend.events();
    assert_eq!(events[0], Event::Begin(IsolationLevel::ReadCommitted));
    assert_eq!(events.last(), Some(&Event::Rollback));
    assert!(!events.contains(&Event::Commit));
}

#[tokio::test]
async fn test_drop_rolls_back() {
    let backend = RecordingBackend::new();
    let db = Database::new(backend.clone());

    {
        let _tx = db.begin(IsolationLevel::RepeatableRead).await.unwrap();
    }

    assert_eq!(
        backend.events(),
        vec![Event::Begin(IsolationLevel::RepeatableRead), Event::Rollback]
    );
}

#[tokio::test]
async fn test_batch_inside_transaction() {
    let backend = RecordingBackend::new();
    let db = Database::new(backend.clone());
    let mut tx = db.begin(IsolationLevel::default()).await.unwrap();

    let mut batch = Batch::new();
    let removed = batch.push(&Delete::<Item>::new().filter(col("id").eq(3)).build().unwrap());
    let remaining = batch.push(&Select::<Item>::new().build().unwrap());
    backend.respond(vec![
        ResultSet::affected(1),
        ResultSet::from_rows(vec![item_row(4, "d")]),
    ]);
    tx.run(batch).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(removed.await.unwrap(), 1);
    assert_eq!(remaining.await.unwrap(), vec![item(4, "d")]);

    let events = backend.events();
    assert!(!events.contains(&Event::Connect));
    let (sql, _, statements) = &backend.runs()[0];
    assert_eq!(*statements, 2);
    assert_eq!(
        sql,
        r#"DELETE FROM "app"."item" WHERE ("id") = (3);SELECT "id","name" FROM "app"."item""#
    );
}

#[tokio::test]
async fn test_fetch_helpers_in_transaction() {
    let backend = RecordingBackend::new();
    let db = Database::new(backend.clone());
    let mut tx = db.begin(IsolationLevel::default()).await.unwrap();
    let query = Select::<Item>::new().filter(col("id").eq(9)).build().unwrap();

    backend.respond(vec![ResultSet::default()]);
    assert_eq!(tx.fetch_optional(&query).await.unwrap(), None);

    backend.respond(vec![ResultSet::from_rows(vec![item_row(9, "i")])]);
    assert_eq!(tx.fetch_one(&query).await.unwrap(), item(9, "i"));

    backend.respond(vec![ResultSet::default()]);
    assert!(tx.fetch_all(&query).await.unwrap().is_empty());
}
