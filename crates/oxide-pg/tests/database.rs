//! Single-statement conveniences, bootstrap and raw queries.

mod common;

use std::time::Duration;

use common::*;
use oxide_pg::{Database, Error};
use oxide_pg_core::{col, PgValue, ResultSet, Select};

// =============================================================================
// Single statements
// =============================================================================

#[tokio::test]
async fn test_each_call_takes_a_connection() {
    let backend = RecordingBackend::new();
    let db = Database::new(backend.clone());
    let query = Select::<Item>::new().filter(col("id").eq(1)).build().unwrap();

    backend.respond(vec![ResultSet::from_rows(vec![item_row(1, "a")])]);
    assert_eq!(db.fetch_one(&query).await.unwrap(), item(1, "a"));
    backend.respond(vec![ResultSet::from_rows(vec![item_row(1, "a")])]);
    assert_eq!(db.fetch_all(&query).await.unwrap().len(), 1);

    let events = backend.events();
    assert_eq!(
        events.iter().filter(|e| **e == Event::Connect).count(),
        2
    );
    assert_eq!(
        backend.runs()[0].0,
        r#"SELECT "id","name" FROM "app"."item" WHERE ("id") = (1)"#
    );
}

#[tokio::test]
async fn test_fetch_one_without_rows() {
    let backend = RecordingBackend::new();
    let db = Database::new(backend.clone());
    let query = Select::<Item>::new().filter(col("id").eq(404)).build().unwrap();

    backend.respond(vec![ResultSet::default()]);
    assert!(matches!(
        db.fetch_one(&query).await,
        Err(Error::Server(sqlx::Error::RowNotFound))
    ));
}

#[tokio::test]
async fn test_server_error_is_not_wrapped() {
    let backend = RecordingBackend::new();
    let db = Database::new(backend.clone());
    backend.fail("relation \"app.item\" does not exist");

    let err = db
        .execute(&Select::<Item>::new().build().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Server(_)));
    assert!(err.to_string().contains("does not exist"));
}

#[tokio::test]
async fn test_missing_result_set() {
    let backend = RecordingBackend::new();
    let db = Database::new(backend.clone());
    backend.respond(Vec::new());

    assert!(matches!(
        db.execute(&Select::<Item>::new().count().unwrap()).await,
        Err(Error::MissingResult {
            expected: 1,
            received: 0
        })
    ));
}

// =============================================================================
// Bootstrap
// =============================================================================

#[tokio::test]
async fn test_bootstrap_installs_helpers_in_one_round_trip() {
    let backend = RecordingBackend::new();
    let db = Database::new(backend.clone());
    db.bootstrap().await.unwrap();

    let runs = backend.runs();
    assert_eq!(runs.len(), 1);
    let (sql, params, statements) = &runs[0];
    assert_eq!(*statements, 3);
    assert!(params.is_empty());
    for function in ["escape_like", "escape_regexp", "jsonb_append_at_path"] {
        assert!(sql.contains(&format!("CREATE OR REPLACE FUNCTION {function}(")));
    }
}

// =============================================================================
// Raw queries
// =============================================================================

#[tokio::test]
async fn test_raw_query_returns_first_result() {
    let backend = RecordingBackend::new();
    let db = Database::new(backend.clone());
    backend.respond(vec![ResultSet::from_rows(vec![vec![PgValue::Int(1)]])]);

    let result = db
        .raw_query("SELECT 1", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result.rows, vec![vec![PgValue::Int(1)]]);
    assert_eq!(backend.runs()[0].0, "SELECT 1");
}

#[tokio::test]
async fn test_raw_query_timeout() {
    let backend = RecordingBackend::new();
    backend.delay(Duration::from_secs(5));
    let db = Database::new(backend.clone());

    let err = db
        .raw_query("SELECT pg_sleep(5)", Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(20)));
    assert_eq!(backend.events().last(), Some(&Event::Cancel(SESSION_ID)));
}

#[tokio::test]
async fn test_raw_query_in_time_is_not_cancelled() {
    let backend = RecordingBackend::new();
    backend.delay(Duration::from_millis(5));
    let db = Database::new(backend.clone());

    db.raw_query("SELECT 1", Duration::from_secs(5)).await.unwrap();
    assert!(!backend
        .events()
        .iter()
        .any(|event| matches!(event, Event::Cancel(_))));
}
