//! State database integration tests.
//!
//! Uses temp directories so each test gets a fresh database file.

use bq_relay::persistence::{self, NewHistoryEntry, QueryStatus, StateDb};
use tempfile::TempDir;

async fn open_test_db(dir: &TempDir) -> StateDb {
    let path = dir.path().join("state.db");
    StateDb::open(&path).await.unwrap()
}

fn entry(sql: &str, status: QueryStatus) -> NewHistoryEntry {
    NewHistoryEntry {
        profile_name: "default".to_string(),
        sql: sql.to_string(),
        statement_type: "SELECT".to_string(),
        status,
        execution_time_ms: Some(12),
        row_count: Some(1),
        bytes_processed: Some(1024),
        error_message: None,
    }
}

#[tokio::test]
async fn test_open_creates_database_and_schema() {
    let dir = TempDir::new().unwrap();
    let db = open_test_db(&dir).await;

    assert!(db.path().exists());

    let entries = persistence::history::list_recent(db.pool(), 10).await.unwrap();
    assert!(entries.is_empty());

    db.close().await;
}

#[tokio::test]
async fn test_reopen_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.db");

    let db = StateDb::open(&path).await.unwrap();
    persistence::history::record_query(db.pool(), entry("SELECT 1", QueryStatus::Success))
        .await
        .unwrap();
    db.close().await;

    // Migrations must not complain or drop data on reopen.
    let db = StateDb::open(&path).await.unwrap();
    let entries = persistence::history::list_recent(db.pool(), 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    db.close().await;
}

#[tokio::test]
async fn test_record_and_list_roundtrip() {
    let dir = TempDir::new().unwrap();
    let db = open_test_db(&dir).await;

    let id = persistence::history::record_query(
        db.pool(),
        NewHistoryEntry {
            profile_name: "prod".to_string(),
            sql: "SELECT count(*) FROM ds.orders".to_string(),
            statement_type: "SELECT".to_string(),
            status: QueryStatus::Success,
            execution_time_ms: Some(340),
            row_count: Some(1),
            bytes_processed: Some(9_000_000),
            error_message: None,
        },
    )
    .await
    .unwrap();
    assert!(id > 0);

    let entries = persistence::history::list_recent(db.pool(), 10).await.unwrap();
    assert_eq!(entries.len(), 1);

    let recorded = &entries[0];
    assert_eq!(recorded.profile_name, "prod");
    assert_eq!(recorded.sql, "SELECT count(*) FROM ds.orders");
    assert_eq!(recorded.status, QueryStatus::Success);
    assert_eq!(recorded.execution_time_ms, Some(340));
    assert_eq!(recorded.bytes_processed, Some(9_000_000));
    assert!(!recorded.created_at.is_empty());

    db.close().await;
}

#[tokio::test]
async fn test_error_entries_keep_message() {
    let dir = TempDir::new().unwrap();
    let db = open_test_db(&dir).await;

    let mut failed = entry("SELECT * FORM ds.users", QueryStatus::Error);
    failed.row_count = None;
    failed.error_message = Some("Query error: Syntax error at [1:10]".to_string());

    persistence::history::record_query(db.pool(), failed).await.unwrap();

    let entries = persistence::history::list_recent(db.pool(), 10).await.unwrap();
    assert_eq!(entries[0].status, QueryStatus::Error);
    assert!(entries[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("Syntax error"));

    db.close().await;
}

#[tokio::test]
async fn test_list_recent_orders_newest_first_and_limits() {
    let dir = TempDir::new().unwrap();
    let db = open_test_db(&dir).await;

    for i in 0..5 {
        persistence::history::record_query(
            db.pool(),
            entry(&format!("SELECT {i}"), QueryStatus::Success),
        )
        .await
        .unwrap();
    }

    let entries = persistence::history::list_recent(db.pool(), 3).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].sql, "SELECT 4");
    assert_eq!(entries[2].sql, "SELECT 2");

    db.close().await;
}

#[tokio::test]
async fn test_timeout_status_roundtrip() {
    let dir = TempDir::new().unwrap();
    let db = open_test_db(&dir).await;

    persistence::history::record_query(db.pool(), entry("SELECT slow", QueryStatus::Timeout))
        .await
        .unwrap();

    let entries = persistence::history::list_recent(db.pool(), 1).await.unwrap();
    assert_eq!(entries[0].status, QueryStatus::Timeout);

    db.close().await;
}
