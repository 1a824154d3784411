//! Forwarder pipeline integration tests.
//!
//! Exercises the full forward path against mock warehouse clients: guard
//! rails, pass-through fidelity, and the error taxonomy.

use std::time::Duration;

use async_trait::async_trait;
use bq_relay::bq::{
    ColumnInfo, FailingWarehouseClient, FailureMode, MockWarehouseClient, QueryRequest,
    QueryResult, Value, WarehouseClient,
};
use bq_relay::config::ProfileConfig;
use bq_relay::error::Result;
use bq_relay::forward::{QueryForwarder, BYTES_PER_DOLLAR, MAX_BYTES_PROCESSED};

fn profile() -> ProfileConfig {
    ProfileConfig {
        project_id: Some("acme-analytics".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_select_one_returns_single_int_cell() {
    let client = MockWarehouseClient::new();
    let profile = profile();
    let forwarder = QueryForwarder::new(&client, &profile);

    let outcome = forwarder.forward("SELECT 1").await.unwrap();

    assert_eq!(outcome.result.row_count, 1);
    assert_eq!(outcome.result.rows.len(), 1);
    assert_eq!(outcome.result.rows[0].len(), 1);
    assert_eq!(outcome.result.rows[0][0], Value::Int(1));
}

#[tokio::test]
async fn test_pass_through_fidelity() {
    // Whatever the warehouse returns is relayed unmodified.
    let canned = QueryResult::with_data(
        vec![
            ColumnInfo::new("id", "INT64"),
            ColumnInfo::new("email", "STRING"),
            ColumnInfo::new("active", "BOOL"),
        ],
        vec![
            vec![
                Value::Int(1),
                Value::String("alice@example.com".to_string()),
                Value::Bool(true),
            ],
            vec![Value::Int(2), Value::Null, Value::Bool(false)],
        ],
    );
    let client = MockWarehouseClient::new().with_result(canned.clone());
    let profile = profile();
    let forwarder = QueryForwarder::new(&client, &profile);

    let outcome = forwarder
        .forward("SELECT id, email, active FROM ds.users")
        .await
        .unwrap();

    assert_eq!(outcome.result.columns, canned.columns);
    assert_eq!(outcome.result.rows, canned.rows);
    assert_eq!(outcome.result.row_count, 2);
}

#[tokio::test]
async fn test_invalid_credential_never_yields_partial_result() {
    let client = FailingWarehouseClient::new(FailureMode::Authentication);
    let profile = profile();
    let forwarder = QueryForwarder::new(&client, &profile);

    let err = forwarder.forward("SELECT 1").await.unwrap_err();
    assert_eq!(err.category(), "Authentication Error");
}

#[tokio::test]
async fn test_invalid_sql_is_query_error_not_empty_output() {
    let client = FailingWarehouseClient::new(FailureMode::Query);
    let profile = profile();
    let forwarder = QueryForwarder::new(&client, &profile);

    let err = forwarder.forward("SELECT * FORM ds.users").await.unwrap_err();
    assert_eq!(err.category(), "Query Error");
    assert!(err.to_string().contains("Syntax error"));
}

#[tokio::test]
async fn test_transport_failure_propagates() {
    let client = FailingWarehouseClient::new(FailureMode::Transport);
    let profile = profile();
    let forwarder = QueryForwarder::new(&client, &profile);

    let err = forwarder.forward("SELECT 1").await.unwrap_err();
    assert_eq!(err.category(), "Transport Error");
    assert!(err.is_retryable());
}

/// Client whose execution outlasts any reasonable deadline.
struct SlowWarehouseClient;

#[async_trait]
impl WarehouseClient for SlowWarehouseClient {
    async fn validate_credentials(&self) -> Result<()> {
        Ok(())
    }

    async fn dry_run(&self, _sql: &str) -> Result<u64> {
        Ok(0)
    }

    async fn execute_query(&self, _request: &QueryRequest) -> Result<QueryResult> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(QueryResult::with_data(
            vec![ColumnInfo::new("late", "INT64")],
            vec![vec![Value::Int(1)]],
        ))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_timeout_yields_timeout_error_and_no_rows() {
    let client = SlowWarehouseClient;
    let mut profile = profile();
    profile.timeout_secs = 1;
    let forwarder = QueryForwarder::new(&client, &profile);

    let err = forwarder.forward("SELECT 1").await.unwrap_err();
    assert_eq!(err.category(), "Timeout Error");
    assert!(err.to_string().contains("raise the configured timeout"));
}

#[tokio::test]
async fn test_byte_guard_blocks_before_execution() {
    let client = MockWarehouseClient::new().with_dry_run_bytes(MAX_BYTES_PROCESSED * 2);
    let profile = profile();
    let forwarder = QueryForwarder::new(&client, &profile);

    let err = forwarder
        .forward("SELECT * FROM ds.everything")
        .await
        .unwrap_err();
    assert_eq!(err.category(), "Query Error");
    assert!(err.to_string().contains("exceeds the limit"));
}

#[tokio::test]
async fn test_cost_warning_attached_to_expensive_query() {
    let client = MockWarehouseClient::new().with_dry_run_bytes(3 * BYTES_PER_DOLLAR);
    let profile = profile();
    let forwarder = QueryForwarder::new(&client, &profile);

    let outcome = forwarder.forward("SELECT * FROM ds.big").await.unwrap();
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("estimated to process"));
}

#[tokio::test]
async fn test_read_only_profile_refuses_dml_before_any_remote_call() {
    // A failing client proves the statement never reached the warehouse:
    // any remote call would produce a transport error instead.
    let client = FailingWarehouseClient::new(FailureMode::Transport);
    let mut profile = profile();
    profile.read_only = true;
    let forwarder = QueryForwarder::new(&client, &profile);

    let err = forwarder
        .forward("UPDATE ds.users SET active = false WHERE id = 1")
        .await
        .unwrap_err();
    assert_eq!(err.category(), "Query Error");
    assert!(err.to_string().contains("read-only"));
}

#[tokio::test]
async fn test_empty_sql_refused_locally() {
    let client = FailingWarehouseClient::new(FailureMode::Transport);
    let profile = profile();
    let forwarder = QueryForwarder::new(&client, &profile);

    let err = forwarder.forward("").await.unwrap_err();
    assert_eq!(err.category(), "Query Error");
    assert!(err.to_string().contains("empty"));
}

#[tokio::test]
async fn test_dry_run_estimate_cost_model() {
    let client = MockWarehouseClient::new().with_dry_run_bytes(BYTES_PER_DOLLAR / 2);
    let profile = profile();
    let forwarder = QueryForwarder::new(&client, &profile);

    let estimate = forwarder.estimate("SELECT 1").await.unwrap();
    assert_eq!(estimate.bytes_processed, BYTES_PER_DOLLAR / 2);
    assert!((estimate.estimated_cost_usd - 0.5).abs() < 1e-9);
    assert!(!estimate.exceeds_limit());
}
