//! Mock warehouse clients for testing.
//!
//! Provides in-memory implementations so the forwarder and CLI can be
//! exercised without credentials or network access.

use async_trait::async_trait;
use std::time::Duration;

use super::{ColumnInfo, QueryRequest, QueryResult, Row, Value, WarehouseClient};
use crate::error::{RelayError, Result};

/// A mock warehouse client that returns predefined results.
pub struct MockWarehouseClient {
    canned: Option<QueryResult>,
    dry_run_bytes: u64,
}

impl MockWarehouseClient {
    /// Creates a mock client with default behavior.
    pub fn new() -> Self {
        Self {
            canned: None,
            dry_run_bytes: 1024,
        }
    }

    /// Returns the given result for every query.
    pub fn with_result(mut self, result: QueryResult) -> Self {
        self.canned = Some(result);
        self
    }

    /// Reports the given byte count from dry runs.
    pub fn with_dry_run_bytes(mut self, bytes: u64) -> Self {
        self.dry_run_bytes = bytes;
        self
    }

    fn default_result(sql: &str) -> QueryResult {
        let trimmed = sql.trim();

        // `SELECT 1` mirrors the service exactly: one anonymous INT64
        // column named f0_.
        if trimmed.eq_ignore_ascii_case("select 1") {
            let mut result = QueryResult::with_data(
                vec![ColumnInfo::new("f0_", "INT64")],
                vec![vec![Value::Int(1)]],
            );
            result.execution_time = Duration::from_millis(1);
            result.job_id = Some("mock_job".to_string());
            result.bytes_processed = Some(0);
            return result;
        }

        if trimmed.to_uppercase().starts_with("SELECT") {
            let rows: Vec<Row> = vec![vec![Value::String(format!("Mock result for: {trimmed}"))]];
            let mut result =
                QueryResult::with_data(vec![ColumnInfo::new("result", "STRING")], rows);
            result.execution_time = Duration::from_millis(1);
            result.job_id = Some("mock_job".to_string());
            return result;
        }

        // Statement without a result relation.
        let mut result = QueryResult::new();
        result.execution_time = Duration::from_millis(1);
        result.job_id = Some("mock_job".to_string());
        result
    }
}

impl Default for MockWarehouseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WarehouseClient for MockWarehouseClient {
    async fn validate_credentials(&self) -> Result<()> {
        Ok(())
    }

    async fn dry_run(&self, _sql: &str) -> Result<u64> {
        Ok(self.dry_run_bytes)
    }

    async fn execute_query(&self, request: &QueryRequest) -> Result<QueryResult> {
        match &self.canned {
            Some(result) => Ok(result.clone()),
            None => Ok(Self::default_result(&request.sql)),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Which error a `FailingWarehouseClient` produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Authentication,
    Query,
    Timeout,
    Transport,
}

/// A warehouse client whose every operation fails the same way.
pub struct FailingWarehouseClient {
    mode: FailureMode,
}

impl FailingWarehouseClient {
    /// Creates a client that fails with the given mode.
    pub fn new(mode: FailureMode) -> Self {
        Self { mode }
    }

    fn error(&self) -> RelayError {
        match self.mode {
            FailureMode::Authentication => RelayError::authentication(
                "invalid_grant: Invalid JWT signature. Verify the service account key.",
            ),
            FailureMode::Query => {
                RelayError::query("Syntax error: Unexpected identifier \"FORM\" at [1:10]")
            }
            FailureMode::Timeout => {
                RelayError::timeout("Query did not complete within 30s")
            }
            FailureMode::Transport => {
                RelayError::transport("Failed to connect to the warehouse")
            }
        }
    }
}

#[async_trait]
impl WarehouseClient for FailingWarehouseClient {
    async fn validate_credentials(&self) -> Result<()> {
        Err(self.error())
    }

    async fn dry_run(&self, _sql: &str) -> Result<u64> {
        Err(self.error())
    }

    async fn execute_query(&self, _request: &QueryRequest) -> Result<QueryResult> {
        Err(self.error())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
