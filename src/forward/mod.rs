//! The query forwarder.
//!
//! One invocation = one unit of work: guard the statement, estimate its
//! cost, submit it, relay the result unmodified, and record the outcome
//! in local history. No retries; errors propagate to the caller.

mod estimate;

pub use estimate::{
    QueryEstimate, BYTES_PER_DOLLAR, COST_WARNING_THRESHOLD_USD, MAX_BYTES_PROCESSED,
};

use std::time::Instant;
use tracing::{info, warn};

use crate::bq::{QueryRequest, QueryResult, WarehouseClient};
use crate::config::ProfileConfig;
use crate::error::{RelayError, Result};
use crate::persistence::{self, NewHistoryEntry, QueryStatus, StateDb};
use crate::safety::{classify_sql, ClassificationResult};

/// Forwards queries for a single profile.
pub struct QueryForwarder<'a> {
    client: &'a dyn WarehouseClient,
    profile: &'a ProfileConfig,
    state_db: Option<&'a StateDb>,
    profile_name: &'a str,
}

impl<'a> QueryForwarder<'a> {
    /// Creates a forwarder without history recording.
    pub fn new(client: &'a dyn WarehouseClient, profile: &'a ProfileConfig) -> Self {
        Self {
            client,
            profile,
            state_db: None,
            profile_name: "default",
        }
    }

    /// Enables history recording into the given state database.
    pub fn with_history(mut self, state_db: &'a StateDb, profile_name: &'a str) -> Self {
        self.state_db = Some(state_db);
        self.profile_name = profile_name;
        self
    }

    /// Validates the configured credential end to end.
    pub async fn validate(&self) -> Result<()> {
        self.client.validate_credentials().await?;
        info!(
            profile = %self.profile.display_string(),
            "Credential validation succeeded"
        );
        Ok(())
    }

    /// Dry-runs the statement and returns its cost estimate.
    pub async fn estimate(&self, sql: &str) -> Result<QueryEstimate> {
        check_sql_not_empty(sql)?;
        let bytes = self.client.dry_run(sql).await?;
        Ok(QueryEstimate::from_bytes(bytes))
    }

    /// Forwards a statement and returns its result.
    ///
    /// The pipeline: empty check, read-only gate, dry-run byte guard,
    /// execution, history record. Timeouts surface as errors with no
    /// partial rows.
    pub async fn forward(&self, sql: &str) -> Result<ForwardOutcome> {
        check_sql_not_empty(sql)?;

        let classification = classify_sql(sql);

        if self.profile.read_only && !classification.level.is_safe() {
            let err = RelayError::query(format!(
                "Profile '{}' is read-only; refusing {} statement",
                self.profile_name, classification.statement_type
            ));
            self.record(sql, &classification, QueryStatus::Error, None, None, Some(&err))
                .await;
            return Err(err);
        }

        let estimate = match self.estimate(sql).await {
            Ok(estimate) => estimate,
            Err(err) => {
                self.record(sql, &classification, QueryStatus::Error, None, None, Some(&err))
                    .await;
                return Err(err);
            }
        };

        if estimate.exceeds_limit() {
            let err = RelayError::query(estimate.guard_message());
            self.record(sql, &classification, QueryStatus::Error, None, None, Some(&err))
                .await;
            return Err(err);
        }

        let mut warnings = Vec::new();
        if estimate.warrants_cost_warning() {
            warnings.push(estimate.cost_warning());
        }
        if let Some(warning) = &classification.warning {
            warnings.push(warning.clone());
        }

        let request = self.build_request(sql);
        let start = Instant::now();

        info!(
            profile = %self.profile.display_string(),
            bytes_estimated = estimate.bytes_processed,
            "Forwarding query"
        );

        // The client enforces the deadline internally; this outer guard
        // makes the bound hold for any WarehouseClient implementation.
        let result = match tokio::time::timeout(
            request.timeout,
            self.client.execute_query(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RelayError::timeout(format!(
                "Query did not complete within {}s. Optimize the query or raise the \
                 configured timeout.",
                request.timeout.as_secs()
            ))),
        };

        let elapsed = start.elapsed();

        match result {
            Ok(query_result) => {
                if let Some(warning) = query_result.truncation_warning() {
                    warnings.push(warning);
                }
                self.record(
                    sql,
                    &classification,
                    QueryStatus::Success,
                    Some(&query_result),
                    Some(elapsed.as_millis() as i64),
                    None,
                )
                .await;
                Ok(ForwardOutcome {
                    result: query_result,
                    estimate,
                    classification,
                    warnings,
                })
            }
            Err(err) => {
                let status = match err {
                    RelayError::Timeout(_) => QueryStatus::Timeout,
                    _ => QueryStatus::Error,
                };
                self.record(
                    sql,
                    &classification,
                    status,
                    None,
                    Some(elapsed.as_millis() as i64),
                    Some(&err),
                )
                .await;
                Err(err)
            }
        }
    }

    fn build_request(&self, sql: &str) -> QueryRequest {
        let mut request = QueryRequest::new(sql)
            .with_max_rows(self.profile.max_rows)
            .with_timeout(std::time::Duration::from_secs(self.profile.timeout_secs));
        if let Some(location) = &self.profile.location {
            request = request.with_location(location.clone());
        }
        if let Some(max_bytes_billed) = self.profile.max_bytes_billed {
            request = request.with_max_bytes_billed(max_bytes_billed);
        }
        request
    }

    /// Records the invocation; history failures are logged, never fatal.
    async fn record(
        &self,
        sql: &str,
        classification: &ClassificationResult,
        status: QueryStatus,
        result: Option<&QueryResult>,
        execution_time_ms: Option<i64>,
        error: Option<&RelayError>,
    ) {
        let Some(state_db) = self.state_db else {
            return;
        };

        let entry = NewHistoryEntry {
            profile_name: self.profile_name.to_string(),
            sql: sql.to_string(),
            statement_type: classification.statement_type.to_string(),
            status,
            execution_time_ms,
            row_count: result.map(|r| r.row_count as i64),
            bytes_processed: result.and_then(|r| r.bytes_processed).map(|b| b as i64),
            error_message: error.map(|e| e.to_string()),
        };

        if let Err(e) = persistence::history::record_query(state_db.pool(), entry).await {
            warn!("Failed to record query history: {e}");
        }
    }
}

fn check_sql_not_empty(sql: &str) -> Result<()> {
    if sql.trim().is_empty() {
        return Err(RelayError::query("SQL text is empty"));
    }
    Ok(())
}

/// Successful forwarding outcome.
#[derive(Debug)]
pub struct ForwardOutcome {
    /// The relayed result.
    pub result: QueryResult,

    /// Dry-run estimate gathered before execution.
    pub estimate: QueryEstimate,

    /// Statement classification.
    pub classification: ClassificationResult,

    /// Warnings accumulated along the pipeline (cost, truncation).
    pub warnings: Vec<String>,
}
