//! Warehouse abstraction layer for the relay.
//!
//! Provides a trait-based interface for warehouse operations, allowing
//! the BigQuery REST backend and test doubles to be used interchangeably.

mod mock;
mod rest;
mod types;
mod wire;

pub use mock::{FailingWarehouseClient, FailureMode, MockWarehouseClient};
pub use rest::BigQueryClient;
pub use types::{ColumnInfo, QueryRequest, QueryResult, Row, Value};

use crate::auth::{ServiceAccountKey, ServiceAccountTokenSource, TokenSource};
use crate::config::ProfileConfig;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Supported warehouse backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    #[default]
    BigQuery,
}

impl WarehouseBackend {
    /// Returns the backend as a string for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BigQuery => "bigquery",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bigquery" | "bq" => Some(Self::BigQuery),
            _ => None,
        }
    }
}

/// Creates a warehouse client for the given profile.
///
/// This is the central factory function. The profile must carry a
/// credential (inline key or key file); resolving a keyring-stored key
/// into the profile is the caller's job.
pub async fn connect(profile: &ProfileConfig) -> Result<Box<dyn WarehouseClient>> {
    let key = ServiceAccountKey::from_profile(profile)?.ok_or_else(|| {
        RelayError::authentication(
            "No service account key configured. Set service_account_key_file or \
             store a key for this profile.",
        )
    })?;

    let token_source: Arc<dyn TokenSource> = Arc::new(ServiceAccountTokenSource::new(key)?);
    connect_with_token_source(profile, token_source)
}

/// Creates a warehouse client with an externally supplied token source.
///
/// Used by tests and by hosts that manage credentials themselves.
pub fn connect_with_token_source(
    profile: &ProfileConfig,
    token_source: Arc<dyn TokenSource>,
) -> Result<Box<dyn WarehouseClient>> {
    let client = BigQueryClient::new(profile, token_source)?;
    Ok(Box::new(client))
}

/// Trait defining the interface for warehouse clients.
///
/// All operations are async and return Results with RelayError.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Verifies the credential end to end by listing datasets (capped at one).
    async fn validate_credentials(&self) -> Result<()>;

    /// Runs the query in dry-run mode and returns the bytes it would process.
    async fn dry_run(&self, sql: &str) -> Result<u64>;

    /// Executes a SQL query and returns the results.
    async fn execute_query(&self, request: &QueryRequest) -> Result<QueryResult>;

    /// Releases any resources held by the client.
    async fn close(&self) -> Result<()>;
}
