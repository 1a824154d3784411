//! BigQuery REST client implementation.
//!
//! Implements the `WarehouseClient` trait against the BigQuery v2 API:
//! `jobs.query` to submit, `jobs.getQueryResults` to poll slow jobs and
//! follow result pages.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::auth::TokenSource;
use crate::bq::types::{QueryRequest, QueryResult, Row};
use crate::bq::wire::{
    decode_columns, decode_rows, parse_int64_field, DatasetListResponse, ErrorResponse,
    QueryRequestBody, QueryResponseBody,
};
use crate::bq::WarehouseClient;
use crate::config::ProfileConfig;
use crate::error::{RelayError, Result};

/// Public BigQuery endpoint; overridable per profile for tests.
const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// How long a single request asks the server to wait for job completion.
const SERVER_WAIT_MS: u64 = 10_000;

/// Slack added to the HTTP client timeout over the query deadline, so the
/// deadline check in the poll loop fires first.
const HTTP_TIMEOUT_SLACK_SECS: u64 = 5;

/// BigQuery warehouse client.
pub struct BigQueryClient {
    http: Client,
    token_source: Arc<dyn TokenSource>,
    project_id: String,
    location: Option<String>,
    base_url: String,
}

impl BigQueryClient {
    /// Creates a client for the given profile and token source.
    pub fn new(profile: &ProfileConfig, token_source: Arc<dyn TokenSource>) -> Result<Self> {
        let project_id = profile.validate()?.to_string();

        let base_url = profile
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        let http = Client::builder()
            .timeout(Duration::from_secs(
                profile.timeout_secs + HTTP_TIMEOUT_SLACK_SECS,
            ))
            .build()
            .map_err(|e| RelayError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            token_source,
            project_id,
            location: profile.location.clone(),
            base_url,
        })
    }

    fn queries_url(&self) -> String {
        format!("{}/projects/{}/queries", self.base_url, self.project_id)
    }

    fn results_url(&self, job_id: &str) -> String {
        format!(
            "{}/projects/{}/queries/{}",
            self.base_url, self.project_id, job_id
        )
    }

    fn datasets_url(&self) -> String {
        format!("{}/projects/{}/datasets", self.base_url, self.project_id)
    }

    /// Maps request-level failures (no HTTP response) to relay errors.
    fn map_request_error(e: reqwest::Error) -> RelayError {
        if e.is_timeout() {
            RelayError::timeout("The warehouse did not respond in time")
        } else if e.is_connect() {
            RelayError::transport(format!("Failed to connect to the warehouse: {e}"))
        } else {
            RelayError::transport(format!("Request failed: {e}"))
        }
    }

    /// Maps a non-2xx response to a relay error.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> RelayError {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            let detail = serde_json::from_str::<ErrorResponse>(body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| status.to_string());
            return RelayError::authentication(format!(
                "{detail}. Verify the service account credential and its permissions."
            ));
        }

        if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
            let reason = parsed
                .error
                .errors
                .first()
                .map(|e| e.reason.as_str())
                .unwrap_or("");

            // The service's verdict on the SQL is surfaced verbatim.
            if matches!(reason, "invalidQuery" | "invalid" | "notFound" | "responseTooLarge") {
                return RelayError::query(parsed.error.message);
            }

            if status.as_u16() == 429 {
                return RelayError::transport(format!(
                    "Rate limited by the warehouse: {}",
                    parsed.error.message
                ));
            }

            return RelayError::transport(format!(
                "Warehouse error ({status}): {}",
                parsed.error.message
            ));
        }

        RelayError::transport(format!("Warehouse error ({status}): {body}"))
    }

    async fn bearer_token(&self) -> Result<String> {
        self.token_source.access_token().await
    }

    /// Sends a request and decodes the response body, mapping errors.
    async fn execute_request<T>(&self, request: reqwest::RequestBuilder) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let token = self.bearer_token().await?;

        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| RelayError::internal(format!("Failed to parse response: {e}")))
    }

    async fn post_query(&self, body: &QueryRequestBody<'_>) -> Result<QueryResponseBody> {
        self.execute_request(self.http.post(self.queries_url()).json(body))
            .await
    }

    async fn get_results(
        &self,
        job_id: &str,
        page_token: Option<&str>,
        wait_ms: u64,
    ) -> Result<QueryResponseBody> {
        let mut query: Vec<(&str, String)> = vec![("timeoutMs", wait_ms.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        if let Some(location) = &self.location {
            query.push(("location", location.clone()));
        }

        self.execute_request(self.http.get(self.results_url(job_id)).query(&query))
            .await
    }

    /// Builds the timeout error users see when the deadline passes.
    fn deadline_error(timeout: Duration) -> RelayError {
        RelayError::timeout(format!(
            "Query did not complete within {}s. Optimize the query or raise the \
             configured timeout.",
            timeout.as_secs()
        ))
    }

    /// Remaining server wait for one poll, or the deadline error.
    fn remaining_wait(deadline: Instant, timeout: Duration) -> Result<u64> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Self::deadline_error(timeout));
        }
        Ok((remaining.as_millis() as u64).min(SERVER_WAIT_MS))
    }
}

#[async_trait]
impl WarehouseClient for BigQueryClient {
    async fn validate_credentials(&self) -> Result<()> {
        // Listing one dataset exercises the whole chain: key, token grant,
        // project access.
        let listed: DatasetListResponse = self
            .execute_request(
                self.http
                    .get(self.datasets_url())
                    .query(&[("maxResults", "1")]),
            )
            .await?;

        debug!(
            project_id = %self.project_id,
            has_datasets = listed.datasets.is_some(),
            "Credential validation succeeded"
        );
        Ok(())
    }

    async fn dry_run(&self, sql: &str) -> Result<u64> {
        let body = QueryRequestBody {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: None,
            max_results: None,
            location: self.location.as_deref(),
            maximum_bytes_billed: None,
            dry_run: true,
        };

        let response = self.post_query(&body).await?;
        Ok(parse_int64_field(&response.total_bytes_processed).unwrap_or(0))
    }

    async fn execute_query(&self, request: &QueryRequest) -> Result<QueryResult> {
        let start = Instant::now();
        let deadline = start + request.timeout;

        let body = QueryRequestBody {
            query: &request.sql,
            use_legacy_sql: false,
            timeout_ms: Some(Self::remaining_wait(deadline, request.timeout)?),
            max_results: Some(request.max_rows as u64),
            location: request.location.as_deref().or(self.location.as_deref()),
            maximum_bytes_billed: request.max_bytes_billed.map(|b| b.to_string()),
            dry_run: false,
        };

        let mut response = self.post_query(&body).await?;

        let job_id = response
            .job_reference
            .as_ref()
            .and_then(|r| r.job_id.clone());

        // Poll until the job completes or the deadline passes. No partial
        // rows escape on timeout; the error is the whole result.
        while !response.job_complete.unwrap_or(true) {
            let job_id = job_id
                .as_deref()
                .ok_or_else(|| RelayError::internal("Incomplete job without a job id"))?;
            let wait = Self::remaining_wait(deadline, request.timeout)?;
            debug!(job_id, wait_ms = wait, "Waiting for job completion");
            response = self.get_results(job_id, None, wait).await?;
        }

        if let Some(errors) = &response.errors {
            if let Some(first) = errors.first() {
                return Err(RelayError::query(first.message.clone()));
            }
        }

        let total_rows = parse_int64_field(&response.total_rows);
        let bytes_processed = parse_int64_field(&response.total_bytes_processed);
        let cache_hit = response.cache_hit.unwrap_or(false);

        // Statements without a result relation (DDL, some DML) report no
        // schema; they produce an empty result with metadata only.
        let Some(schema) = response.schema.take() else {
            return Ok(QueryResult {
                columns: Vec::new(),
                rows: Vec::new(),
                execution_time: start.elapsed(),
                row_count: 0,
                total_rows,
                was_truncated: false,
                job_id,
                bytes_processed,
                cache_hit,
            });
        };

        let columns = decode_columns(&schema);
        let mut rows: Vec<Row> = decode_rows(&schema, response.rows.as_deref().unwrap_or(&[]))?;
        let mut page_token = response.page_token.clone();

        while rows.len() < request.max_rows {
            let Some(token) = page_token.take() else {
                break;
            };
            let job_id = job_id
                .as_deref()
                .ok_or_else(|| RelayError::internal("Paged result without a job id"))?;

            let wait = Self::remaining_wait(deadline, request.timeout)?;
            let page = self.get_results(job_id, Some(&token), wait).await?;
            rows.extend(decode_rows(&schema, page.rows.as_deref().unwrap_or(&[]))?);
            page_token = page.page_token.clone();
        }

        let fetched = rows.len() as u64;
        let was_truncated = rows.len() > request.max_rows
            || total_rows.map(|t| t > fetched).unwrap_or(false);
        if was_truncated {
            warn!(
                total = total_rows.unwrap_or(fetched),
                cap = request.max_rows,
                "Result truncated at the configured row cap"
            );
        }
        rows.truncate(request.max_rows);

        let row_count = rows.len();

        Ok(QueryResult {
            columns,
            rows,
            execution_time: start.elapsed(),
            row_count,
            total_rows,
            was_truncated,
            job_id,
            bytes_processed,
            cache_hit,
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for BigQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenSource;

    fn test_profile() -> ProfileConfig {
        ProfileConfig {
            project_id: Some("acme-analytics".to_string()),
            ..Default::default()
        }
    }

    fn test_client() -> BigQueryClient {
        BigQueryClient::new(
            &test_profile(),
            Arc::new(StaticTokenSource::new("ya29.test")),
        )
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let client = test_client();
        assert_eq!(
            client.queries_url(),
            "https://bigquery.googleapis.com/bigquery/v2/projects/acme-analytics/queries"
        );
        assert_eq!(
            client.results_url("job_1"),
            "https://bigquery.googleapis.com/bigquery/v2/projects/acme-analytics/queries/job_1"
        );
        assert_eq!(
            client.datasets_url(),
            "https://bigquery.googleapis.com/bigquery/v2/projects/acme-analytics/datasets"
        );
    }

    #[test]
    fn test_endpoint_override_trims_trailing_slash() {
        let mut profile = test_profile();
        profile.endpoint = Some("http://localhost:9050/bigquery/v2/".to_string());
        let client = BigQueryClient::new(
            &profile,
            Arc::new(StaticTokenSource::new("ya29.test")),
        )
        .unwrap();
        assert_eq!(
            client.queries_url(),
            "http://localhost:9050/bigquery/v2/projects/acme-analytics/queries"
        );
    }

    #[test]
    fn test_invalid_project_rejected_at_construction() {
        let profile = ProfileConfig {
            project_id: Some("Not Valid".to_string()),
            ..Default::default()
        };
        let err =
            BigQueryClient::new(&profile, Arc::new(StaticTokenSource::new("t"))).unwrap_err();
        assert_eq!(err.category(), "Configuration Error");
    }

    #[test]
    fn test_map_http_error_unauthorized() {
        let err = BigQueryClient::map_http_error(reqwest::StatusCode::UNAUTHORIZED, "");
        assert_eq!(err.category(), "Authentication Error");
        assert!(err.to_string().contains("Verify the service account"));
    }

    #[test]
    fn test_map_http_error_forbidden_with_body() {
        let body = r#"{"error":{"code":403,"message":"Access Denied: Project acme-analytics","errors":[{"reason":"accessDenied","message":"Access Denied"}]}}"#;
        let err = BigQueryClient::map_http_error(reqwest::StatusCode::FORBIDDEN, body);
        assert_eq!(err.category(), "Authentication Error");
        assert!(err.to_string().contains("Access Denied"));
    }

    #[test]
    fn test_map_http_error_invalid_query() {
        let body = r#"{"error":{"code":400,"message":"Syntax error: Unexpected identifier \"FORM\" at [1:10]","errors":[{"reason":"invalidQuery","message":"Syntax error"}]}}"#;
        let err = BigQueryClient::map_http_error(reqwest::StatusCode::BAD_REQUEST, body);
        assert_eq!(err.category(), "Query Error");
        // Surfaced verbatim from the service.
        assert!(err.to_string().contains("Unexpected identifier \"FORM\""));
    }

    #[test]
    fn test_map_http_error_not_found_table() {
        let body = r#"{"error":{"code":404,"message":"Not found: Table acme-analytics:ds.missing","errors":[{"reason":"notFound","message":"Not found"}]}}"#;
        let err = BigQueryClient::map_http_error(reqwest::StatusCode::NOT_FOUND, body);
        assert_eq!(err.category(), "Query Error");
    }

    #[test]
    fn test_map_http_error_rate_limited() {
        let body = r#"{"error":{"code":429,"message":"Exceeded rate limits","errors":[{"reason":"rateLimitExceeded","message":"Exceeded rate limits"}]}}"#;
        let err = BigQueryClient::map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(err.category(), "Transport Error");
    }

    #[test]
    fn test_map_http_error_server_error() {
        let err =
            BigQueryClient::map_http_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "oops");
        assert_eq!(err.category(), "Transport Error");
    }

    #[test]
    fn test_remaining_wait_after_deadline_is_timeout() {
        let timeout = Duration::from_secs(30);
        let deadline = Instant::now() - Duration::from_secs(1);
        let err = BigQueryClient::remaining_wait(deadline, timeout).unwrap_err();
        assert_eq!(err.category(), "Timeout Error");
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn test_remaining_wait_capped_at_server_window() {
        let timeout = Duration::from_secs(300);
        let deadline = Instant::now() + Duration::from_secs(300);
        let wait = BigQueryClient::remaining_wait(deadline, timeout).unwrap();
        assert_eq!(wait, SERVER_WAIT_MS);
    }
}
