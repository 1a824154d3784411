//! Dry-run cost estimation.
//!
//! Every query is dry-run before execution to find out how many bytes it
//! would scan. Queries over the byte cap are refused; expensive ones get
//! a warning attached to the outcome.

/// Hard cap on bytes a single query may process: 5 GiB.
pub const MAX_BYTES_PROCESSED: u64 = 5 * 1024 * 1024 * 1024;

/// Rough on-demand cost model: $1 per 5 GiB scanned.
pub const BYTES_PER_DOLLAR: u64 = 5 * 1024 * 1024 * 1024;

/// Estimates above this attach a cost warning.
pub const COST_WARNING_THRESHOLD_USD: f64 = 1.0;

/// Cost estimate for a query, derived from a dry run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryEstimate {
    /// Bytes the service reports it would process.
    pub bytes_processed: u64,

    /// Estimated cost in USD under the relay's cost model.
    pub estimated_cost_usd: f64,
}

impl QueryEstimate {
    /// Builds an estimate from a dry run's byte count.
    pub fn from_bytes(bytes_processed: u64) -> Self {
        Self {
            bytes_processed,
            estimated_cost_usd: bytes_processed as f64 / BYTES_PER_DOLLAR as f64,
        }
    }

    /// Returns true if the query is over the byte cap and must be refused.
    pub fn exceeds_limit(&self) -> bool {
        self.bytes_processed > MAX_BYTES_PROCESSED
    }

    /// Returns true if the outcome should carry a cost warning.
    pub fn warrants_cost_warning(&self) -> bool {
        self.estimated_cost_usd > COST_WARNING_THRESHOLD_USD
    }

    /// Message used when the byte cap refuses the query.
    pub fn guard_message(&self) -> String {
        format!(
            "Query would process {} bytes, which exceeds the limit of {} bytes (5 GiB). \
             Refine the query to process less data.",
            self.bytes_processed, MAX_BYTES_PROCESSED
        )
    }

    /// Warning attached to expensive-but-allowed queries.
    pub fn cost_warning(&self) -> String {
        format!(
            "This query is estimated to process {} bytes (~${:.2}). \
             Consider refining it to process less data.",
            self.bytes_processed, self.estimated_cost_usd
        )
    }
}
