//! Error types for the relay.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

/// Main error type for relay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Credential errors (malformed key, rejected token grant, missing permission).
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Query errors surfaced by the warehouse (invalid SQL, missing tables, etc.)
    /// or raised by local guards before submission.
    #[error("Query error: {0}")]
    Query(String),

    /// The configured execution deadline was exceeded.
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Network-level failures (DNS, TLS, connection reset, etc.)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local state database or keyring errors.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Creates an authentication error with the given message.
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a timeout error with the given message.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a transport error with the given message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "Authentication Error",
            Self::Query(_) => "Query Error",
            Self::Timeout(_) => "Timeout Error",
            Self::Transport(_) => "Transport Error",
            Self::Config(_) => "Configuration Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns true if the same invocation could plausibly succeed on retry.
    ///
    /// The relay never retries on its own; this is advisory for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

/// Result type alias using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;
