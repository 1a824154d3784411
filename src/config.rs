//! Configuration management for the relay.
//!
//! Handles loading configuration from TOML files and environment variables,
//! with support for named warehouse profiles.

use crate::error::{RelayError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

/// Default query timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default maximum rows returned from a query.
pub const DEFAULT_MAX_ROWS: usize = 1000;

/// Main configuration structure for the relay.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Named warehouse profiles.
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

/// A warehouse profile: one project plus one credential source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Google Cloud project ID that scopes billing and access.
    pub project_id: Option<String>,

    /// Path to a service-account key JSON file.
    pub service_account_key_file: Option<PathBuf>,

    /// Inline service-account key JSON. Prefer the keyring or a key file;
    /// this exists for hosts that inject the key through config.
    pub service_account_key: Option<String>,

    /// BigQuery location/region hint (e.g. "EU", "us-central1").
    pub location: Option<String>,

    /// Query timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum rows returned from a query before truncation.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Upper bound on billed bytes, forwarded to the service when set.
    pub max_bytes_billed: Option<u64>,

    /// Refuse mutating and destructive statements before submission.
    #[serde(default)]
    pub read_only: bool,

    /// API endpoint override (tests, private service connect).
    pub endpoint: Option<String>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_rows() -> usize {
    DEFAULT_MAX_ROWS
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            service_account_key_file: None,
            service_account_key: None,
            location: None,
            timeout_secs: default_timeout_secs(),
            max_rows: default_max_rows(),
            max_bytes_billed: None,
            read_only: false,
            endpoint: None,
        }
    }
}

impl ProfileConfig {
    /// Merges another profile into this one, with the other taking precedence.
    pub fn merge(&mut self, other: &ProfileConfig) {
        if other.project_id.is_some() {
            self.project_id = other.project_id.clone();
        }
        if other.service_account_key_file.is_some() {
            self.service_account_key_file = other.service_account_key_file.clone();
        }
        if other.service_account_key.is_some() {
            self.service_account_key = other.service_account_key.clone();
        }
        if other.location.is_some() {
            self.location = other.location.clone();
        }
        if other.timeout_secs != default_timeout_secs() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.max_rows != default_max_rows() {
            self.max_rows = other.max_rows;
        }
        if other.max_bytes_billed.is_some() {
            self.max_bytes_billed = other.max_bytes_billed;
        }
        if other.read_only {
            self.read_only = true;
        }
        if other.endpoint.is_some() {
            self.endpoint = other.endpoint.clone();
        }
    }

    /// Applies environment variables as defaults for unset fields.
    ///
    /// `BQRELAY_PROJECT_ID` and `BQRELAY_LOCATION` are relay-specific;
    /// `GOOGLE_APPLICATION_CREDENTIALS` is the conventional key-file variable.
    pub fn apply_env_defaults(&mut self) {
        if self.project_id.is_none() {
            self.project_id = std::env::var("BQRELAY_PROJECT_ID").ok();
        }
        if self.location.is_none() {
            self.location = std::env::var("BQRELAY_LOCATION").ok();
        }
        if self.service_account_key_file.is_none() {
            self.service_account_key_file = std::env::var("GOOGLE_APPLICATION_CREDENTIALS")
                .ok()
                .map(PathBuf::from);
        }
    }

    /// Validates the profile, returning the project ID on success.
    ///
    /// Checks the project ID against Google's documented format and the
    /// endpoint override (when present) for URL well-formedness.
    pub fn validate(&self) -> Result<&str> {
        let project_id = self
            .project_id
            .as_deref()
            .ok_or_else(|| RelayError::config("Project ID is required"))?;

        if !project_id_regex().is_match(project_id) {
            return Err(RelayError::config(format!(
                "Invalid project ID '{project_id}'. Expected 6-30 lowercase letters, \
                 digits, or hyphens, starting with a letter"
            )));
        }

        if let Some(endpoint) = &self.endpoint {
            Url::parse(endpoint)
                .map_err(|e| RelayError::config(format!("Invalid endpoint '{endpoint}': {e}")))?;
        }

        Ok(project_id)
    }

    /// Returns a display-safe string (no credential material) for logs and UI.
    pub fn display_string(&self) -> String {
        let project = self.project_id.as_deref().unwrap_or("unknown");
        match &self.location {
            Some(location) => format!("{project} ({location})"),
            None => project.to_string(),
        }
    }
}

/// Matches Google Cloud project IDs: 6-30 chars, lowercase letters,
/// digits and hyphens, starting with a letter, not ending with a hyphen.
fn project_id_regex() -> Regex {
    Regex::new(r"^[a-z][a-z0-9-]{4,28}[a-z0-9]$").expect("static regex is valid")
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bq-relay")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            RelayError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Gets a named profile, or the default profile if name is None.
    pub fn get_profile(&self, name: Option<&str>) -> Option<&ProfileConfig> {
        let key = name.unwrap_or("default");
        self.profiles.get(key)
    }
}
