//! Command-line argument parsing for the relay.
//!
//! Uses clap to parse CLI arguments. Connection details resolve with the
//! precedence: CLI arguments, then the named profile, then the default
//! profile, then environment variables.

use bq_relay::config::ProfileConfig;
use bq_relay::output::OutputFormat;
use clap::Parser;
use std::path::PathBuf;

/// A BigQuery query relay for workflow automation hosts.
#[derive(Parser, Debug)]
#[command(name = "bqrelay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQL to forward. Use "-" to read from stdin.
    #[arg(value_name = "SQL")]
    pub sql: Option<String>,

    /// Google Cloud project ID
    #[arg(short = 'p', long, value_name = "PROJECT_ID")]
    pub project: Option<String>,

    /// Path to a service account key JSON file
    #[arg(short = 'k', long, value_name = "PATH")]
    pub key_file: Option<PathBuf>,

    /// Use named profile from config
    #[arg(short = 'c', long, value_name = "NAME")]
    pub profile: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// BigQuery location/region (e.g. "EU")
    #[arg(short = 'l', long, value_name = "LOCATION")]
    pub location: Option<String>,

    /// Query timeout in seconds
    #[arg(short = 't', long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Maximum rows to return
    #[arg(long, value_name = "N")]
    pub max_rows: Option<usize>,

    /// Refuse mutating and destructive statements
    #[arg(long)]
    pub read_only: bool,

    /// Validate the credential and exit
    #[arg(long)]
    pub validate: bool,

    /// Estimate the query's cost without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Show the N most recent history entries and exit
    #[arg(long, value_name = "N")]
    pub history: Option<i64>,

    /// Store the --key-file contents in the OS keyring for this profile
    /// and exit
    #[arg(long)]
    pub store_key: bool,

    /// Output format (table or json)
    #[arg(short = 'o', long, value_name = "FORMAT", default_value = "table")]
    pub output: String,

    /// Use an in-memory mock warehouse (no credentials, for testing)
    #[arg(long)]
    pub mock: bool,

    /// Disable query history recording
    #[arg(long)]
    pub no_history: bool,

    /// Log to a file instead of stderr
    #[arg(long)]
    pub log_file: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Converts CLI arguments to profile overrides.
    ///
    /// Only fields the user set on the command line are populated.
    pub fn to_profile_overrides(&self) -> ProfileConfig {
        let mut overrides = ProfileConfig {
            project_id: self.project.clone(),
            service_account_key_file: self.key_file.clone(),
            location: self.location.clone(),
            read_only: self.read_only,
            ..Default::default()
        };
        if let Some(timeout) = self.timeout {
            overrides.timeout_secs = timeout;
        }
        if let Some(max_rows) = self.max_rows {
            overrides.max_rows = max_rows;
        }
        overrides
    }

    /// Returns the config file path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(bq_relay::config::Config::default_path)
    }

    /// Returns the named profile to use, if specified.
    pub fn profile_name(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Parses the output format from the --output argument.
    pub fn parse_output_format(&self) -> std::result::Result<OutputFormat, String> {
        self.output.parse()
    }

    /// Validates argument combinations.
    pub fn validate_args(&self) -> std::result::Result<(), String> {
        if self.sql.is_none() && !self.validate && self.history.is_none() && !self.store_key {
            return Err(
                "SQL is required unless --validate, --history, or --store-key is given"
                    .to_string(),
            );
        }

        if self.validate && self.dry_run {
            return Err("--validate and --dry-run are mutually exclusive".to_string());
        }

        if self.store_key && self.key_file.is_none() {
            return Err("--store-key requires --key-file".to_string());
        }

        self.parse_output_format()?;

        Ok(())
    }
}
