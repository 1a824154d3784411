//! Configuration loading integration tests.

use bq_relay::config::{Config, ProfileConfig, DEFAULT_MAX_ROWS, DEFAULT_TIMEOUT_SECS};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(
        r#"
[profiles.default]
project_id = "acme-analytics"
location = "EU"
timeout_secs = 45

[profiles.prod]
project_id = "acme-prod-warehouse"
service_account_key_file = "/etc/bqrelay/prod.json"
read_only = true
max_bytes_billed = 1073741824
"#,
    );

    let config = Config::load_from_file(file.path()).unwrap();

    let default = config.get_profile(None).unwrap();
    assert_eq!(default.project_id, Some("acme-analytics".to_string()));
    assert_eq!(default.timeout_secs, 45);
    assert_eq!(default.max_rows, DEFAULT_MAX_ROWS);

    let prod = config.get_profile(Some("prod")).unwrap();
    assert!(prod.read_only);
    assert_eq!(prod.max_bytes_billed, Some(1_073_741_824));
}

#[test]
fn test_missing_file_yields_default_config() {
    let config = Config::load_from_file(std::path::Path::new("/nonexistent/config.toml")).unwrap();
    assert!(config.profiles.is_empty());
    assert!(config.get_profile(None).is_none());
}

#[test]
fn test_malformed_file_is_config_error() {
    let file = write_config("[profiles.default\nproject_id = ");
    let err = Config::load_from_file(file.path()).unwrap_err();
    assert_eq!(err.category(), "Configuration Error");
}

#[test]
fn test_cli_style_override_precedence() {
    // Profile from file, then overrides merged on top: overrides win
    // where set, file values survive where not.
    let file = write_config(
        r#"
[profiles.default]
project_id = "acme-analytics"
location = "EU"
"#,
    );
    let config = Config::load_from_file(file.path()).unwrap();
    let mut profile = config.get_profile(None).unwrap().clone();

    let overrides = ProfileConfig {
        project_id: Some("acme-sandbox-env".to_string()),
        timeout_secs: 5,
        ..Default::default()
    };
    profile.merge(&overrides);

    assert_eq!(profile.project_id, Some("acme-sandbox-env".to_string()));
    assert_eq!(profile.location, Some("EU".to_string()));
    assert_eq!(profile.timeout_secs, 5);
}

#[test]
fn test_validation_after_resolution() {
    let profile = ProfileConfig {
        project_id: Some("acme-analytics".to_string()),
        endpoint: Some("http://localhost:9050".to_string()),
        ..Default::default()
    };
    assert!(profile.validate().is_ok());

    let unresolved = ProfileConfig::default();
    assert_eq!(unresolved.timeout_secs, DEFAULT_TIMEOUT_SECS);
    assert!(unresolved.validate().is_err());
}
