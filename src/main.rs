//! bqrelay - forwards SQL to BigQuery from the command line.

mod cli;

use anyhow::Context;
use cli::Cli;
use tracing::{error, warn};

use bq_relay::auth::ServiceAccountKey;
use bq_relay::bq::{self, MockWarehouseClient, WarehouseClient};
use bq_relay::config::{Config, ProfileConfig};
use bq_relay::error::RelayError;
use bq_relay::forward::QueryForwarder;
use bq_relay::output::{self, OutputFormat};
use bq_relay::persistence::{self, SecretStorage, StateDb};
use bq_relay::{logging, output::render_history};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<RelayError>() {
            Some(relay_err) => error!("{}: {}", relay_err.category(), relay_err),
            None => error!("{e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    cli.validate_args().map_err(anyhow::Error::msg)?;
    let format = cli.parse_output_format().map_err(anyhow::Error::msg)?;

    let config_path = cli.config_path();
    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let profile_name = cli.profile_name().unwrap_or("default").to_string();

    if cli.store_key {
        return store_key(&cli, &profile_name);
    }

    let profile = resolve_profile(&cli, &config)?;

    // History listing needs no warehouse at all.
    if let Some(limit) = cli.history {
        let state_db = StateDb::open_default().await?;
        let entries = persistence::history::list_recent(state_db.pool(), limit.max(1)).await?;
        print!("{}", render_history(&entries));
        state_db.close().await;
        return Ok(());
    }

    let client: Box<dyn WarehouseClient> = if cli.mock {
        Box::new(MockWarehouseClient::new())
    } else {
        bq::connect(&profile).await?
    };

    let state_db = if cli.no_history {
        None
    } else {
        match StateDb::open_default().await {
            Ok(db) => Some(db),
            Err(e) => {
                warn!("Query history disabled: {e}");
                None
            }
        }
    };

    let mut forwarder = QueryForwarder::new(client.as_ref(), &profile);
    if let Some(db) = &state_db {
        forwarder = forwarder.with_history(db, &profile_name);
    }

    if cli.validate {
        forwarder.validate().await?;
        println!("Credential OK for {}", profile.display_string());
        return finish(client, state_db).await;
    }

    let sql = resolve_sql(&cli)?;

    if cli.dry_run {
        let estimate = forwarder.estimate(&sql).await?;
        println!(
            "Dry run: {} bytes (~${:.2})",
            estimate.bytes_processed, estimate.estimated_cost_usd
        );
        return finish(client, state_db).await;
    }

    let outcome = forwarder.forward(&sql).await?;

    for warning in &outcome.warnings {
        eprintln!("Warning: {warning}");
    }

    match format {
        OutputFormat::Table => print!("{}", output::render_table(&outcome.result)),
        OutputFormat::Json => println!("{}", output::render_json(&outcome.result)?),
    }

    finish(client, state_db).await
}

async fn finish(client: Box<dyn WarehouseClient>, state_db: Option<StateDb>) -> anyhow::Result<()> {
    client.close().await?;
    if let Some(db) = state_db {
        db.close().await;
    }
    Ok(())
}

/// Validates the key file and stores its contents in the OS keyring.
fn store_key(cli: &Cli, profile_name: &str) -> anyhow::Result<()> {
    let key_file = cli
        .key_file
        .as_deref()
        .ok_or_else(|| RelayError::config("--store-key requires --key-file"))?;

    // Parse first so a broken document never lands in the keyring.
    let key = ServiceAccountKey::from_file(key_file)?;
    let json = std::fs::read_to_string(key_file)
        .with_context(|| format!("reading {}", key_file.display()))?;

    let secrets = SecretStorage::new();
    secrets.store(&SecretStorage::service_account_key(profile_name), &json)?;

    println!(
        "Stored service account key for profile '{profile_name}' ({})",
        key.client_email
    );
    Ok(())
}

/// Resolves the final profile from CLI args, config file, environment,
/// and (when nothing else supplies a key) the OS keyring.
fn resolve_profile(cli: &Cli, config: &Config) -> anyhow::Result<ProfileConfig> {
    let mut profile = match cli.profile_name() {
        Some(name) => config
            .get_profile(Some(name))
            .cloned()
            .ok_or_else(|| {
                RelayError::config(format!("Profile '{name}' not found in config file"))
            })?,
        None => config.get_profile(None).cloned().unwrap_or_default(),
    };

    profile.merge(&cli.to_profile_overrides());
    profile.apply_env_defaults();

    if !cli.mock
        && profile.service_account_key.is_none()
        && profile.service_account_key_file.is_none()
    {
        let secrets = SecretStorage::new();
        let key_name = SecretStorage::service_account_key(cli.profile_name().unwrap_or("default"));
        if let Some(key) = secrets.retrieve(&key_name)? {
            profile.service_account_key = Some(key);
        }
    }

    Ok(profile)
}

/// Returns the SQL to forward, reading stdin when the argument is "-".
fn resolve_sql(cli: &Cli) -> anyhow::Result<String> {
    let arg = cli
        .sql
        .as_deref()
        .ok_or_else(|| RelayError::query("SQL text is empty"))?;

    if arg == "-" {
        let mut buffer = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buffer)
            .context("reading SQL from stdin")?;
        Ok(buffer)
    } else {
        Ok(arg.to_string())
    }
}
