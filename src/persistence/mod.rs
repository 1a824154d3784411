//! Persistence layer for the relay.
//!
//! Manages a local SQLite database for query history. The service-account
//! key is kept out of this database; it lives in the OS keyring when not
//! supplied by file or config.

pub mod history;
mod migrations;
mod secrets;

pub use history::{HistoryEntry, NewHistoryEntry, QueryStatus};
pub use secrets::SecretStorage;

use crate::error::{RelayError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Handle to the relay's local state database.
pub struct StateDb {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl StateDb {
    /// Opens or creates the state database at the default platform path.
    ///
    /// - Linux/macOS: `~/.config/bq-relay/state.db`
    /// - Windows: `%APPDATA%\bq-relay\state.db`
    pub async fn open_default() -> Result<Self> {
        let path = Self::default_path()?;
        Self::open(&path).await
    }

    /// Opens or creates the state database at the specified path.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::ensure_parent_dirs(path)?;

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| RelayError::persistence(format!("Invalid database path: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| RelayError::persistence(format!("Failed to open state database: {e}")))?;

        migrations::run_migrations(&pool).await?;

        info!("State database ready at {}", path.display());

        Ok(Self {
            pool,
            db_path: path.to_path_buf(),
        })
    }

    /// Returns the default state database path.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| RelayError::persistence("Could not determine config directory"))?;
        Ok(base.join("bq-relay").join("state.db"))
    }

    fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RelayError::persistence(format!("Failed to create state directory: {e}"))
            })?;
        }
        Ok(())
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the path the database was opened at.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Closes the database.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
