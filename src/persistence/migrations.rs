//! Schema versioning and migrations for the state database.
//!
//! Manages database schema evolution with forward-only migrations.

use crate::error::{RelayError, Result};
use sqlx::sqlite::SqlitePool;
use tracing::info;

const CURRENT_VERSION: i32 = 1;

/// Runs all pending migrations on the database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    ensure_schema_versions_table(pool).await?;

    let current = get_current_version(pool).await?;

    if current > CURRENT_VERSION {
        return Err(RelayError::persistence(format!(
            "State database schema version ({current}) is newer than supported \
             version ({CURRENT_VERSION}). Upgrade bq-relay to the latest version."
        )));
    }

    for version in (current + 1)..=CURRENT_VERSION {
        run_migration(pool, version).await?;
        record_version(pool, version).await?;
        info!("Applied state database migration v{version}");
    }

    Ok(())
}

async fn ensure_schema_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        RelayError::persistence(format!("Failed to create schema_versions table: {e}"))
    })?;

    Ok(())
}

async fn get_current_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM schema_versions")
        .fetch_optional(pool)
        .await
        .map_err(|e| RelayError::persistence(format!("Failed to get schema version: {e}")))?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

async fn record_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_versions (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| RelayError::persistence(format!("Failed to record migration: {e}")))?;

    Ok(())
}

async fn run_migration(pool: &SqlitePool, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(pool).await,
        _ => Err(RelayError::persistence(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// v1: query history.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_name TEXT NOT NULL,
            sql TEXT NOT NULL,
            statement_type TEXT NOT NULL DEFAULT 'Unknown',
            status TEXT NOT NULL,
            execution_time_ms INTEGER,
            row_count INTEGER,
            bytes_processed INTEGER,
            error_message TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| RelayError::persistence(format!("Failed to create query_history: {e}")))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_query_history_created_at \
         ON query_history (created_at)",
    )
    .execute(pool)
    .await
    .map_err(|e| RelayError::persistence(format!("Failed to index query_history: {e}")))?;

    Ok(())
}
