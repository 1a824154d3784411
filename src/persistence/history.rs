//! Query history persistence.
//!
//! Records every forwarded query with its outcome, and keeps the table
//! bounded by entry count and age.

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

const MAX_HISTORY_ENTRIES: i64 = 5000;
const MAX_HISTORY_DAYS: i64 = 90;

/// Outcome of a recorded query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Success,
    Error,
    Timeout,
}

impl QueryStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "error" => Self::Error,
            "timeout" => Self::Timeout,
            _ => Self::Success,
        }
    }
}

/// A recorded query invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub profile_name: String,
    pub sql: String,
    pub statement_type: String,
    pub status: QueryStatus,
    pub execution_time_ms: Option<i64>,
    pub row_count: Option<i64>,
    pub bytes_processed: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: String,
}

/// Fields for a new history record.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub profile_name: String,
    pub sql: String,
    pub statement_type: String,
    pub status: QueryStatus,
    pub execution_time_ms: Option<i64>,
    pub row_count: Option<i64>,
    pub bytes_processed: Option<i64>,
    pub error_message: Option<String>,
}

/// Raw database row for a history entry.
#[derive(Debug, Clone, FromRow)]
struct HistoryEntryRow {
    id: i64,
    profile_name: String,
    sql: String,
    statement_type: String,
    status: String,
    execution_time_ms: Option<i64>,
    row_count: Option<i64>,
    bytes_processed: Option<i64>,
    error_message: Option<String>,
    created_at: String,
}

impl From<HistoryEntryRow> for HistoryEntry {
    fn from(row: HistoryEntryRow) -> Self {
        Self {
            id: row.id,
            profile_name: row.profile_name,
            sql: row.sql,
            statement_type: row.statement_type,
            status: QueryStatus::from_str(&row.status),
            execution_time_ms: row.execution_time_ms,
            row_count: row.row_count,
            bytes_processed: row.bytes_processed,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

/// Records a query invocation and prunes old entries.
pub async fn record_query(pool: &SqlitePool, entry: NewHistoryEntry) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO query_history
            (profile_name, sql, statement_type, status, execution_time_ms,
             row_count, bytes_processed, error_message)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.profile_name)
    .bind(&entry.sql)
    .bind(&entry.statement_type)
    .bind(entry.status.as_str())
    .bind(entry.execution_time_ms)
    .bind(entry.row_count)
    .bind(entry.bytes_processed)
    .bind(&entry.error_message)
    .execute(pool)
    .await
    .map_err(|e| RelayError::persistence(format!("Failed to record query: {e}")))?;

    prune(pool).await?;

    Ok(result.last_insert_rowid())
}

/// Lists the most recent entries, newest first.
pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<HistoryEntry>> {
    let rows: Vec<HistoryEntryRow> = sqlx::query_as(
        r#"
        SELECT id, profile_name, sql, statement_type, status, execution_time_ms,
               row_count, bytes_processed, error_message, created_at
        FROM query_history
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| RelayError::persistence(format!("Failed to list history: {e}")))?;

    Ok(rows.into_iter().map(HistoryEntry::from).collect())
}

/// Applies the retention policy: entry cap and age cap.
async fn prune(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        DELETE FROM query_history
        WHERE id NOT IN (
            SELECT id FROM query_history ORDER BY id DESC LIMIT ?
        )
        "#,
    )
    .bind(MAX_HISTORY_ENTRIES)
    .execute(pool)
    .await
    .map_err(|e| RelayError::persistence(format!("Failed to prune history: {e}")))?;

    sqlx::query("DELETE FROM query_history WHERE created_at < datetime('now', ?)")
        .bind(format!("-{MAX_HISTORY_DAYS} days"))
        .execute(pool)
        .await
        .map_err(|e| RelayError::persistence(format!("Failed to prune history: {e}")))?;

    Ok(())
}
