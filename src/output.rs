//! Result rendering for the CLI.
//!
//! Converts relayed results into an aligned text table or JSON. JSON rows
//! are objects keyed by column name, which is what workflow hosts consume.

use crate::bq::QueryResult;
use crate::error::{RelayError, Result};
use crate::persistence::HistoryEntry;

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned text table.
    #[default]
    Table,
    /// JSON document with columns, rows, and metadata.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: table or json")),
        }
    }
}

/// Renders a query result as an aligned text table.
pub fn render_table(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return format!("(no result set, {} rows)\n", result.row_count);
    }

    let headers: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
    let rows: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|v| v.to_display_string()).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    render_row(&mut out, &headers, &widths);
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    render_row(&mut out, &separator, &widths);
    for row in &rows {
        render_row(&mut out, row, &widths);
    }

    out.push_str(&format!("({} rows)\n", result.row_count));
    out
}

fn render_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let rendered: Vec<String> = cells
        .iter()
        .zip(widths.iter().copied())
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(rendered.join(" | ").trim_end());
    out.push('\n');
}

/// Renders a query result as JSON.
///
/// Rows become objects keyed by column name; metadata rides alongside.
pub fn render_json(result: &QueryResult) -> Result<String> {
    let rows: Vec<serde_json::Value> = result
        .rows
        .iter()
        .map(|row| {
            let object: serde_json::Map<String, serde_json::Value> = result
                .columns
                .iter()
                .zip(row)
                .map(|(column, value)| (column.name.clone(), value.to_json()))
                .collect();
            serde_json::Value::Object(object)
        })
        .collect();

    let document = serde_json::json!({
        "columns": result.columns,
        "rows": rows,
        "metadata": {
            "row_count": result.row_count,
            "total_rows": result.total_rows,
            "was_truncated": result.was_truncated,
            "job_id": result.job_id,
            "bytes_processed": result.bytes_processed,
            "cache_hit": result.cache_hit,
            "execution_time_ms": result.execution_time.as_millis() as u64,
        },
    });

    serde_json::to_string_pretty(&document)
        .map_err(|e| RelayError::internal(format!("Failed to serialize result: {e}")))
}

/// Renders history entries as an aligned text table.
pub fn render_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "(no history)\n".to_string();
    }

    let mut out = String::new();
    for entry in entries {
        let status = match entry.status {
            crate::persistence::QueryStatus::Success => "ok",
            crate::persistence::QueryStatus::Error => "error",
            crate::persistence::QueryStatus::Timeout => "timeout",
        };
        let rows = entry
            .row_count
            .map(|r| format!("{r} rows"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "[{}] {:<7} {:>9}  {}\n",
            entry.created_at,
            status,
            rows,
            single_line(&entry.sql, 80)
        ));
        if let Some(error) = &entry.error_message {
            out.push_str(&format!("    {error}\n"));
        }
    }
    out
}

fn single_line(sql: &str, max_chars: usize) -> String {
    let collapsed: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let truncated: String = collapsed.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}
