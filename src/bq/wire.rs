//! BigQuery REST v2 wire format.
//!
//! Request/response bodies for `jobs.query` and `jobs.getQueryResults`,
//! plus decoding of the service's schema-typed string cells into `Value`s.
//! BigQuery encodes every scalar cell as a JSON string; the declared
//! column type decides how it is parsed.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::bq::types::{ColumnInfo, Row, Value};
use crate::error::{RelayError, Result};

/// Request body for `jobs.query`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryRequestBody<'a> {
    pub query: &'a str,

    /// Standard SQL; the legacy dialect is never used.
    pub use_legacy_sql: bool,

    /// How long the service holds the request open before returning an
    /// incomplete job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<&'a str>,

    /// Serialized as a string per the API's int64 convention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_bytes_billed: Option<String>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

/// Response body shared by `jobs.query` and `jobs.getQueryResults`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryResponseBody {
    #[serde(default)]
    pub schema: Option<TableSchema>,

    #[serde(default)]
    pub job_reference: Option<JobReference>,

    /// int64 as string.
    #[serde(default)]
    pub total_rows: Option<String>,

    #[serde(default)]
    pub page_token: Option<String>,

    #[serde(default)]
    pub rows: Option<Vec<TableRow>>,

    /// int64 as string.
    #[serde(default)]
    pub total_bytes_processed: Option<String>,

    #[serde(default)]
    pub job_complete: Option<bool>,

    #[serde(default)]
    pub cache_hit: Option<bool>,

    #[serde(default)]
    pub errors: Option<Vec<ErrorProto>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TableFieldSchema {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: String,

    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobReference {
    #[serde(default)]
    pub job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TableCell {
    #[serde(default)]
    pub v: serde_json::Value,
}

/// One entry of an error response's `errors` list.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorProto {
    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub message: String,
}

/// Top-level error envelope returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

/// Response body for dataset listing, used for credential validation.
#[derive(Debug, Deserialize)]
pub(crate) struct DatasetListResponse {
    #[serde(default)]
    pub datasets: Option<Vec<serde_json::Value>>,
}

/// Extracts column metadata from a response schema.
pub(crate) fn decode_columns(schema: &TableSchema) -> Vec<ColumnInfo> {
    schema
        .fields
        .iter()
        .map(|field| ColumnInfo::new(&field.name, &field.field_type))
        .collect()
}

/// Decodes a page of rows against the schema.
pub(crate) fn decode_rows(schema: &TableSchema, rows: &[TableRow]) -> Result<Vec<Row>> {
    rows.iter()
        .map(|row| {
            if row.f.len() != schema.fields.len() {
                return Err(RelayError::internal(format!(
                    "Row has {} cells but schema has {} fields",
                    row.f.len(),
                    schema.fields.len()
                )));
            }
            row.f
                .iter()
                .zip(&schema.fields)
                .map(|(cell, field)| decode_cell(field, &cell.v))
                .collect()
        })
        .collect()
}

/// Decodes a single cell.
///
/// Scalars arrive as JSON strings typed by the schema. Repeated and
/// nested cells arrive as JSON arrays/objects and are passed through as
/// their JSON text.
fn decode_cell(field: &TableFieldSchema, v: &serde_json::Value) -> Result<Value> {
    if v.is_null() {
        return Ok(Value::Null);
    }

    if field.mode.as_deref() == Some("REPEATED") {
        return Ok(Value::String(v.to_string()));
    }

    let Some(text) = v.as_str() else {
        // Nested RECORD cells arrive as objects; pass their JSON through.
        return Ok(Value::String(v.to_string()));
    };

    match field.field_type.as_str() {
        "INTEGER" | "INT64" => text.parse::<i64>().map(Value::Int).map_err(|_| {
            RelayError::internal(format!(
                "Cell '{text}' in column '{}' is not a valid INT64",
                field.name
            ))
        }),
        "FLOAT" | "FLOAT64" => parse_float(text).map(Value::Float).ok_or_else(|| {
            RelayError::internal(format!(
                "Cell '{text}' in column '{}' is not a valid FLOAT64",
                field.name
            ))
        }),
        "BOOLEAN" | "BOOL" => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(RelayError::internal(format!(
                "Cell '{text}' in column '{}' is not a valid BOOL",
                field.name
            ))),
        },
        "BYTES" => base64::engine::general_purpose::STANDARD
            .decode(text)
            .map(Value::Bytes)
            .map_err(|e| {
                RelayError::internal(format!(
                    "Cell in column '{}' is not valid base64: {e}",
                    field.name
                ))
            }),
        // NUMERIC, TIMESTAMP, DATE, TIME, STRING, GEOGRAPHY, ... pass
        // through as the text the service sent.
        _ => Ok(Value::String(text.to_string())),
    }
}

/// Parses FLOAT64 cells, covering the service's non-finite spellings.
fn parse_float(text: &str) -> Option<f64> {
    match text {
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => text.parse::<f64>().ok(),
    }
}

/// Parses the API's int64-as-string convention.
pub(crate) fn parse_int64_field(value: &Option<String>) -> Option<u64> {
    value.as_deref().and_then(|s| s.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn schema(fields: &[(&str, &str)]) -> TableSchema {
        TableSchema {
            fields: fields
                .iter()
                .map(|(name, field_type)| TableFieldSchema {
                    name: name.to_string(),
                    field_type: field_type.to_string(),
                    mode: None,
                })
                .collect(),
        }
    }

    fn row(cells: &[serde_json::Value]) -> TableRow {
        TableRow {
            f: cells.iter().map(|v| TableCell { v: v.clone() }).collect(),
        }
    }

    #[test]
    fn test_decode_select_one() {
        // The exact shape the service returns for `SELECT 1`.
        let body: QueryResponseBody = serde_json::from_str(
            r#"{
                "kind": "bigquery#queryResponse",
                "schema": {"fields": [{"name": "f0_", "type": "INTEGER", "mode": "NULLABLE"}]},
                "jobReference": {"projectId": "acme-analytics", "jobId": "job_abc123"},
                "totalRows": "1",
                "rows": [{"f": [{"v": "1"}]}],
                "totalBytesProcessed": "0",
                "jobComplete": true,
                "cacheHit": false
            }"#,
        )
        .unwrap();

        let schema = body.schema.unwrap();
        let columns = decode_columns(&schema);
        assert_eq!(columns, vec![ColumnInfo::new("f0_", "INTEGER")]);

        let rows = decode_rows(&schema, &body.rows.unwrap()).unwrap();
        assert_eq!(rows, vec![vec![Value::Int(1)]]);

        assert_eq!(body.job_reference.unwrap().job_id, Some("job_abc123".to_string()));
        assert_eq!(parse_int64_field(&body.total_rows), Some(1));
    }

    #[test]
    fn test_decode_scalar_types() {
        let schema = schema(&[
            ("n", "INT64"),
            ("x", "FLOAT64"),
            ("b", "BOOL"),
            ("s", "STRING"),
            ("data", "BYTES"),
            ("ts", "TIMESTAMP"),
        ]);

        let rows = decode_rows(
            &schema,
            &[row(&[
                serde_json::json!("-42"),
                serde_json::json!("2.5"),
                serde_json::json!("true"),
                serde_json::json!("hello"),
                serde_json::json!("3q0="),
                serde_json::json!("1.7208864E9"),
            ])],
        )
        .unwrap();

        assert_eq!(
            rows[0],
            vec![
                Value::Int(-42),
                Value::Float(2.5),
                Value::Bool(true),
                Value::String("hello".to_string()),
                Value::Bytes(vec![0xde, 0xad]),
                Value::String("1.7208864E9".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_nulls() {
        let schema = schema(&[("n", "INT64"), ("s", "STRING")]);
        let rows = decode_rows(
            &schema,
            &[row(&[serde_json::Value::Null, serde_json::Value::Null])],
        )
        .unwrap();
        assert_eq!(rows[0], vec![Value::Null, Value::Null]);
    }

    #[test]
    fn test_decode_non_finite_floats() {
        let schema = schema(&[("x", "FLOAT64")]);
        let rows = decode_rows(
            &schema,
            &[
                row(&[serde_json::json!("Infinity")]),
                row(&[serde_json::json!("-Infinity")]),
            ],
        )
        .unwrap();
        assert_eq!(rows[0], vec![Value::Float(f64::INFINITY)]);
        assert_eq!(rows[1], vec![Value::Float(f64::NEG_INFINITY)]);

        let nan_rows = decode_rows(&schema, &[row(&[serde_json::json!("NaN")])]).unwrap();
        match &nan_rows[0][0] {
            Value::Float(f) => assert!(f.is_nan()),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_repeated_passes_json_through() {
        let schema = TableSchema {
            fields: vec![TableFieldSchema {
                name: "tags".to_string(),
                field_type: "STRING".to_string(),
                mode: Some("REPEATED".to_string()),
            }],
        };

        let rows = decode_rows(
            &schema,
            &[row(&[serde_json::json!([{"v": "a"}, {"v": "b"}])])],
        )
        .unwrap();

        assert_eq!(
            rows[0],
            vec![Value::String(r#"[{"v":"a"},{"v":"b"}]"#.to_string())]
        );
    }

    #[test]
    fn test_decode_cell_count_mismatch() {
        let schema = schema(&[("a", "INT64"), ("b", "INT64")]);
        let err = decode_rows(&schema, &[row(&[serde_json::json!("1")])]).unwrap_err();
        assert_eq!(err.category(), "Internal Error");
    }

    #[test]
    fn test_decode_bad_int_cell() {
        let schema = schema(&[("n", "INT64")]);
        let err = decode_rows(&schema, &[row(&[serde_json::json!("not-a-number")])]).unwrap_err();
        assert!(err.to_string().contains("INT64"));
    }

    #[test]
    fn test_request_body_serialization() {
        let body = QueryRequestBody {
            query: "SELECT 1",
            use_legacy_sql: false,
            timeout_ms: Some(10_000),
            max_results: Some(100),
            location: Some("EU"),
            maximum_bytes_billed: Some("5368709120".to_string()),
            dry_run: false,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["query"], "SELECT 1");
        assert_eq!(json["useLegacySql"], false);
        assert_eq!(json["timeoutMs"], 10_000);
        assert_eq!(json["maximumBytesBilled"], "5368709120");
        // dryRun is omitted when false.
        assert!(json.get("dryRun").is_none());
    }

    #[test]
    fn test_request_body_dry_run_serialized_when_set() {
        let body = QueryRequestBody {
            query: "SELECT 1",
            use_legacy_sql: false,
            timeout_ms: None,
            max_results: None,
            location: None,
            maximum_bytes_billed: None,
            dry_run: true,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["dryRun"], true);
        assert!(json.get("timeoutMs").is_none());
    }

    #[test]
    fn test_error_response_parsing() {
        let body: ErrorResponse = serde_json::from_str(
            r#"{
                "error": {
                    "code": 400,
                    "message": "Syntax error: Unexpected identifier at [1:8]",
                    "errors": [{"reason": "invalidQuery", "message": "Syntax error", "domain": "global"}],
                    "status": "INVALID_ARGUMENT"
                }
            }"#,
        )
        .unwrap();

        assert!(body.error.message.starts_with("Syntax error"));
        assert_eq!(body.error.errors[0].reason, "invalidQuery");
    }
}
