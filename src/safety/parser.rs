//! SQL parsing and classification logic.
//!
//! Uses sqlparser-rs with the BigQuery dialect to parse SQL and classify
//! statements by their safety level.

use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::BigQueryDialect;
use sqlparser::parser::Parser;

use super::{ClassificationResult, SafetyLevel, StatementType};

/// SQL classifier that parses and classifies statements.
#[derive(Debug)]
pub struct SqlClassifier {
    dialect: BigQueryDialect,
}

impl Default for SqlClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlClassifier {
    /// Creates a new SQL classifier.
    pub fn new() -> Self {
        Self {
            dialect: BigQueryDialect {},
        }
    }

    /// Classifies a SQL string.
    ///
    /// SQL that cannot be parsed is treated as destructive (conservative
    /// default) with a warning; the warehouse still gets the final say on
    /// validity when the statement is submitted.
    pub fn classify(&self, sql: &str) -> ClassificationResult {
        let statements = match Parser::parse_sql(&self.dialect, sql) {
            Ok(statements) => statements,
            Err(_) => {
                return ClassificationResult::with_warning(
                    SafetyLevel::Destructive,
                    StatementType::Unknown,
                    "Could not parse SQL. Review carefully.",
                )
            }
        };

        if statements.is_empty() {
            return ClassificationResult::with_warning(
                SafetyLevel::Destructive,
                StatementType::Unknown,
                "Empty SQL statement",
            );
        }

        if statements.len() == 1 {
            let (level, stmt_type) = classify_statement(&statements[0]);
            return ClassificationResult::new(level, stmt_type);
        }

        // Multiple statements: the most dangerous one decides.
        let mut max_level = SafetyLevel::Safe;
        let mut max_stmt_type = StatementType::Unknown;

        for stmt in &statements {
            let (level, stmt_type) = classify_statement(stmt);
            if level_priority(level) > level_priority(max_level) {
                max_level = level;
                max_stmt_type = stmt_type;
            }
        }

        ClassificationResult::new(max_level, StatementType::Multiple(Box::new(max_stmt_type)))
    }
}

/// Convenience function to classify SQL without creating a classifier.
pub fn classify_sql(sql: &str) -> ClassificationResult {
    SqlClassifier::new().classify(sql)
}

/// Returns a priority value for safety levels (higher = more dangerous).
fn level_priority(level: SafetyLevel) -> u8 {
    match level {
        SafetyLevel::Safe => 0,
        SafetyLevel::Mutating => 1,
        SafetyLevel::Destructive => 2,
    }
}

/// Classifies a single parsed statement.
fn classify_statement(statement: &Statement) -> (SafetyLevel, StatementType) {
    match statement {
        Statement::Query(query) => classify_query(query),

        // Mutating: data modification
        Statement::Insert(_) => (SafetyLevel::Mutating, StatementType::Insert),
        Statement::Update { .. } => (SafetyLevel::Mutating, StatementType::Update),
        Statement::Merge { .. } => (SafetyLevel::Mutating, StatementType::Merge),

        // Destructive: data loss or schema changes
        Statement::Delete(_) => (SafetyLevel::Destructive, StatementType::Delete),
        Statement::Drop { .. } => (SafetyLevel::Destructive, StatementType::Drop),
        Statement::Truncate { .. } => (SafetyLevel::Destructive, StatementType::Truncate),
        Statement::AlterTable { .. } | Statement::AlterView { .. } => {
            (SafetyLevel::Destructive, StatementType::Alter)
        }
        Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::Grant { .. } => (SafetyLevel::Destructive, StatementType::Grant),
        Statement::Revoke { .. } => (SafetyLevel::Destructive, StatementType::Revoke),

        // Conservative default: treat unknown statements as destructive
        _ => (SafetyLevel::Destructive, StatementType::Unknown),
    }
}

/// Classifies a Query, recursing into set operations and nested queries.
fn classify_query(query: &Query) -> (SafetyLevel, StatementType) {
    classify_set_expr(&query.body)
}

fn classify_set_expr(set_expr: &SetExpr) -> (SafetyLevel, StatementType) {
    match set_expr {
        // Mutations wrapped in query position
        SetExpr::Update(stmt) | SetExpr::Insert(stmt) => {
            classify_statement(stmt)
        }

        SetExpr::Query(query) => classify_query(query),

        SetExpr::SetOperation { left, right, .. } => {
            let (left_level, left_type) = classify_set_expr(left);
            let (right_level, right_type) = classify_set_expr(right);
            if level_priority(left_level) >= level_priority(right_level) {
                (left_level, left_type)
            } else {
                (right_level, right_type)
            }
        }

        SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => {
            (SafetyLevel::Safe, StatementType::Select)
        }

        _ => (SafetyLevel::Destructive, StatementType::Unknown),
    }
}
