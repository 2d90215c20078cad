//! Error types for the export engine

use porter_common::PorterError;
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Errors raised by the export engine
///
/// Only [`ExportError::SchemaMismatch`] and failures to create the output file
/// abort a run. Everything raised while exporting a single table is recorded as
/// an audit comment and the run moves on to the next table.
#[derive(Error, Debug)]
pub enum ExportError {
    /// A query against the row source failed for one table
    #[error("Source unavailable for {table}: {message}")]
    SourceUnavailable { table: String, message: String },

    /// Required tables or columns are missing from the source database
    #[error("Source schema mismatch: {}", describe_mismatch(.missing_tables, .missing_columns))]
    SchemaMismatch {
        missing_tables: Vec<String>,
        missing_columns: BTreeMap<String, Vec<String>>,
    },

    /// The export plan is malformed or refers to unknown tables/columns
    #[error("Invalid export plan: {0}")]
    InvalidPlan(String),

    /// SQLite row source failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Plan YAML could not be parsed
    #[error("Failed to parse plan YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A pattern used by a transform failed to compile
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// Export file, blob or directory IO failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] PorterError),
}

impl ExportError {
    /// Create a source-unavailable error for a table
    pub fn source_unavailable(table: impl Into<String>, message: impl ToString) -> Self {
        Self::SourceUnavailable {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid plan error
    pub fn invalid_plan(msg: impl Into<String>) -> Self {
        Self::InvalidPlan(msg.into())
    }
}

fn describe_mismatch(tables: &[String], columns: &BTreeMap<String, Vec<String>>) -> String {
    let mut parts = Vec::new();
    if !tables.is_empty() {
        parts.push(format!("missing tables: {}", tables.join(", ")));
    }
    for (table, cols) in columns {
        parts.push(format!("missing columns in {}: {}", table, cols.join(", ")));
    }
    parts.join("; ")
}
