//! Error types for the porter CLI
//!
//! Every variant reads as a user-facing message that says what to check next.

use porter_common::PorterError;
use porter_export::ExportError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Error type for CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    /// Required file is missing
    #[error("File not found: '{0}'. Verify the file path exists and you have read permissions.")]
    FileNotFound(String),

    /// Export plan has invalid syntax or content
    #[error("Invalid export plan: {0}. Check the plan file against the canonical schema ('porter schema').")]
    InvalidPlan(String),

    /// Source database lacks tables or columns the plan needs
    #[error("Source database does not match the plan ({0}). Check --source and --prefix.")]
    SchemaMismatch(String),

    /// The export did not finish within its time budget
    #[error("Export exceeded the time limit of {0}s. Raise PORTER_TIME_LIMIT_SECS or pass --time-limit.")]
    TimeLimit(u64),

    /// Table name is not part of the canonical schema
    #[error("Unknown table: '{0}'. Run 'porter schema' to list the canonical tables.")]
    UnknownTable(String),

    /// Export engine failure
    #[error("Export failed: {0}")]
    Export(ExportError),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your PORTER_* environment variables.")]
    Config(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] PorterError),

    /// JSON output failed
    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a file not found error
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound(path.into())
    }

    /// Create an unknown table error
    pub fn unknown_table(name: impl Into<String>) -> Self {
        Self::UnknownTable(name.into())
    }
}

impl From<ExportError> for CliError {
    fn from(err: ExportError) -> Self {
        if matches!(err, ExportError::SchemaMismatch { .. }) {
            let message = err.to_string();
            let detail = message
                .strip_prefix("Source schema mismatch: ")
                .unwrap_or(&message)
                .to_string();
            return Self::SchemaMismatch(detail);
        }
        match err {
            ExportError::InvalidPlan(msg) => Self::InvalidPlan(msg),
            ExportError::Yaml(e) => Self::InvalidPlan(e.to_string()),
            other => Self::Export(other),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_plan_errors_are_actionable() {
        let err: CliError = ExportError::invalid_plan("unknown filter: shout").into();
        let message = err.to_string();
        assert!(message.starts_with("Invalid export plan: unknown filter: shout"));
        assert!(message.contains("porter schema"));
    }

    #[test]
    fn test_schema_mismatch_mapping() {
        let err: CliError = ExportError::SchemaMismatch {
            missing_tables: vec!["post".to_string()],
            missing_columns: BTreeMap::new(),
        }
        .into();
        assert!(matches!(&err, CliError::SchemaMismatch(detail) if detail == "missing tables: post"));
        assert!(err.to_string().contains("--prefix"));
    }

    #[test]
    fn test_other_export_errors_pass_through() {
        let err: CliError = ExportError::source_unavailable("User", "no such table").into();
        assert!(matches!(err, CliError::Export(_)));
    }
}
