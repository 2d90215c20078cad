//! Pre-flight source check
//!
//! An export plan names the tables and columns its queries rely on. Checking
//! them before any output is created turns a half-written export into one clear
//! error that names everything missing at once.

use crate::error::{ExportError, Result};
use crate::source::RowSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Required source table (without prefix) -> required columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceManifest {
    tables: BTreeMap<String, Vec<String>>,
}

impl SourceManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a table and the given columns. An empty column list only
    /// requires the table to exist.
    pub fn require<I, S>(mut self, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables
            .entry(table.into())
            .or_default()
            .extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.tables.iter().map(|(t, c)| (t.as_str(), c.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Check every required table and column. Column names compare
/// case-insensitively, as most forum databases treat them.
pub fn verify_source<S: RowSource + ?Sized>(source: &S, manifest: &SourceManifest) -> Result<()> {
    let mut missing_tables = Vec::new();
    let mut missing_columns = BTreeMap::new();

    for (table, required) in manifest.tables() {
        let Some(present) = source.table_columns(table)? else {
            missing_tables.push(table.to_string());
            continue;
        };
        let absent: Vec<String> = required
            .iter()
            .filter(|column| !present.iter().any(|p| p.eq_ignore_ascii_case(column)))
            .cloned()
            .collect();
        if !absent.is_empty() {
            missing_columns.insert(table.to_string(), absent);
        }
        debug!(table, "Source table verified");
    }

    if missing_tables.is_empty() && missing_columns.is_empty() {
        info!(tables = manifest.tables.len(), "Source verified");
        return Ok(());
    }

    Err(ExportError::SchemaMismatch {
        missing_tables,
        missing_columns,
    })
}
