//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod export;
pub mod inspect;
pub mod schema;
pub mod verify;

use crate::config::Config;
use crate::error::{CliError, Result};
use porter_export::{ExportPlan, SqliteSource};
use std::path::Path;
use tracing::debug;

/// Load an export plan, reporting a missing file before parsing
pub(crate) fn load_plan(path: &Path) -> Result<ExportPlan> {
    if !path.is_file() {
        return Err(CliError::file_not_found(path.display().to_string()));
    }
    Ok(ExportPlan::load(path)?)
}

/// Open the source database. SQLite would create a missing file, so check first.
pub(crate) fn open_source(path: &Path, prefix: &str) -> Result<SqliteSource> {
    if !path.is_file() {
        return Err(CliError::file_not_found(path.display().to_string()));
    }
    debug!(source = %path.display(), prefix = %prefix, "Opening source database");
    Ok(SqliteSource::open(path, prefix)?)
}

/// Table prefix precedence: flag, then environment, then plan, then none
pub(crate) fn resolve_prefix(flag: Option<&str>, config: &Config, plan: &ExportPlan) -> String {
    flag.or(config.table_prefix.as_deref())
        .or(plan.prefix.as_deref())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_precedence() {
        let plan = ExportPlan {
            prefix: Some("vb_".to_string()),
            ..Default::default()
        };
        let mut config = Config::new();

        assert_eq!(resolve_prefix(None, &config, &plan), "vb_");

        config.set_table_prefix("env_".to_string());
        assert_eq!(resolve_prefix(None, &config, &plan), "env_");
        assert_eq!(resolve_prefix(Some("flag_"), &config, &plan), "flag_");

        assert_eq!(resolve_prefix(None, &Config::new(), &ExportPlan::default()), "");
    }

    #[test]
    fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.db");

        assert!(matches!(open_source(&missing, ""), Err(CliError::FileNotFound(_))));
        assert!(matches!(load_plan(&missing), Err(CliError::FileNotFound(_))));
        assert!(!missing.exists());
    }
}
