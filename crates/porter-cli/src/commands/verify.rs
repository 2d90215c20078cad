//! `porter verify` command implementation
//!
//! Checks a source database against the tables and columns a plan requires,
//! without writing anything.

use super::{load_plan, open_source, resolve_prefix};
use crate::config::Config;
use crate::error::Result;
use colored::Colorize;
use porter_export::verify::verify_source;
use std::path::PathBuf;

/// Run the pre-flight check
pub async fn run(plan_path: PathBuf, source_path: PathBuf, prefix: Option<String>) -> Result<()> {
    let config = Config::from_env()?;
    let plan = load_plan(&plan_path)?;
    let prefix = resolve_prefix(prefix.as_deref(), &config, &plan);

    let source = open_source(&source_path, &prefix)?;
    verify_source(&source, &plan.required)?;

    let tables = plan.required.tables().count();
    let columns: usize = plan.required.tables().map(|(_, cols)| cols.len()).sum();
    println!(
        "{} {} matches {} ({} tables, {} columns checked)",
        "✓".green(),
        source_path.display().to_string().cyan(),
        plan_path.display(),
        tables,
        columns
    );
    if !prefix.is_empty() {
        println!("  Prefix: {}", prefix);
    }
    Ok(())
}
