//! `porter export` command implementation
//!
//! Runs an export plan against a SQLite source under a wall-clock budget.

use super::{load_plan, open_source, resolve_prefix};
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::progress::{create_spinner, format_bytes};
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use porter_common::time::format_elapsed;
use porter_export::{ExportOptions, ExportSummary, Exporter};
use std::path::PathBuf;
use tracing::{info, warn};

/// Arguments of `porter export`
#[derive(Debug, Clone)]
pub struct ExportArgs {
    pub plan: PathBuf,
    pub source: PathBuf,
    pub prefix: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub compress: bool,
    pub tables: Option<Vec<String>>,
    pub blobs: bool,
    pub conversations: bool,
    pub time_limit: Option<u64>,
}

/// Run an export
pub async fn run(args: ExportArgs) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(dir) = &args.output_dir {
        config.set_output_dir(dir.clone());
    }
    if !args.compress {
        config.set_compress(false);
    }
    if let Some(secs) = args.time_limit {
        if secs == 0 {
            return Err(CliError::config("--time-limit must be at least 1 second"));
        }
        config.set_time_limit_secs(secs);
    }

    let plan = load_plan(&args.plan)?;
    let prefix = resolve_prefix(args.prefix.as_deref(), &config, &plan);

    let mut options = ExportOptions::new(config.output_dir.clone())
        .with_compress(config.compress)
        .with_blobs(args.blobs)
        .with_conversations(args.conversations);
    if let Some(output) = &args.output {
        options = options.with_output_path(output.clone());
    }
    if let Some(tables) = &args.tables {
        options = options.with_tables(tables.clone());
    }

    info!(
        plan = %args.plan.display(),
        source = %args.source.display(),
        prefix = %prefix,
        time_limit = config.time_limit_secs,
        "Starting export"
    );

    let spinner = create_spinner(&format!("Exporting {}...", args.source.display()));
    let source_path = args.source.clone();
    let task = tokio::task::spawn_blocking(move || -> Result<ExportSummary> {
        let source = open_source(&source_path, &prefix)?;
        Ok(Exporter::new(&source, options).run(&plan)?)
    });

    let outcome = tokio::time::timeout(config.time_limit(), task).await;
    spinner.finish_and_clear();

    let summary = match outcome {
        Err(_) => {
            warn!(limit = config.time_limit_secs, "Export timed out");
            return Err(CliError::TimeLimit(config.time_limit_secs));
        },
        Ok(joined) => joined.map_err(|e| CliError::Other(anyhow::Error::new(e)))??,
    };

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &ExportSummary) {
    let report = &summary.report;

    println!("{}", "Export Summary:".cyan().bold());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Table", "Rows", "Elapsed"]);
    for section in &report.tables {
        table.add_row(vec![
            section.table.clone(),
            section.rows.to_string(),
            format_elapsed(section.elapsed),
        ]);
    }
    println!("{}", table);
    println!();

    if !report.failures.is_empty() {
        println!("{}", "Skipped:".yellow().bold());
        for failure in &report.failures {
            println!("  {} {}: {}", "✗".red(), failure.table, failure.reason);
        }
        println!();
    }

    let size = std::fs::metadata(&summary.path).map(|m| m.len()).unwrap_or(0);
    println!(
        "{} Wrote {} ({})",
        "✓".green(),
        summary.path.display().to_string().cyan(),
        format_bytes(size)
    );
    println!("  Tables:  {}", report.tables.len());
    println!("  Rows:    {}", report.rows());
    println!("  Blobs:   {}", report.blobs);
    println!("  Elapsed: {}", format_elapsed(report.elapsed));
}
