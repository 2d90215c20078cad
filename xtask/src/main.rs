//! Build automation tasks for Forum Porter
//!
//! This tool provides automation tasks for the porter workspace:
//! - Generating the CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for Forum Porter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<porter_cli::Cli>();

    let content = format!(
        r#"# Porter CLI Reference

Generated from the CLI source code on {}.

## Overview

`porter` reads a forum database and writes a Vanilla Export file: every source
table reconciled into the canonical schema, with attachments and avatars
extracted next to it. What to read from the source is described by an export
plan (YAML), see `demos/vbulletin.yml`.

## Quick Start

```bash
# List the canonical tables
porter schema

# Check that the source has what the plan needs
porter verify --plan demos/vbulletin.yml --source forum.db

# Export, gzip by default
porter export --plan demos/vbulletin.yml --source forum.db --output-dir out

# Look at the result
porter inspect "out/export 2026-01-31 120000.txt.gz" --table User
```

## Commands

{}

## Environment Variables

- `PORTER_OUTPUT_DIR` - Directory for the export file and blobs (default: `.`)
- `PORTER_TABLE_PREFIX` - Source table prefix substituted for `:_` in plan queries
- `PORTER_COMPRESS` - Gzip the export file (default: `true`)
- `PORTER_TIME_LIMIT_SECS` - Export time budget (default: `120`)
- `PORTER_LOG_LEVEL`, `PORTER_LOG_OUTPUT`, `PORTER_LOG_FORMAT`, `PORTER_LOG_DIR` - Logging

A `.env` file in the working directory is loaded first. Command-line flags win
over the environment.

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("✅ Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
