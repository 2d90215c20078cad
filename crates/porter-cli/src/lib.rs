//! Forum Porter CLI Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Command-line interface for exporting forum databases into the Vanilla
//! Export format.
//!
//! # Overview
//!
//! - **Export**: run an export plan against a source database (`porter export`)
//! - **Pre-flight**: check a source against a plan's requirements (`porter verify`)
//! - **Schema**: list the canonical target tables and columns (`porter schema`)
//! - **Inspect**: summarize an existing export file (`porter inspect`)

pub mod commands;
pub mod config;
pub mod error;
pub mod progress;

// Re-export commonly used types
pub use config::Config;
pub use error::{CliError, Result};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Forum Porter - export forum databases into the Vanilla import format
#[derive(Parser, Debug)]
#[command(name = "porter")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the full command reference as markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export a source database using an export plan
    Export {
        /// Export plan (YAML)
        #[arg(short, long)]
        plan: PathBuf,

        /// Source database file (SQLite)
        #[arg(short, long)]
        source: PathBuf,

        /// Source table prefix, overrides PORTER_TABLE_PREFIX and the plan
        #[arg(long)]
        prefix: Option<String>,

        /// Directory for the export file and blobs
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Explicit export file path
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write plain text instead of gzip
        #[arg(long)]
        no_compress: bool,

        /// Only export these canonical tables (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        tables: Option<Vec<String>>,

        /// Skip blob extraction
        #[arg(long)]
        skip_blobs: bool,

        /// Skip conversation clustering
        #[arg(long)]
        skip_conversations: bool,

        /// Time budget in seconds, overrides PORTER_TIME_LIMIT_SECS
        #[arg(long)]
        time_limit: Option<u64>,
    },

    /// Check that a source database has what a plan requires
    Verify {
        /// Export plan (YAML)
        #[arg(short, long)]
        plan: PathBuf,

        /// Source database file (SQLite)
        #[arg(short, long)]
        source: PathBuf,

        /// Source table prefix, overrides PORTER_TABLE_PREFIX and the plan
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Show the canonical target schema
    Schema {
        /// Show a single table
        #[arg(short, long)]
        table: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize an export file
    Inspect {
        /// Export file (.txt or .txt.gz)
        file: PathBuf,

        /// Print the rows of one table
        #[arg(short, long)]
        table: Option<String>,

        /// Maximum rows to print with --table
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}
