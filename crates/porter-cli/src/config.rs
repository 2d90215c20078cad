//! Configuration management for the porter CLI
//!
//! Values come from the environment (a `.env` file is loaded first) and can be
//! overridden by command-line flags.

use crate::error::{CliError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// CLI Configuration Constants
// ============================================================================

/// Default directory for export files and extracted blobs.
pub const DEFAULT_OUTPUT_DIR: &str = ".";

/// Default wall-clock budget for one export run.
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 120;

pub const ENV_OUTPUT_DIR: &str = "PORTER_OUTPUT_DIR";
pub const ENV_TABLE_PREFIX: &str = "PORTER_TABLE_PREFIX";
pub const ENV_COMPRESS: &str = "PORTER_COMPRESS";
pub const ENV_TIME_LIMIT: &str = "PORTER_TIME_LIMIT_SECS";

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for export files and blobs
    pub output_dir: PathBuf,

    /// Source table prefix; `None` defers to the plan
    pub table_prefix: Option<String>,

    /// Gzip the export file
    pub compress: bool,

    /// Export time budget in seconds
    pub time_limit_secs: u64,
}

impl Config {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            table_prefix: None,
            compress: true,
            time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
        }
    }

    /// Load config from `.env` and environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::new();

        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            config.output_dir = PathBuf::from(dir);
        }

        if let Some(prefix) = lookup(ENV_TABLE_PREFIX) {
            config.table_prefix = Some(prefix);
        }

        if let Some(compress) = lookup(ENV_COMPRESS) {
            config.compress = parse_bool(&compress)
                .ok_or_else(|| CliError::config(format!("{} must be true or false, got '{}'", ENV_COMPRESS, compress)))?;
        }

        if let Some(secs) = lookup(ENV_TIME_LIMIT) {
            config.time_limit_secs = secs
                .trim()
                .parse()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| {
                    CliError::config(format!("{} must be a positive number of seconds, got '{}'", ENV_TIME_LIMIT, secs))
                })?;
        }

        Ok(config)
    }

    /// Get the time budget
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }

    /// Set the output directory
    pub fn set_output_dir(&mut self, dir: PathBuf) {
        self.output_dir = dir;
    }

    /// Set the table prefix
    pub fn set_table_prefix(&mut self, prefix: String) {
        self.table_prefix = Some(prefix);
    }

    /// Enable or disable compression
    pub fn set_compress(&mut self, compress: bool) {
        self.compress = compress;
    }

    /// Set the time budget in seconds
    pub fn set_time_limit_secs(&mut self, secs: u64) {
        self.time_limit_secs = secs;
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
