//! Forum Porter Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging and time formatting for the porter workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`PorterError`] and the [`Result`] alias
//! - **Logging**: centralized `tracing` setup, see [`logging`]
//! - **Time**: elapsed-time and timestamp formatting used in export audit comments
//!
//! # Example
//!
//! ```no_run
//! use porter_common::logging::{init_logging, LogConfig};
//! use porter_common::time::format_elapsed;
//! use std::time::Duration;
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!(elapsed = %format_elapsed(Duration::from_secs(75)), "done");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod time;

// Re-export commonly used types
pub use error::{PorterError, Result};
