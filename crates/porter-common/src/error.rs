//! Error types shared across the porter workspace

use thiserror::Error;

/// Result type alias for shared porter operations
pub type Result<T> = std::result::Result<T, PorterError>;

/// Base error type for porter
#[derive(Error, Debug)]
pub enum PorterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl PorterError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
