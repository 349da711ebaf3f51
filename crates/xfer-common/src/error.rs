//! Error types shared across the XFER workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, XferError>;

/// Ambient error type: configuration and naming failures that happen before
/// any data store is touched
#[derive(Error, Debug)]
pub enum XferError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid SQL identifier '{0}': expected [A-Za-z_][A-Za-z0-9_$]*, optionally schema-qualified")]
    InvalidIdentifier(String),

    #[error("Invalid column list '{list}': {reason}")]
    InvalidColumnList { list: String, reason: String },
}

impl XferError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
