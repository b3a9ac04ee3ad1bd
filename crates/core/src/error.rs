//! Core Error Types
//!
//! Errors raised by the leaf components of the query pipeline. Kept to
//! thiserror + serde_json so the core crate stays lightweight; the root crate
//! layers configuration, network and session errors on top.

use thiserror::Error;

/// Core error type for the nlsql workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// An attempt index that is not in the log
    #[error("Attempt #{index} not found (log holds {len})")]
    AttemptNotFound { index: usize, len: usize },
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
