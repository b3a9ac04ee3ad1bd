//! Error Handling
//!
//! Unified error types for the application.
//! Uses thiserror for ergonomic error definitions.

use nlsql_core::CoreError;
use nlsql_executor::ExecutorError;
use nlsql_llm::LlmError;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors (opening, pooling, introspection)
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Schema/history service errors
    #[error("Schema service error: {0}")]
    SchemaService(String),

    /// Session store errors (a poisoned store lock)
    #[error("Session error: {0}")]
    Session(String),

    /// Model provider errors
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Core component errors
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a schema service error
    pub fn schema_service(msg: impl Into<String>) -> Self {
        Self::SchemaService(msg.into())
    }

    /// Create a session error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<ExecutorError> for AppError {
    fn from(err: ExecutorError) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::SchemaService(err.to_string())
    }
}
