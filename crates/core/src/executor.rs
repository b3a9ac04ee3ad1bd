//! Query Executor Contract
//!
//! The executor runs an already validated statement with a row cap and
//! reports a timeout separately from every other database failure. Pooling
//! and statement-timeout enforcement belong to the implementation.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// One result row: column name to JSON value, in select-list order.
pub type Row = Map<String, Value>;

/// Failure reported by a [`QueryExecutor`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The statement exceeded its time budget.
    #[error("{message}")]
    Timeout { message: String },

    /// Any other database failure, with the vendor error code when available.
    #[error("{message}")]
    Database {
        message: String,
        code: Option<String>,
    },
}

impl ExecError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            code,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Database { code, .. } => code.as_deref(),
            Self::Timeout { .. } => None,
        }
    }

    /// Error text as shown to the model and the caller.
    ///
    /// Database errors with a vendor code are suffixed with it, e.g.
    /// `no such table: flights (SQLSTATE 42P01)`.
    pub fn formatted(&self) -> String {
        match self {
            Self::Timeout { message } => message.clone(),
            Self::Database {
                message,
                code: Some(code),
            } => format!("{} (SQLSTATE {})", message.trim(), code),
            Self::Database { message, code: None } => message.trim().to_string(),
        }
    }
}

/// Runs read-only statements against a database.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute `sql`, returning at most `limit` rows.
    async fn run(&self, sql: &str, limit: usize) -> Result<Vec<Row>, ExecError>;
}
