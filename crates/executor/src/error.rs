//! Executor Setup Errors
//!
//! Failures while opening the database or building the pool. Errors raised
//! while running a statement are reported as `nlsql_core::ExecError`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Database not found: {0}")]
    NotFound(String),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Task join error: {0}")]
    Join(String),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

