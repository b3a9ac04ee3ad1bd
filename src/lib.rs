//! nlsql - natural-language questions to read-only SQL
//!
//! This library provides:
//! - The generate/validate/execute/repair pipeline (`services::sql_pipeline`)
//! - Schema-context providers and the session store
//! - Storage of the JSON configuration
//! - Data models and utilities
//!
//! The leaf components live in `nlsql-core`, the model client in `nlsql-llm`
//! and the SQLite executor in `nlsql-executor`.

pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use models::settings::{AppConfig, SettingsUpdate};
pub use services::{
    execute_with_retries, QueryOutcome, QueryRequest, QueryResponse, QueryService, RetryPolicy,
};
pub use state::{AppState, QueryOverrides};
pub use utils::error::{AppError, AppResult};
