//! nlsql Executor
//!
//! Concrete `QueryExecutor` for SQLite databases:
//! - `SqliteExecutor` - pooled read-only connections with a per-statement deadline
//! - `describe_schema` - table/column/foreign-key introspection for the model
//! - `sqlstate_for` - SQLite error text to SQLSTATE code mapping

pub mod error;
pub mod schema;
pub mod sqlite;

pub use error::{ExecutorError, ExecutorResult};
pub use sqlite::{sqlstate_for, DbPool, SqliteExecutor};
