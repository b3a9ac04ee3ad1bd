//! Services
//!
//! Business logic services for the application.
//! Services handle the core functionality and are called by the CLI.

pub mod query_service;
pub mod schema;
pub mod session_store;
pub mod sql_pipeline;

pub use query_service::{QueryRequest, QueryResponse, QueryService};
pub use schema::{RagSchemaService, SchemaSource, SqliteSchemaSource};
pub use session_store::SessionStore;
pub use sql_pipeline::{execute_with_retries, QueryOutcome, RetryPolicy};
