//! SQL Pipeline
//!
//! Natural-language request to executed read-only SQL:
//! - `generation` - first candidate from the model
//! - `repair` - corrected candidate after a failed execution
//! - `orchestrator` - the bounded retry loop tying them to an executor
//! - `analyzer` - intent extraction for schema retrieval

pub mod analyzer;
pub mod generation;
pub mod orchestrator;
pub mod prompts;
pub mod repair;

pub use analyzer::analyze_query;
pub use generation::{generate, GeneratedQuery, GenerationError};
pub use orchestrator::{
    execute_with_retries, QueryOutcome, RetryPolicy, CANCELLED_MESSAGE, EMPTY_SQL_MESSAGE,
    EXHAUSTED_MESSAGE, PREVIEW_ROWS, REFUSED_MESSAGE, TIMEOUT_BUDGET_MESSAGE,
};
pub use repair::{repair, RepairError, RepairRequest, RepairedQuery};
