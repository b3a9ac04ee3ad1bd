//! nlsql Core
//!
//! Leaf components of the natural-language to SQL pipeline. Nothing here
//! talks to a model or a database; everything is a pure function over its
//! inputs or a trait describing an external collaborator.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `attempt` - Attempt records and the append-only attempt log
//! - `response` - JSON salvage from raw model output
//! - `guard` - Read-only statement guard
//! - `classify` - Error taxonomy and repairability
//! - `history` - Summary and transcript views over attempts
//! - `normalize` - Quoted `"schema.table"` identifier fix
//! - `executor` - Query executor trait and its failure type

pub mod attempt;
pub mod classify;
pub mod error;
pub mod executor;
pub mod guard;
pub mod history;
pub mod normalize;
pub mod response;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Attempts ───────────────────────────────────────────────────────────
pub use attempt::{Attempt, AttemptLog, ErrorType};

// ── Leaf Components ────────────────────────────────────────────────────
pub use classify::{classify_error, is_repairable, is_repairable_code};
pub use guard::is_select_only;
pub use history::{summary, transcript, TranscriptLimits, DEFAULT_SUMMARY_ITEMS};
pub use normalize::fix_quoted_schema_table;
pub use response::{extract_json, first_string_field, parse_json_object};

// ── Executor Contract ──────────────────────────────────────────────────
pub use executor::{ExecError, QueryExecutor, Row};
