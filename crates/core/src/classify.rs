//! Error Classification
//!
//! Two independent views of an execution failure:
//! - [`classify_error`] maps the message text onto [`ErrorType`] by keyword,
//!   first match wins in a fixed precedence order (timeouts first).
//! - [`is_repairable_code`] inspects the vendor error code, when the executor
//!   surfaces one, by SQLSTATE class.
//!
//! [`is_repairable`] combines both: either view landing on a repairable class
//! is enough.

use crate::attempt::ErrorType;

/// SQLSTATE classes that rewriting the statement can plausibly fix:
/// `42` syntax error / undefined object, `22` data exception, `23` constraint.
pub const REPAIRABLE_SQLSTATE_CLASSES: &[&str] = &["42", "22", "23"];

const TIMEOUT_PHRASES: &[&str] = &[
    "timeout",
    "statement timeout",
    "canceling statement due to statement timeout",
    "timed out",
    "interrupted",
];

/// Classify a raw error message.
pub fn classify_error(message: &str) -> ErrorType {
    let e = message.to_lowercase();
    let has = |needle: &str| e.contains(needle);

    if TIMEOUT_PHRASES.iter().any(|p| has(p)) {
        return ErrorType::Timeout;
    }

    if (has("does not exist") && has("column")) || has("no such column") {
        return ErrorType::MissingColumn;
    }
    if (has("does not exist") && (has("relation") || has("table"))) || has("no such table") {
        return ErrorType::MissingTable;
    }
    if has("syntax error") {
        return ErrorType::Syntax;
    }
    if has("invalid input syntax")
        || has("cannot cast")
        || has("type mismatch")
        || has("datatype mismatch")
    {
        return ErrorType::Type;
    }
    if has("permission denied") || has("not authorized") {
        return ErrorType::Permission;
    }

    ErrorType::Other
}

/// Whether a vendor error code falls into a repairable SQLSTATE class.
pub fn is_repairable_code(code: Option<&str>) -> bool {
    code.and_then(|c| c.get(..2))
        .map(|class| REPAIRABLE_SQLSTATE_CLASSES.contains(&class))
        .unwrap_or(false)
}

/// Combined repairability test used by the retry loop.
pub fn is_repairable(code: Option<&str>, error_type: ErrorType) -> bool {
    is_repairable_code(code) || error_type.is_repairable()
}
