//! Read-Only Guard
//!
//! Keyword allow-list deciding whether a statement may reach the executor.
//! This is not a SQL parser: the statement must open with `select` or `with`
//! and must not contain a mutating keyword as a whole word anywhere in it.
//! Safe but confusable statements (a CTE named `create`, a string literal
//! containing `drop`) are rejected as well.

use std::sync::LazyLock;

use regex::Regex;

/// Keywords that disqualify a statement wherever they appear as a word.
pub const BANNED_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "truncate", "grant", "revoke",
];

static BANNED_WORD: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = BANNED_KEYWORDS.join("|");
    Regex::new(&format!(r"\b(?:{})\b", alternation)).expect("banned keyword pattern is valid")
});

/// Returns true when `sql` is a permitted read-only statement.
pub fn is_select_only(sql: &str) -> bool {
    let s = sql.trim().to_lowercase();
    if !(s.starts_with("select") || s.starts_with("with")) {
        return false;
    }
    !BANNED_WORD.is_match(&s)
}
