//! Attempt Records
//!
//! One `Attempt` is written for every execution that failed. Attempts are
//! append-only: a failure is recorded first, and the repair step that runs
//! afterwards may attach its notes to that record exactly once through
//! [`AttemptLog::annotate`]. Nothing else ever changes a recorded attempt.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Failure taxonomy produced by the error classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Timeout,
    MissingColumn,
    MissingTable,
    Syntax,
    Type,
    Permission,
    Other,
}

impl ErrorType {
    /// Whether rewriting the SQL is a plausible fix for this class of failure.
    pub fn is_repairable(self) -> bool {
        matches!(
            self,
            ErrorType::MissingColumn | ErrorType::MissingTable | ErrorType::Syntax | ErrorType::Type
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::Timeout => "timeout",
            ErrorType::MissingColumn => "missing_column",
            ErrorType::MissingTable => "missing_table",
            ErrorType::Syntax => "syntax",
            ErrorType::Type => "type",
            ErrorType::Permission => "permission",
            ErrorType::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed execution trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    sql: String,
    error: String,
    error_type: ErrorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fix_notes: Option<String>,
}

impl Attempt {
    pub fn new(sql: impl Into<String>, error: impl Into<String>, error_type: ErrorType) -> Self {
        Self {
            sql: sql.into(),
            error: error.into(),
            error_type,
            fix_notes: None,
        }
    }

    /// The statement that was executed.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Raw error text reported by the executor.
    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    /// Notes from the repair step that produced the next candidate, if any ran.
    pub fn fix_notes(&self) -> Option<&str> {
        self.fix_notes.as_deref()
    }
}

/// Ordered, append-only list of attempts for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptLog {
    attempts: Vec<Attempt>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a failure record and return its 1-based trial index.
    pub fn record(&mut self, attempt: Attempt) -> usize {
        self.attempts.push(attempt);
        self.attempts.len()
    }

    /// Attach repair notes to the attempt at `index` (1-based).
    ///
    /// Notes can be attached once; a second call for the same attempt is rejected.
    pub fn annotate(&mut self, index: usize, fix_notes: impl Into<String>) -> CoreResult<()> {
        let len = self.attempts.len();
        let attempt = index
            .checked_sub(1)
            .and_then(|i| self.attempts.get_mut(i))
            .ok_or(CoreError::AttemptNotFound { index, len })?;

        if attempt.fix_notes.is_some() {
            return Err(CoreError::validation(format!(
                "attempt #{} already carries fix notes",
                index
            )));
        }
        attempt.fix_notes = Some(fix_notes.into());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn as_slice(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attempt> {
        self.attempts.iter()
    }

    pub fn last(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    pub fn into_vec(self) -> Vec<Attempt> {
        self.attempts
    }
}

impl<'a> IntoIterator for &'a AttemptLog {
    type Item = &'a Attempt;
    type IntoIter = std::slice::Iter<'a, Attempt>;

    fn into_iter(self) -> Self::IntoIter {
        self.attempts.iter()
    }
}
