//! Retry Orchestrator
//!
//! Generates a statement once, then loops validate → execute → repair until
//! the statement succeeds or a stop condition is hit:
//! - the read-only guard refuses the statement,
//! - the timeout budget (`max_timeouts`) is spent,
//! - a failure is not repairable,
//! - the attempt budget (`max_attempts`) is spent,
//! - the caller cancels.
//!
//! Every path ends in a [`QueryOutcome`]; nothing is returned as `Err`.

use std::future::Future;

use nlsql_core::{
    classify_error, fix_quoted_schema_table, is_repairable, is_select_only, summary, transcript,
    Attempt, AttemptLog, ErrorType, ExecError, QueryExecutor, Row, TranscriptLimits,
    DEFAULT_SUMMARY_ITEMS,
};
use nlsql_llm::LlmProvider;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::generation::generate;
use super::repair::{repair, RepairRequest};
use crate::models::settings::RetrySettings;

/// Upper bound on rows carried in a successful outcome.
pub const PREVIEW_ROWS: usize = 10;

pub const EMPTY_SQL_MESSAGE: &str = "LLM returned empty SQL.";
pub const REFUSED_MESSAGE: &str = "Refused: only SELECT or WITH queries are allowed.";
pub const TIMEOUT_BUDGET_MESSAGE: &str = "Query timed out. Please narrow filters or time range.";
pub const EXHAUSTED_MESSAGE: &str = "Failed after all retry attempts.";
pub const CANCELLED_MESSAGE: &str = "Cancelled.";

/// Budgets for one `execute_with_retries` call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub preview_limit: usize,
    pub max_timeouts: u32,
    pub cancel: Option<CancellationToken>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            preview_limit: 10,
            max_timeouts: 2,
            cancel: None,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            preview_limit: settings.preview_limit,
            max_timeouts: settings.max_timeouts,
            cancel: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Terminal result of one request.
///
/// `ok = true` carries `sql` and `rows_preview`; `ok = false` carries `error`.
/// `attempts` is present in both cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_preview: Option<Vec<Row>>,
    pub attempts: Vec<Attempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn success(sql: impl Into<String>, rows: Vec<Row>, attempts: Vec<Attempt>) -> Self {
        Self {
            ok: true,
            sql: Some(sql.into()),
            rows_preview: Some(rows.into_iter().take(PREVIEW_ROWS).collect()),
            attempts,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, attempts: Vec<Attempt>) -> Self {
        Self {
            ok: false,
            sql: None,
            rows_preview: None,
            attempts,
            error: Some(error.into()),
        }
    }
}

/// Mutable state of one request. Never outlives `execute_with_retries`.
struct RetrySession {
    current_sql: String,
    attempts: AttemptLog,
    timeout_count: u32,
}

impl RetrySession {
    fn new(sql: String) -> Self {
        Self {
            current_sql: sql,
            attempts: AttemptLog::new(),
            timeout_count: 0,
        }
    }

    fn succeed(self, rows: Vec<Row>) -> QueryOutcome {
        info!(attempts = self.attempts.len(), rows = rows.len(), "query succeeded");
        QueryOutcome::success(self.current_sql, rows, self.attempts.into_vec())
    }

    fn fail(self, error: impl Into<String>) -> QueryOutcome {
        let error = error.into();
        warn!(attempts = self.attempts.len(), error = %error, "query failed");
        QueryOutcome::failure(error, self.attempts.into_vec())
    }
}

/// What to do after recording a failed execution.
enum Next {
    Repair { error_text: String },
    Stop(String),
}

/// Await `fut` unless `cancel` fires first.
async fn until_cancelled<F: Future>(cancel: Option<&CancellationToken>, fut: F) -> Option<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => None,
            out = fut => Some(out),
        },
        None => Some(fut.await),
    }
}

/// Run the full generate/validate/execute/repair loop for one request.
pub async fn execute_with_retries(
    provider: &dyn LlmProvider,
    executor: &dyn QueryExecutor,
    user_text: &str,
    schema_context: &Value,
    policy: &RetryPolicy,
) -> QueryOutcome {
    info!(
        max_attempts = policy.max_attempts,
        max_timeouts = policy.max_timeouts,
        preview_limit = policy.preview_limit,
        "executing request"
    );
    let cancel = policy.cancel.as_ref();

    let generated = match until_cancelled(cancel, generate(provider, user_text, schema_context)).await {
        None => return QueryOutcome::failure(CANCELLED_MESSAGE, Vec::new()),
        Some(Err(e)) => {
            warn!(error = %e, "generation failed");
            return QueryOutcome::failure(e.to_string(), Vec::new());
        }
        Some(Ok(generated)) => generated,
    };

    let sql = fix_quoted_schema_table(&generated.sql);
    if sql.trim().is_empty() {
        warn!("generation produced no SQL");
        return QueryOutcome::failure(EMPTY_SQL_MESSAGE, Vec::new());
    }

    let mut session = RetrySession::new(sql);

    for iteration in 1..=policy.max_attempts {
        if !is_select_only(&session.current_sql) {
            warn!(iteration, "statement refused by read-only guard");
            return session.fail(REFUSED_MESSAGE);
        }

        let result = until_cancelled(
            cancel,
            executor.run(&session.current_sql, policy.preview_limit),
        )
        .await;
        let err = match result {
            None => return session.fail(CANCELLED_MESSAGE),
            Some(Ok(rows)) => return session.succeed(rows),
            Some(Err(err)) => err,
        };

        let error_text = match record_failure(&mut session, &err, policy) {
            Next::Stop(message) => return session.fail(message),
            Next::Repair { error_text } => error_text,
        };

        let index = session.attempts.len();
        let fixed = {
            let attempts = session.attempts.as_slice();
            let summary_text = summary(attempts, DEFAULT_SUMMARY_ITEMS);
            let transcript_text = transcript(attempts, TranscriptLimits::default());
            let request = RepairRequest {
                user_text,
                schema_context,
                prev_sql: &session.current_sql,
                error_text: &error_text,
                attempts,
                attempts_summary: Some(&summary_text),
                attempts_transcript: Some(&transcript_text),
            };
            until_cancelled(cancel, repair(provider, &request)).await
        };

        match fixed {
            None => return session.fail(CANCELLED_MESSAGE),
            Some(Err(e)) => {
                warn!(iteration, error = %e, "repair failed");
                return session.fail(e.to_string());
            }
            Some(Ok(fixed)) => {
                if let Err(e) = session.attempts.annotate(index, fixed.fix_notes) {
                    warn!(error = %e, "could not attach fix notes");
                }
                let next_sql = fix_quoted_schema_table(&fixed.sql);
                if !next_sql.trim().is_empty() {
                    session.current_sql = next_sql;
                }
            }
        }
    }

    session.fail(EXHAUSTED_MESSAGE)
}

/// Append the attempt for a failed execution and decide whether to repair.
fn record_failure(session: &mut RetrySession, err: &ExecError, policy: &RetryPolicy) -> Next {
    if err.is_timeout() {
        session.timeout_count += 1;
        let error_text = err.to_string();
        let index = session.attempts.record(Attempt::new(
            session.current_sql.clone(),
            error_text.clone(),
            ErrorType::Timeout,
        ));
        warn!(
            attempt = index,
            timeouts = session.timeout_count,
            "statement timed out"
        );
        if session.timeout_count >= policy.max_timeouts {
            return Next::Stop(TIMEOUT_BUDGET_MESSAGE.to_string());
        }
        return Next::Repair { error_text };
    }

    let error_text = err.formatted();
    let error_type = classify_error(&error_text);
    let index = session.attempts.record(Attempt::new(
        session.current_sql.clone(),
        error_text.clone(),
        error_type,
    ));
    warn!(
        attempt = index,
        error_type = %error_type,
        code = err.code().unwrap_or(""),
        "statement failed"
    );

    if is_repairable(err.code(), error_type) {
        Next::Repair { error_text }
    } else {
        Next::Stop(error_text)
    }
}
