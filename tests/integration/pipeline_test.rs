//! Retry Orchestrator Integration Tests
//!
//! Drives `execute_with_retries` with a scripted model and executor and
//! checks every termination path.

use std::time::Duration;

use nlsql::services::sql_pipeline::{
    execute_with_retries, RetryPolicy, CANCELLED_MESSAGE, EMPTY_SQL_MESSAGE, EXHAUSTED_MESSAGE,
    REFUSED_MESSAGE, TIMEOUT_BUDGET_MESSAGE,
};
use nlsql_core::{ErrorType, ExecError};
use nlsql_llm::LlmError;
use tokio_util::sync::CancellationToken;

use crate::common::{fix_reply, gen_reply, rows, schema, HangingExecutor, ScriptedExecutor, ScriptedProvider};

fn missing_column() -> ExecError {
    ExecError::database("no such column: fare", Some("42703".to_string()))
}

fn timeout() -> ExecError {
    ExecError::timeout("canceling statement due to statement timeout")
}

// ============================================================================
// Success and Generation Tests
// ============================================================================

#[tokio::test]
async fn test_success_on_first_try() {
    let provider = ScriptedProvider::new(["```json\n{\"sql\": \"SELECT id FROM flights\"}\n```"]);
    let executor = ScriptedExecutor::new([Ok(rows(25))]);
    let policy = RetryPolicy::default();

    let outcome = execute_with_retries(&provider, &executor, "list flights", &schema(), &policy).await;

    assert!(outcome.ok);
    assert_eq!(outcome.sql.as_deref(), Some("SELECT id FROM flights"));
    assert_eq!(outcome.rows_preview.as_ref().unwrap().len(), 10);
    assert!(outcome.attempts.is_empty());
    assert!(outcome.error.is_none());
    assert_eq!(executor.ran(), [("SELECT id FROM flights".to_string(), 10)]);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_generation_prompt_carries_request_and_schema() {
    let provider = ScriptedProvider::new([gen_reply("SELECT 1")]);
    let executor = ScriptedExecutor::new([Ok(rows(1))]);

    execute_with_retries(&provider, &executor, "cheapest flight", &schema(), &RetryPolicy::default()).await;

    let call = &provider.calls()[0];
    assert!(call.json_mode);
    assert!(call.system.contains("read-only SQL"));
    assert!(call.user.starts_with("User request:\ncheapest flight\n\nschema_context:\n"));
    assert!(call.user.contains("\"flights\""));
}

#[tokio::test]
async fn test_preview_limit_passed_to_executor() {
    let provider = ScriptedProvider::new([gen_reply("SELECT id FROM flights")]);
    let executor = ScriptedExecutor::new([Ok(rows(3))]);
    let policy = RetryPolicy {
        preview_limit: 3,
        ..Default::default()
    };

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &policy).await;

    assert!(outcome.ok);
    assert_eq!(executor.ran()[0].1, 3);
    assert_eq!(outcome.rows_preview.unwrap().len(), 3);
}

#[tokio::test]
async fn test_quoted_schema_table_is_normalized() {
    let provider = ScriptedProvider::new([gen_reply("SELECT * FROM \"public.flights\"")]);
    let executor = ScriptedExecutor::new([Ok(rows(1))]);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &RetryPolicy::default()).await;

    assert_eq!(outcome.sql.as_deref(), Some("SELECT * FROM \"public\".\"flights\""));
    assert_eq!(executor.ran()[0].0, "SELECT * FROM \"public\".\"flights\"");
}

#[tokio::test]
async fn test_empty_generated_sql() {
    let provider = ScriptedProvider::new([r#"{"sql": "   ", "explanation": "no idea"}"#]);
    let executor = ScriptedExecutor::new([Ok(rows(1))]);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &RetryPolicy::default()).await;

    assert!(!outcome.ok);
    assert_eq!(outcome.error.as_deref(), Some(EMPTY_SQL_MESSAGE));
    assert!(outcome.attempts.is_empty());
    assert!(executor.ran().is_empty());
}

#[tokio::test]
async fn test_generation_invalid_json_is_structured_failure() {
    let provider = ScriptedProvider::new(["I think you want SELECT * FROM flights"]);
    let executor = ScriptedExecutor::new([Ok(rows(1))]);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &RetryPolicy::default()).await;

    assert!(!outcome.ok);
    assert!(outcome
        .error
        .as_deref()
        .unwrap()
        .starts_with("SQL generator returned invalid JSON"));
    assert!(outcome.attempts.is_empty());
    assert!(executor.ran().is_empty());
}

#[tokio::test]
async fn test_generation_provider_failure_is_structured_failure() {
    let provider = ScriptedProvider::with_results([Err(LlmError::RateLimited {
        message: "slow down".to_string(),
        retry_after: None,
    })]);
    let executor = ScriptedExecutor::new([Ok(rows(1))]);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &RetryPolicy::default()).await;

    assert!(!outcome.ok);
    assert!(outcome.error.as_deref().unwrap().contains("slow down"));
    assert!(outcome.attempts.is_empty());
}

// ============================================================================
// Read-Only Guard Tests
// ============================================================================

#[tokio::test]
async fn test_refusal_before_execution() {
    let provider = ScriptedProvider::new([gen_reply("DROP TABLE x")]);
    let executor = ScriptedExecutor::new([Ok(rows(1))]);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &RetryPolicy::default()).await;

    assert!(!outcome.ok);
    assert_eq!(outcome.error.as_deref(), Some(REFUSED_MESSAGE));
    assert!(outcome.attempts.is_empty());
    assert!(executor.ran().is_empty());
}

#[tokio::test]
async fn test_repaired_sql_is_still_guarded() {
    let provider = ScriptedProvider::new([
        gen_reply("SELECT fare FROM flights"),
        fix_reply("DELETE FROM flights", "cleared the table"),
    ]);
    let executor = ScriptedExecutor::new([Err(missing_column()), Ok(rows(1))]);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &RetryPolicy::default()).await;

    assert!(!outcome.ok);
    assert_eq!(outcome.error.as_deref(), Some(REFUSED_MESSAGE));
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(executor.ran().len(), 1);
}

// ============================================================================
// Repair Loop Tests
// ============================================================================

#[tokio::test]
async fn test_repair_then_success() {
    let provider = ScriptedProvider::new([
        gen_reply("SELECT fare FROM flights"),
        fix_reply("SELECT price FROM flights", "fare is called price"),
    ]);
    let executor = ScriptedExecutor::new([Err(missing_column()), Ok(rows(2))]);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &RetryPolicy::default()).await;

    assert!(outcome.ok);
    assert_eq!(outcome.sql.as_deref(), Some("SELECT price FROM flights"));
    assert_eq!(outcome.attempts.len(), 1);

    let attempt = &outcome.attempts[0];
    assert_eq!(attempt.sql(), "SELECT fare FROM flights");
    assert_eq!(attempt.error(), "no such column: fare (SQLSTATE 42703)");
    assert_eq!(attempt.error_type(), ErrorType::MissingColumn);
    assert_eq!(attempt.fix_notes(), Some("fare is called price"));
}

#[tokio::test]
async fn test_repair_prompt_carries_history() {
    let provider = ScriptedProvider::new([
        gen_reply("SELECT fare FROM flights"),
        fix_reply("SELECT cost FROM flights", "try cost"),
        fix_reply("SELECT price FROM flights", "use price"),
    ]);
    let executor = ScriptedExecutor::new([
        Err(missing_column()),
        Err(ExecError::database("no such column: cost", Some("42703".to_string()))),
        Ok(rows(1)),
    ]);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &RetryPolicy::default()).await;
    assert!(outcome.ok);

    let calls = provider.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[1].system.contains("repair"));

    let second_repair = &calls[2].user;
    assert!(second_repair.contains("Previous SQL (the one that failed):\nSELECT cost FROM flights"));
    assert!(second_repair.contains("Database error:\nno such column: cost (SQLSTATE 42703)"));
    assert!(second_repair.contains("- #1: missing_column | no such column: fare"));
    assert!(second_repair.contains("- #2: missing_column | no such column: cost"));
    assert!(second_repair.contains("ATTEMPT #1"));
    assert!(second_repair.contains("FIX_NOTES:\ntry cost"));
    assert!(second_repair.contains("ATTEMPT #2"));
}

#[tokio::test]
async fn test_timeout_budget() {
    let provider = ScriptedProvider::new([
        gen_reply("SELECT * FROM flights"),
        fix_reply("SELECT * FROM flights WHERE price < 200", "added a price filter"),
    ]);
    let executor = ScriptedExecutor::new([Err(timeout()), Err(timeout())]);
    let policy = RetryPolicy {
        max_timeouts: 2,
        ..Default::default()
    };

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &policy).await;

    assert!(!outcome.ok);
    assert_eq!(outcome.error.as_deref(), Some(TIMEOUT_BUDGET_MESSAGE));
    assert_eq!(outcome.attempts.len(), 2);
    assert!(outcome
        .attempts
        .iter()
        .all(|a| a.error_type() == ErrorType::Timeout));
    assert_eq!(outcome.attempts[0].fix_notes(), Some("added a price filter"));
    assert_eq!(outcome.attempts[1].sql(), "SELECT * FROM flights WHERE price < 200");
    assert_eq!(outcome.attempts[1].fix_notes(), None);
    // generation plus one repair
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_timeouts_interleaved_with_repairable_errors() {
    let provider = ScriptedProvider::new([
        gen_reply("SELECT * FROM flights"),
        fix_reply("SELECT * FROM flights WHERE id < 10", "narrowed"),
    ]);
    let executor = ScriptedExecutor::new([Err(timeout()), Err(missing_column()), Err(timeout())]);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &RetryPolicy::default()).await;

    assert_eq!(outcome.error.as_deref(), Some(TIMEOUT_BUDGET_MESSAGE));
    assert_eq!(outcome.attempts.len(), 3);
}

#[tokio::test]
async fn test_attempt_budget() {
    let provider = ScriptedProvider::new([
        gen_reply("SELECT fare FROM flights"),
        fix_reply("SELECT fare2 FROM flights", "renamed"),
    ]);
    let executor = ScriptedExecutor::new([Err(missing_column())]);
    let policy = RetryPolicy {
        max_attempts: 3,
        ..Default::default()
    };

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &policy).await;

    assert!(!outcome.ok);
    assert_eq!(outcome.error.as_deref(), Some(EXHAUSTED_MESSAGE));
    assert_eq!(outcome.attempts.len(), 3);
    assert_eq!(executor.ran().len(), 3);
    assert!(outcome.attempts.iter().all(|a| a.fix_notes() == Some("renamed")));
}

#[tokio::test]
async fn test_permission_error_short_circuits() {
    let provider = ScriptedProvider::new([gen_reply("SELECT * FROM salaries")]);
    let executor = ScriptedExecutor::new([Err(ExecError::database(
        "permission denied for table salaries",
        None,
    ))]);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &RetryPolicy::default()).await;

    assert!(!outcome.ok);
    assert_eq!(outcome.error.as_deref(), Some("permission denied for table salaries"));
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(outcome.attempts[0].error_type(), ErrorType::Permission);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_code_alone_makes_error_repairable() {
    let provider = ScriptedProvider::new([
        gen_reply("SELECT id FROM flights WHERE price = 'cheap'"),
        fix_reply("SELECT id FROM flights WHERE price < 100", "numeric filter"),
    ]);
    let executor = ScriptedExecutor::new([
        Err(ExecError::database("value out of range", Some("22003".to_string()))),
        Ok(rows(1)),
    ]);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &RetryPolicy::default()).await;

    assert!(outcome.ok);
    assert_eq!(outcome.attempts[0].error_type(), ErrorType::Other);
}

#[tokio::test]
async fn test_repair_failure_is_structured() {
    let provider = ScriptedProvider::new([
        gen_reply("SELECT * FROM flights WHERE"),
        "sorry, I cannot help".to_string(),
    ]);
    let executor = ScriptedExecutor::new([Err(ExecError::database(
        "incomplete input",
        Some("42601".to_string()),
    ))]);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &RetryPolicy::default()).await;

    assert!(!outcome.ok);
    assert!(outcome
        .error
        .as_deref()
        .unwrap()
        .starts_with("SQL fixer returned invalid JSON"));
    assert_eq!(provider.call_count(), 2);
    assert_eq!(executor.ran().len(), 1);
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(outcome.attempts[0].sql(), "SELECT * FROM flights WHERE");
    assert_eq!(outcome.attempts[0].error(), "incomplete input (SQLSTATE 42601)");
    assert_eq!(outcome.attempts[0].fix_notes(), None);
}

#[tokio::test]
async fn test_repair_with_empty_sql_is_structured() {
    let provider = ScriptedProvider::new([gen_reply("SELECT fare FROM flights"), fix_reply("", "no idea")]);
    let executor = ScriptedExecutor::new([Err(missing_column())]);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &RetryPolicy::default()).await;

    assert_eq!(outcome.error.as_deref(), Some("SQL fixer returned empty SQL."));
    assert_eq!(outcome.attempts.len(), 1);
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[tokio::test]
async fn test_cancel_during_execution() {
    let provider = ScriptedProvider::new([gen_reply("SELECT * FROM flights")]);
    let executor = HangingExecutor;
    let token = CancellationToken::new();
    let policy = RetryPolicy::default().with_cancellation(token.clone());

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        })
    };

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &policy).await;
    canceller.await.unwrap();

    assert!(!outcome.ok);
    assert_eq!(outcome.error.as_deref(), Some(CANCELLED_MESSAGE));
    assert!(outcome.attempts.is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let provider = ScriptedProvider::new([gen_reply("SELECT 1")]);
    let executor = ScriptedExecutor::new([Ok(rows(1))]);
    let token = CancellationToken::new();
    token.cancel();
    let policy = RetryPolicy::default().with_cancellation(token);

    let outcome = execute_with_retries(&provider, &executor, "q", &schema(), &policy).await;

    assert_eq!(outcome.error.as_deref(), Some(CANCELLED_MESSAGE));
    assert!(executor.ran().is_empty());
}
