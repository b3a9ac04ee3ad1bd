//! SQLite Query Executor
//!
//! Runs validated statements against a SQLite file through an r2d2 pool of
//! read-only connections. Each statement gets a progress-handler deadline;
//! when it fires SQLite interrupts the statement and the failure surfaces as
//! `ExecError::Timeout`. Dropping the `run` future (caller cancellation)
//! interrupts the statement still running on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use nlsql_core::{ExecError, QueryExecutor, Row};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, InterruptHandle, OpenFlags};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ExecutorError, ExecutorResult};

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// VM instructions between deadline checks.
const PROGRESS_OPS: i32 = 1_000;

const POOL_SIZE: u32 = 4;

/// Read-only SQLite executor.
#[derive(Clone)]
pub struct SqliteExecutor {
    pool: DbPool,
    path: PathBuf,
    statement_timeout: Duration,
}

impl SqliteExecutor {
    /// Open an existing database file in read-only mode.
    pub fn open(path: impl AsRef<Path>, statement_timeout: Duration) -> ExecutorResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ExecutorError::NotFound(path.display().to_string()));
        }

        let manager = SqliteConnectionManager::file(path)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_init(|conn: &mut Connection| conn.execute_batch("PRAGMA query_only = ON;"));
        let pool = Pool::builder().max_size(POOL_SIZE).build(manager)?;

        debug!(path = %path.display(), timeout_ms = statement_timeout.as_millis() as u64, "sqlite executor opened");

        Ok(Self {
            pool,
            path: path.to_path_buf(),
            statement_timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}

// ── Cancellation ───────────────────────────────────────────────────────

#[derive(Default)]
struct InterruptSlot {
    handle: Option<InterruptHandle>,
    abandoned: bool,
}

/// Interrupts the in-flight statement when the awaiting future is dropped.
///
/// The handle is only held while the statement runs, so a late drop never
/// interrupts a connection already back in the pool.
struct InterruptOnDrop {
    slot: Arc<Mutex<InterruptSlot>>,
}

impl InterruptOnDrop {
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(InterruptSlot::default())),
        }
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.abandoned = true;
            if let Some(handle) = slot.handle.take() {
                debug!("caller went away, interrupting sqlite statement");
                handle.interrupt();
            }
        }
    }
}

fn cancelled() -> ExecError {
    ExecError::database("statement cancelled by caller", None)
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    async fn run(&self, sql: &str, limit: usize) -> Result<Vec<Row>, ExecError> {
        let pool = self.pool.clone();
        let sql = sql.to_string();
        let timeout = self.statement_timeout;
        let guard = InterruptOnDrop::new();
        let slot = Arc::clone(&guard.slot);

        let rows = tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| ExecError::database(format!("Failed to get connection: {}", e), None))?;
            {
                let mut slot = slot.lock().map_err(|_| cancelled())?;
                if slot.abandoned {
                    return Err(cancelled());
                }
                slot.handle = Some(conn.get_interrupt_handle());
            }
            let result = query_rows(&conn, &sql, limit, timeout);
            if let Ok(mut slot) = slot.lock() {
                slot.handle = None;
            }
            result
        })
        .await
        .map_err(|e| ExecError::database(format!("Query task failed: {}", e), None))??;

        drop(guard);
        debug!(rows = rows.len(), limit, "sqlite statement completed");
        Ok(rows)
    }
}

fn query_rows(
    conn: &Connection,
    sql: &str,
    limit: usize,
    timeout: Duration,
) -> Result<Vec<Row>, ExecError> {
    let deadline = Instant::now() + timeout;
    conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));
    let result = collect_rows(conn, sql, limit);
    conn.progress_handler(0, None::<fn() -> bool>);

    result.map_err(|e| map_error(e, timeout))
}

fn collect_rows(conn: &Connection, sql: &str, limit: usize) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([])?;

    let mut out = Vec::new();
    while out.len() < limit {
        let Some(row) = rows.next()? else {
            break;
        };
        let mut record = Row::new();
        for (i, name) in columns.iter().enumerate() {
            record.insert(name.clone(), to_json(row.get_ref(i)?));
        }
        out.push(record);
    }
    Ok(out)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(STANDARD.encode(bytes)),
    }
}

fn map_error(err: rusqlite::Error, timeout: Duration) -> ExecError {
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = &err {
        if ffi_err.code == ErrorCode::OperationInterrupted {
            warn!(timeout_ms = timeout.as_millis() as u64, "sqlite statement interrupted");
            return ExecError::timeout(format!(
                "canceling statement due to statement timeout ({} ms)",
                timeout.as_millis()
            ));
        }
    }

    let constraint = matches!(
        &err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    );
    let message = err.to_string();
    let code = if constraint {
        Some("23000")
    } else {
        sqlstate_for(&message)
    };
    ExecError::database(message, code.map(str::to_string))
}

/// Map SQLite error text to the closest SQLSTATE code.
pub fn sqlstate_for(message: &str) -> Option<&'static str> {
    let m = message.to_lowercase();
    if m.contains("no such table") {
        Some("42P01")
    } else if m.contains("no such column") {
        Some("42703")
    } else if m.contains("ambiguous column name") {
        Some("42702")
    } else if m.contains("no such function") || m.contains("wrong number of arguments") {
        Some("42883")
    } else if m.contains("syntax error") || m.contains("incomplete input") {
        Some("42601")
    } else if m.contains("datatype mismatch") {
        Some("22000")
    } else if m.contains("constraint failed") {
        Some("23000")
    } else {
        None
    }
}
