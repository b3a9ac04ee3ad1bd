//! Schema Introspection
//!
//! Builds the schema-context object handed to the model when no external
//! schema service is configured:
//!
//! ```json
//! {
//!   "tables": { "flights": { "kind": "table", "columns": [ ... ] } },
//!   "foreign_keys": [ { "table": "flights", "column": "origin", ... } ]
//! }
//! ```

use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{ExecutorError, ExecutorResult};
use crate::sqlite::SqliteExecutor;

impl SqliteExecutor {
    /// Introspect tables, views, columns and foreign keys.
    pub async fn describe_schema(&self) -> ExecutorResult<Value> {
        let pool = self.pool().clone();

        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            describe(&conn)
        })
        .await
        .map_err(|e| ExecutorError::Join(e.to_string()))?
    }
}

fn describe(conn: &Connection) -> ExecutorResult<Value> {
    let mut stmt = conn.prepare(
        "SELECT name, type FROM sqlite_master
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let objects = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut tables = Map::new();
    let mut foreign_keys = Vec::new();

    for (name, kind) in &objects {
        let mut col_stmt = conn.prepare(
            "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let columns = col_stmt
            .query_map([name], |row| {
                Ok(json!({
                    "name": row.get::<_, String>(0)?,
                    "type": row.get::<_, String>(1)?,
                    "nullable": row.get::<_, i64>(2)? == 0,
                    "primary_key": row.get::<_, i64>(3)? > 0,
                }))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        tables.insert(name.clone(), json!({ "kind": kind, "columns": columns }));

        let mut fk_stmt = conn.prepare(
            "SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )?;
        let fks = fk_stmt.query_map([name], |row| {
            Ok(json!({
                "table": name,
                "column": row.get::<_, String>(0)?,
                "references_table": row.get::<_, String>(1)?,
                "references_column": row.get::<_, Option<String>>(2)?,
            }))
        })?;
        for fk in fks {
            foreign_keys.push(fk?);
        }
    }

    debug!(tables = tables.len(), foreign_keys = foreign_keys.len(), "schema introspected");

    Ok(json!({ "tables": tables, "foreign_keys": foreign_keys }))
}
