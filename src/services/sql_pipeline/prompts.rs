//! Prompt Templates
//!
//! System instructions and user-message layouts for the generation, repair
//! and query-analysis model calls.

use serde_json::Value;

pub const SQL_GENERATOR_PROMPT: &str = r#"You translate a natural language data request into ONE read-only SQL query.

Return STRICT JSON only:

{
  "sql": "the full query",
  "explanation": "one sentence on what the query returns",
  "tables_used": ["table", "..."]
}

Rules:
- Produce ONLY a SELECT or WITH query. Never modify data or schema.
- Use only tables and columns present in schema_context.
- Quote schema-qualified names as "schema"."table", never as "schema.table".
- Prefer explicit column lists over SELECT *.
- Filter as early as possible; the result preview is capped at a few rows.
- No markdown. No comments. JSON only."#;

pub const SQL_FIXER_PROMPT: &str = r#"You repair a read-only SQL query that failed against the database.

You receive the original request, the schema context, the failing query, the
database error and a history of earlier failed attempts. Rewrite the query so
it runs and still answers the request.

Return STRICT JSON only:

{
  "sql": "the corrected query",
  "fix_notes": "what was changed and why it failed before"
}

No markdown. No comments. JSON only."#;

pub const QUERY_ANALYZER_PROMPT: &str = r#"You extract structured intent from a natural language data request
to support SQL schema retrieval.

Return STRICT JSON only:

{
  "intent": "schedule | list | aggregation | stats | detail | comparison | unknown",
  "entities": [
    {
      "type": "entity | attribute | identifier | temporal | metric | filter_value | table",
      "value": "...",
      "aliases": ["...", "..."],
      "confidence": 0.0-1.0
    }
  ],
  "time_range": {
    "type": "none | relative | absolute",
    "from": null,
    "to": null,
    "raw": "original text"
  },
  "metrics": {
    "type": "none | count | sum | avg | min | max | top_n",
    "value": null,
    "dimension": null
  },
  "keywords": ["important domain keywords"],
  "search_queries": [
    "short semantic query for schema search"
  ]
}

Rules:
- Generate 1 search_queries entry.
- search_queries must be short, schema-oriented, and include
  possible column or table names.
- No markdown. No comments. JSON only."#;

/// User message for the initial synthesis call.
pub fn generation_message(user_text: &str, schema_context: &Value) -> String {
    format!(
        "User request:\n{}\n\nschema_context:\n{}",
        user_text, schema_context
    )
}

/// Inputs rendered into the repair user message.
pub struct RepairPromptParts<'a> {
    pub user_text: &'a str,
    pub schema_context: &'a Value,
    pub prev_sql: &'a str,
    pub error_text: &'a str,
    pub attempts_summary: &'a str,
    pub attempts_transcript: &'a str,
}

/// User message for a repair call.
pub fn repair_message(parts: &RepairPromptParts<'_>) -> String {
    format!(
        "User request:\n{user}\n\n\
         Schema context (JSON):\n{schema}\n\n\
         Previous SQL (the one that failed):\n{sql}\n\n\
         Database error:\n{error}\n\n\
         Previous attempts summary (most recent last):\n{summary}\n\n\
         Previous attempts transcript (last N attempts):\n{transcript}\n\n\
         Fix instructions:\n\
         - Do NOT repeat the same mistakes seen in previous attempts.\n\
         - Output STRICT JSON only (no markdown, no commentary outside JSON).\n\
         - Produce ONLY SELECT or WITH query.\n\
         - If you see timeouts in attempts, make the query more selective:\n  \
         add filters, reduce joins, narrow time range, pre-aggregate, avoid full scans.\n\
         - Keep aliases consistent and use only tables/columns that exist in schema context.\n\
         Return JSON with at least keys: sql, fix_notes.\n",
        user = parts.user_text,
        schema = parts.schema_context,
        sql = parts.prev_sql,
        error = parts.error_text,
        summary = parts.attempts_summary,
        transcript = parts.attempts_transcript,
    )
}
