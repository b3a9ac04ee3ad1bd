//! Quoted Identifier Normalization
//!
//! Models occasionally quote a schema-qualified name as one identifier
//! (`"public.flights"`), which the database reads as a single table name
//! containing a dot. This rewrites every such occurrence into two quoted parts.

use std::sync::LazyLock;

use regex::Regex;

static SCHEMA_DOT_TABLE_IN_QUOTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)""#)
        .expect("quoted identifier pattern is valid")
});

/// Rewrite `"schema.table"` into `"schema"."table"`.
pub fn fix_quoted_schema_table(sql: &str) -> String {
    SCHEMA_DOT_TABLE_IN_QUOTES
        .replace_all(sql, r#""$1"."$2""#)
        .into_owned()
}
