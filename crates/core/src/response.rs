//! Model Response Parsing
//!
//! Best-effort salvage of a JSON object from raw model output. Markdown fences
//! and surrounding chatter are cut away; anything that is still not valid JSON
//! is left for the strict decode that follows to reject.

use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};

/// Extract the text believed to be a single JSON object.
///
/// A leading triple-backtick fence is stripped together with the last fence.
/// Then the span from the first `{` to the last `}` is returned when both
/// exist in that order; otherwise the (trimmed) text is returned unchanged.
pub fn extract_json(text: &str) -> &str {
    let mut text = text.trim();

    if let Some(after_open) = text.strip_prefix("```") {
        text = match after_open.rfind("```") {
            Some(end) => &after_open[..end],
            None => after_open,
        };
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text.trim(),
    }
}

/// Extract and strictly decode a JSON object from model output.
pub fn parse_json_object(text: &str) -> CoreResult<Map<String, Value>> {
    let clean = extract_json(text);
    match serde_json::from_str::<Value>(clean)? {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::parse(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Ordered fallback lookup: the first key holding a non-empty string wins.
pub fn first_string_field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| object.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
