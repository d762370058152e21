//! JSON parsing helpers for AI backend responses
//!
//! Models asked for JSON still wrap it in code fences or add a sentence before
//! or after the payload. These helpers recover the JSON value and normalize it
//! before schema validation.

use serde_json::Value;

use crate::error::{Error, Result};

/// Maximum raw response length echoed back in error messages
const RAW_PREVIEW_LEN: usize = 200;

/// Extract a JSON value from a model response
///
/// Accepts a bare JSON document, a fenced ```json block, or an object/array
/// embedded in surrounding text.
pub fn extract_json(response: &str) -> Result<Value> {
    let response = strip_code_fence(response.trim());

    if let Ok(value) = serde_json::from_str::<Value>(response) {
        return Ok(value);
    }

    let start = response.find(['{', '[']);
    let end = response.rfind(['}', ']']);

    match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &response[s..=e];
            serde_json::from_str(json_str).map_err(|e| {
                Error::InvalidData(format!(
                    "Invalid JSON from AI: {} | Raw: {}",
                    e,
                    truncate(json_str)
                ))
            })
        }
        _ => Err(Error::InvalidData(format!(
            "No JSON found in AI response | Raw: {}",
            truncate(response)
        ))),
    }
}

/// Strip a surrounding markdown code fence, if any
fn strip_code_fence(response: &str) -> &str {
    let Some(rest) = response.strip_prefix("```") else {
        return response;
    };
    // Drop the info string (```json)
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Shorten a raw response for inclusion in an error message
pub fn truncate(raw: &str) -> String {
    if raw.chars().count() > RAW_PREVIEW_LEN {
        let head: String = raw.chars().take(RAW_PREVIEW_LEN).collect();
        format!("{}...", head)
    } else {
        raw.to_string()
    }
}

/// Normalize model JSON before it is validated against a schema
///
/// - object keys whose value is `null` are removed, so they read as missing
///   and pick up the decoder's defaults
/// - empty objects inside arrays are removed (models emit `[{}]` for "none")
pub fn normalize_json(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, normalize_json(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|item| !is_placeholder(item))
                .map(normalize_json)
                .collect(),
        ),
        other => other,
    }
}

fn is_placeholder(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}
