//! Cleanup and parsing of raw model output.
//!
//! Models wrap JSON in markdown fences, emit JSON-Lines when asked for an
//! array (or an array when asked for JSON-Lines), and mix in junk lines.
//! Everything here is defensive: [`strip_formatting`] and
//! [`normalize_records`] never fail, and [`parse_object`] reports a typed
//! [`ParseError`] instead of panicking.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Fence markers, longest first so `` ```jsonl `` never leaves a stray `l`.
const FENCE_MARKERS: [&str; 3] = ["```jsonl", "```json", "```"];

/// Errors returned when model output cannot be read as the expected shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// The response was empty or whitespace-only after cleanup.
    #[error("empty LLM response")]
    EmptyResponse,

    /// The text is not valid JSON.
    #[error("invalid JSON: {reason}")]
    InvalidJson {
        /// The serde error message.
        reason: String,
        /// A truncated copy of the cleaned text (max 200 chars).
        text: String,
    },

    /// Valid JSON, but not a single object.
    #[error("expected a JSON object, got {found}")]
    NotAnObject {
        /// JSON type that was found instead.
        found: &'static str,
    },

    /// The object failed to deserialize into the target type.
    #[error("JSON deserialization failed: {reason}")]
    DeserializationFailed {
        /// The serde error message.
        reason: String,
    },
}

/// Remove markdown code-fence markers anywhere in `text`, then trim.
///
/// Removal repeats until no marker is left, so the result never contains a
/// marker and `strip_formatting(strip_formatting(t)) == strip_formatting(t)`.
///
/// ```
/// use protocol_wizard::normalize::strip_formatting;
///
/// assert_eq!(strip_formatting("```json\n{\"a\":1}\n```"), "{\"a\":1}");
/// assert_eq!(strip_formatting("```jsonl\n{}\n```"), "{}");
/// ```
pub fn strip_formatting(text: &str) -> String {
    let mut cleaned = text.to_string();
    loop {
        let before = cleaned.len();
        for marker in FENCE_MARKERS {
            if cleaned.contains(marker) {
                cleaned = cleaned.replace(marker, "");
            }
        }
        if cleaned.len() == before {
            break;
        }
    }
    cleaned.trim().to_string()
}

/// Read model output as a list of JSON objects.
///
/// After [`strip_formatting`], a text that parses as a JSON array yields its
/// object elements (other elements are dropped). Otherwise the text is read
/// as JSON-Lines: each non-blank line that parses as an object is kept,
/// everything else is skipped. Never fails; the result may be empty.
pub fn normalize_records(text: &str) -> Vec<Map<String, Value>> {
    let cleaned = strip_formatting(text);

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&cleaned) {
        return items.into_iter().filter_map(into_object).collect();
    }

    cleaned
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(into_object)
        .collect()
}

/// Read model output as exactly one JSON object.
pub fn parse_object(text: &str) -> Result<Map<String, Value>, ParseError> {
    let cleaned = strip_formatting(text);
    if cleaned.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    let value: Value = serde_json::from_str(&cleaned).map_err(|e| ParseError::InvalidJson {
        reason: e.to_string(),
        text: truncate(&cleaned, 200),
    })?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(ParseError::NotAnObject {
            found: json_type(&other),
        }),
    }
}

/// [`parse_object`], then deserialize into `T`.
pub fn parse_as<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let map = parse_object(text)?;
    serde_json::from_value(Value::Object(map)).map_err(|e| ParseError::DeserializationFailed {
        reason: e.to_string(),
    })
}

fn into_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Truncate to at most `max_chars` characters, appending "..." if truncated.
fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
