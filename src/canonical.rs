//! Deterministic JSON text and SHA-256 digests.
//!
//! Two structurally equal documents always canonicalize to the same bytes,
//! whatever their key order, so their digests match. This is what makes a
//! frozen protocol's hash reproducible.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compact JSON text with object keys in ascending order at every depth.
///
/// Arrays keep their element order. Non-ASCII text is written as-is, not
/// escaped.
///
/// ```
/// use protocol_wizard::canonical::canonicalize;
/// use serde_json::json;
///
/// let doc = json!({"b": [2, 1], "a": {"y": "é", "x": null}});
/// assert_eq!(canonicalize(&doc), r#"{"a":{"x":null,"y":"é"},"b":[2,1]}"#);
/// ```
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::String(s) => write_string(out, s),
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_string(out: &mut String, s: &str) {
    // Display for a string Value is its quoted, escaped JSON form.
    out.push_str(&Value::String(s.to_string()).to_string());
}

/// SHA-256 of the UTF-8 bytes of `text`, as 64 lowercase hex characters.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Deep copy of `value` with every object's keys in ascending order.
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        scalar => scalar.clone(),
    }
}

/// `sha256_hex(canonicalize(value))`.
pub fn fingerprint(value: &Value) -> String {
    sha256_hex(&canonicalize(value))
}
