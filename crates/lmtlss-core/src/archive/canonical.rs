//! Canonical JSON serialization.
//!
//! Produces compact JSON with object keys sorted lexicographically at every
//! nesting level. This is required for deterministic event hashing — the
//! same logical payload must always produce the same byte sequence.
//!
//! Rules:
//! - Compact: no whitespace between tokens.
//! - Object keys sorted lexicographically (recursive at every depth).
//! - Arrays preserve element order.
//! - Numbers, strings, booleans, and null serialized normally.

use serde_json::Value;

/// Produce a canonical JSON string from a [`serde_json::Value`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use lmtlss_core::archive::canonical::canonicalize_json;
///
/// let val = json!({"z": 1, "a": {"c": 3, "b": 2}});
/// assert_eq!(canonicalize_json(&val), r#"{"a":{"b":2,"c":3},"z":1}"#);
/// ```
#[must_use]
pub fn canonicalize_json(value: &Value) -> String {
    let mut buf = String::new();
    write_canonical(value, &mut buf);
    buf
}

/// Produce canonical JSON from a JSON string.
///
/// # Errors
///
/// Returns `serde_json::Error` if the input string is not valid JSON.
pub fn canonicalize_json_str(json: &str) -> Result<String, serde_json::Error> {
    let value: Value = serde_json::from_str(json)?;
    Ok(canonicalize_json(&value))
}

fn write_canonical(value: &Value, buf: &mut String) {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => buf.push_str(&n.to_string()),
        Value::String(s) => {
            buf.push_str(&serde_json::to_string(s).expect("string serialization cannot fail"));
        }
        Value::Array(arr) => {
            buf.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_canonical(item, buf);
            }
            buf.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            buf.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                buf.push_str(
                    &serde_json::to_string(key).expect("string serialization cannot fail"),
                );
                buf.push(':');
                if let Some(val) = map.get(*key) {
                    write_canonical(val, buf);
                }
            }
            buf.push('}');
        }
    }
}
