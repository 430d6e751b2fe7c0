//! Legacy ordered-entry back-end.
//!
//! `{"b":1,"a":{"c":2}}` becomes `[{"a":[{"c":2}]},{"b":1}]`. Strings are
//! escaped the way the reference encoder does it, including `<`, `>`, `&`,
//! U+2028 and U+2029, so digests stay comparable with signatures created by
//! other tools.

use serde_json::{Map, Value};

use crate::error::CoreResult;

/// Convert a value into the entry representation.
pub fn to_entry_value(value: &Value) -> Value {
    match value {
        Value::Object(m) => {
            let mut keys: Vec<&String> = m.keys().collect();
            keys.sort();
            Value::Array(
                keys.into_iter()
                    .map(|k| {
                        let mut entry = Map::new();
                        entry.insert(k.clone(), to_entry_value(&m[k]));
                        Value::Object(entry)
                    })
                    .collect(),
            )
        }
        Value::Array(l) => Value::Array(l.iter().map(to_entry_value).collect()),
        other => other.clone(),
    }
}

/// Serialize a value in entry format.
pub fn to_entry_bytes(value: &Value) -> CoreResult<Vec<u8>> {
    let raw = serde_json::to_vec(&to_entry_value(value))?;
    Ok(escape_html(&raw))
}

// Only string content can contain these bytes, JSON structure is plain ASCII.
fn escape_html(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'<' => out.extend_from_slice(b"\\u003c"),
            b'>' => out.extend_from_slice(b"\\u003e"),
            b'&' => out.extend_from_slice(b"\\u0026"),
            0xE2 if raw.get(i + 1) == Some(&0x80) && matches!(raw.get(i + 2), Some(0xA8 | 0xA9)) => {
                out.extend_from_slice(if raw[i + 2] == 0xA8 {
                    b"\\u2028"
                } else {
                    b"\\u2029"
                });
                i += 3;
                continue;
            }
            b => out.push(b),
        }
        i += 1;
    }
    out
}
