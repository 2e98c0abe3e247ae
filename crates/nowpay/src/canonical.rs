//! Canonical JSON encoding for the `Canonical` signature mode.
//!
//! Only used when the sender is known to sign a key-sorted, whitespace-free
//! re-encoding of the payload. The default verifier never touches this path:
//! re-encoding may rewrite number text (`1e-7` vs `0.0000001`) and key order,
//! which breaks signatures computed over the raw bytes.

use serde_json::{Map, Value};

/// Return a copy of `value` with every object's keys in ascending byte order,
/// at every depth. Arrays keep their element order; scalars are untouched.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

            let mut sorted = Map::with_capacity(entries.len());
            for (key, child) in entries {
                sorted.insert(key.clone(), canonicalize(child));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        scalar => scalar.clone(),
    }
}

/// Canonicalize and encode as compact JSON (no insignificant whitespace).
pub fn encode(value: &Value) -> Vec<u8> {
    // Serializing a `Value` cannot fail: keys are always strings.
    serde_json::to_vec(&canonicalize(value)).unwrap_or_default()
}

/// True if every object in the tree already has sorted keys.
pub fn is_canonical(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            let keys: Vec<&String> = map.keys().collect();
            keys.windows(2)
                .all(|w| w[0].as_bytes() <= w[1].as_bytes())
                && map.values().all(is_canonical)
        }
        Value::Array(items) => items.iter().all(is_canonical),
        _ => true,
    }
}
