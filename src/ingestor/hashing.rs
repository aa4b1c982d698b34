//! Content hashing for snapshot payloads.
//!
//! Two payloads hash equal iff they are structurally equal, independent of
//! key order in the source JSON. Canonical form is recursive key-sorted
//! JSON with no insignificant whitespace and serde_json's default number
//! formatting.

use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};

/// SHA-256 of the canonicalized payload, as lowercase hex.
pub fn content_hash(payload: &JsonValue) -> String {
    let canonical = canonicalize(payload);
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Rebuild the value with every object's keys in sorted order, recursively.
///
/// serde_json::Map preserves insertion order by default, so inserting keys
/// in sorted order yields deterministic serialization.
pub fn canonicalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            JsonValue::Object(sorted)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
