//! Field-level diffing between snapshot payloads.

use std::collections::BTreeSet;

use serde_json::Value as JsonValue;

use crate::models::{FieldChange, SnapshotDiff};

/// Compare two payloads field by field at the top level.
///
/// Fields equal in both are omitted. A field missing on one side appears
/// with that side as `None`, which serializes to `null`.
pub fn diff_payloads(from: &JsonValue, to: &JsonValue) -> SnapshotDiff {
    let empty = serde_json::Map::new();
    let from_map = from.as_object().unwrap_or(&empty);
    let to_map = to.as_object().unwrap_or(&empty);

    let keys: BTreeSet<&String> = from_map.keys().chain(to_map.keys()).collect();

    let mut diff = SnapshotDiff::new();
    for key in keys {
        let before = from_map.get(key);
        let after = to_map.get(key);
        if before == after {
            continue;
        }
        diff.insert(
            key.clone(),
            FieldChange {
                from: before.cloned(),
                to: after.cloned(),
            },
        );
    }
    diff
}

/// Apply a diff to a payload, producing the other side.
///
/// `apply_changes(a, diff_payloads(a, b)) == b` for object payloads.
pub fn apply_changes(payload: &JsonValue, diff: &SnapshotDiff) -> JsonValue {
    let mut map = payload.as_object().cloned().unwrap_or_default();
    for (field, change) in diff {
        match &change.to {
            Some(value) => {
                map.insert(field.clone(), value.clone());
            }
            None => {
                map.remove(field);
            }
        }
    }
    JsonValue::Object(map)
}

/// Remove the volatile top-level keys from a payload.
pub fn strip_volatile(payload: &JsonValue, volatile_fields: &[String]) -> JsonValue {
    let Some(map) = payload.as_object() else {
        return payload.clone();
    };
    let mut stripped = map.clone();
    for field in volatile_fields {
        stripped.remove(field);
    }
    JsonValue::Object(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_fields_are_omitted() {
        let a = json!({"number": "100", "name": "Bolt", "weight": 4});
        let b = json!({"number": "100", "name": "Bolt", "weight": 5});
        let diff = diff_payloads(&a, &b);
        assert_eq!(diff.len(), 1);
        let change = &diff["weight"];
        assert_eq!(change.from, Some(json!(4)));
        assert_eq!(change.to, Some(json!(5)));
    }

    #[test]
    fn one_sided_fields_show_null_on_the_missing_side() {
        let a = json!({"number": "100", "legacy_code": "L9"});
        let b = json!({"number": "100", "color": "red"});
        let diff = diff_payloads(&a, &b);
        assert_eq!(diff["legacy_code"].to, None);
        assert_eq!(diff["color"].from, None);
        assert_eq!(diff["color"].to, Some(json!("red")));
    }

    #[test]
    fn apply_round_trip_reproduces_the_target() {
        let a = json!({"number": "100", "name": "Bolt", "legacy_code": "L9"});
        let b = json!({"number": "100", "name": "Bolt Mk2", "color": "red"});
        let diff = diff_payloads(&a, &b);
        assert_eq!(apply_changes(&a, &diff), b);
    }

    #[test]
    fn identical_payloads_produce_an_empty_diff() {
        let a = json!({"number": "100", "name": "Bolt"});
        assert!(diff_payloads(&a, &a).is_empty());
    }

    #[test]
    fn strip_volatile_removes_only_listed_keys() {
        let payload = json!({"number": "100", "date_modified": "2026-01-02", "name": "Bolt"});
        let stripped = strip_volatile(&payload, &["date_modified".to_string()]);
        assert_eq!(stripped, json!({"number": "100", "name": "Bolt"}));
    }
}
