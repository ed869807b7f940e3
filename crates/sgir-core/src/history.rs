//! Helpers for building audit entries.

use serde_json::{Map, Value};

/// Reduces two JSON objects to the fields that differ.
///
/// Keys missing on one side are reported as `null` on that side. Non-object
/// inputs are returned unchanged.
///
/// ## Example
/// ```rust
/// use serde_json::json;
/// use sgir_core::history::changed_fields;
///
/// let (before, after) = changed_fields(
///     &json!({"tip": 0, "total_final": 2000, "state": "created"}),
///     &json!({"tip": 150, "total_final": 2150, "state": "created"}),
/// );
/// assert_eq!(before, json!({"tip": 0, "total_final": 2000}));
/// assert_eq!(after, json!({"tip": 150, "total_final": 2150}));
/// ```
pub fn changed_fields(before: &Value, after: &Value) -> (Value, Value) {
    let (Some(b), Some(a)) = (before.as_object(), after.as_object()) else {
        return (before.clone(), after.clone());
    };

    let mut out_before = Map::new();
    let mut out_after = Map::new();

    for (key, old) in b {
        let new = a.get(key).unwrap_or(&Value::Null);
        if old != new {
            out_before.insert(key.clone(), old.clone());
            out_after.insert(key.clone(), new.clone());
        }
    }
    for (key, new) in a {
        if !b.contains_key(key) {
            out_before.insert(key.clone(), Value::Null);
            out_after.insert(key.clone(), new.clone());
        }
    }

    (Value::Object(out_before), Value::Object(out_after))
}
