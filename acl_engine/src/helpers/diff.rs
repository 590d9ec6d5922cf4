use serde_json::{json, Map, Value};

/// Computes the field-level difference between two entity snapshots for the audit log.
///
/// Returns a JSON object mapping each changed top-level field to `{"from": .., "to": ..}`.
/// Fields present on only one side diff against `null`.
pub fn field_diff(before: &Value, after: &Value) -> Value {
    let empty = Map::new();
    let before_map = before.as_object().unwrap_or(&empty);
    let after_map = after.as_object().unwrap_or(&empty);

    let mut changes = Map::new();
    for (key, old) in before_map {
        let new = after_map.get(key).unwrap_or(&Value::Null);
        if old != new {
            changes.insert(key.clone(), json!({ "from": old, "to": new }));
        }
    }
    for (key, new) in after_map {
        if !before_map.contains_key(key) && !new.is_null() {
            changes.insert(key.clone(), json!({ "from": Value::Null, "to": new }));
        }
    }
    Value::Object(changes)
}
