use serde::Serialize;
use serde_json::{Map, Value};

/// Canonical textual form of `value`, used to decide whether an update
/// changed anything.
///
/// Object keys are emitted in sorted order at every depth, so two payloads
/// that only differ in key order produce the same signature. Values that
/// cannot be represented as JSON map to an empty string.
pub fn signature<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_value(value)
        .map(canonicalize)
        .and_then(|v| serde_json::to_string(&v))
        .unwrap_or_default()
}

// Rebuilds objects with keys inserted in sorted order. This holds whether or
// not serde_json is built with `preserve_order`.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::signature;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let a: serde_json::Value =
            serde_json::from_str(r#"{"label":"Tea","next_fire":10,"id":"t1"}"#).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(r#"{"id":"t1","next_fire":10,"label":"Tea"}"#).unwrap();
        assert_eq!(signature(&a), signature(&b));
    }

    #[test]
    fn nested_keys_are_sorted() {
        let value = json!({"b": {"z": 1, "a": 2}, "a": [ {"y": 1, "x": 2} ]});
        assert_eq!(
            signature(&value),
            r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn list_order_is_significant() {
        assert_ne!(signature(&json!([1, 2])), signature(&json!([2, 1])));
    }

    #[test]
    fn none_and_null_agree() {
        let none: Option<String> = None;
        assert_eq!(signature(&none), "null");
    }
}
