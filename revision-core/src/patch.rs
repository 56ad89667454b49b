use serde_json::{Map, Value};

/// Replace every `.` in a top-level key with `|` so the patch can be stored
/// as a flat revision payload without colliding with a store's own dotted-path
/// update syntax.
pub fn escape_keys(patch: &Value) -> Value {
    match patch {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.replace('.', "|"), v.clone());
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Inverse of [`escape_keys`]: restore `|` to `.` so the patch can be applied
/// as a dotted-path `$set`.
pub fn unescape_keys(patch: &Value) -> Value {
    match patch {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.replace('|', "."), v.clone());
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Turn an unescaped, dotted-key object into `(path, value)` pairs ready to
/// hand to a store adapter's `patch` as nested `$set`s.
pub fn flatten_to_set_pairs(patch: &Value) -> Vec<(String, Value)> {
    match patch {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => Vec::new(),
    }
}

/// Apply a single dotted path as a `$set`, creating intermediate objects as
/// needed. Non-object nodes encountered along the path are overwritten.
pub fn set_path(doc: &mut Value, path: &str, value: Value) {
    let mut cursor = doc;
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        let map = cursor.as_object_mut().expect("just normalized to an object");
        if i == segments.len() - 1 {
            map.insert((*segment).to_string(), value);
            return;
        }
        cursor = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Apply a batch of dotted-path `$set` pairs in order.
pub fn apply_set(doc: &mut Value, pairs: &[(String, Value)]) {
    for (path, value) in pairs {
        set_path(doc, path, value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escape_then_unescape_round_trips_dotted_keys() {
        let patch = json!({"patch.baz": true, "plain": 1});
        let stored = escape_keys(&patch);
        assert_eq!(stored, json!({"patch|baz": true, "plain": 1}));
        assert_eq!(unescape_keys(&stored), patch);
    }

    #[test]
    fn set_path_creates_intermediate_objects() {
        let mut doc = json!({"patch": {"foo": "bar"}});
        set_path(&mut doc, "patch.baz", json!(true));
        assert_eq!(doc, json!({"patch": {"foo": "bar", "baz": true}}));
    }

    #[test]
    fn set_path_creates_missing_branches_from_scratch() {
        let mut doc = json!({});
        set_path(&mut doc, "a.b.c", json!(1));
        assert_eq!(doc, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn apply_set_runs_pairs_in_order() {
        let mut doc = json!({"x": 1});
        apply_set(&mut doc, &[("x".to_string(), json!(2)), ("y".to_string(), json!(3))]);
        assert_eq!(doc, json!({"x": 2, "y": 3}));
    }
}
