//! Recursive merge of configuration layers.
//!
//! Rules, applied per key of the override layer:
//! - key absent (or `null`) in the base: insert the override value
//! - both values are objects: merge recursively
//! - both values are arrays: base items followed by override items
//! - anything else: the override value replaces the base value

use serde_json::{Map, Value};
use tracing::trace;

/// Merge `overrides` on top of `base`, returning a new tree.
///
/// Neither input is modified. Non-object inputs are treated as the whole
/// value: the override wins unless it is an empty object.
pub fn merge_configs(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (Value::Object(b), Value::Object(o)) => Value::Object(merge_maps(b, o, None)),
        (_, Value::Object(o)) if o.is_empty() => base.clone(),
        _ => overrides.clone(),
    }
}

fn merge_maps(base: &Map<String, Value>, overrides: &Map<String, Value>, parent: Option<&str>) -> Map<String, Value> {
    let mut merged = base.clone();

    for (key, value) in overrides {
        let nested_name = match parent {
            Some(p) => format!("{}.{}", p, key),
            None => key.clone(),
        };

        if merged.get(key).is_none_or(Value::is_null) {
            merged.insert(key.clone(), value.clone());
            continue;
        }
        let Some(slot) = merged.get_mut(key) else {
            continue;
        };

        match (slot, value) {
            (Value::Object(b), Value::Object(o)) => {
                let inner = merge_maps(b, o, Some(nested_name.as_str()));
                *b = inner;
            }
            (Value::Array(b), Value::Array(o)) => {
                trace!(key = %nested_name, added = o.len(), "extending list");
                b.extend(o.iter().cloned());
            }
            (slot, value) => {
                trace!(key = %nested_name, "overriding value");
                *slot = value.clone();
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn empty_layers_are_identity() {
        assert_eq!(merge_configs(&json!({}), &json!({})), json!({}));

        let config = json!({"a": 1, "b": "c", "d": ["a", "b", "c"]});
        let before = config.clone();
        assert_eq!(merge_configs(&config, &json!({})), config);
        assert_eq!(merge_configs(&json!({}), &config), config);
        assert_eq!(config, before);
    }

    #[test]
    fn lists_concatenate_in_order() {
        let base = json!({"l": ["a"]});
        let overrides = json!({"l": ["b"]});
        let out = merge_configs(&base, &overrides);
        assert_eq!(out, json!({"l": ["a", "b"]}));
        assert_eq!(base, json!({"l": ["a"]}));
        assert_eq!(overrides, json!({"l": ["b"]}));

        let out = merge_configs(&json!({"l": ["a", "b"]}), &json!({"l": ["b"]}));
        assert_eq!(out, json!({"l": ["a", "b", "b"]}));
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let out = merge_configs(&json!({"d": {"a": 1}}), &json!({"d": {"b": 2}}));
        assert_eq!(out, json!({"d": {"a": 1, "b": 2}}));

        let base = json!({"d": {"a": ["b"], "c": 1, "d": {}}});
        let overrides = json!({"d": {"a": [1], "d": {"a": 2}}, "l": []});
        let out = merge_configs(&base, &overrides);
        assert_eq!(out, json!({"l": [], "d": {"a": ["b", 1], "c": 1, "d": {"a": 2}}}));
    }

    #[test]
    fn scalars_take_the_rightmost_layer() {
        let defaults = json!({"x": 1, "data": {"session": null, "include": ["a"]}});
        let file = json!({"x": 2, "data": {"session": 0, "include": ["b"]}});
        let cli = json!({"x": 3, "data": {"include": ["c"]}});

        let out = merge_configs(&merge_configs(&defaults, &file), &cli);
        assert_eq!(out, json!({"x": 3, "data": {"session": 0, "include": ["a", "b", "c"]}}));
    }

    #[test]
    fn null_base_values_are_replaced() {
        let out = merge_configs(&json!({"output_path": null}), &json!({"output_path": "out.html"}));
        assert_eq!(out, json!({"output_path": "out.html"}));

        let out = merge_configs(&json!({"csv_path": null}), &json!({"csv_path": ["a.csv"]}));
        assert_eq!(out, json!({"csv_path": ["a.csv"]}));
    }

    #[test]
    fn mismatched_shapes_override() {
        let out = merge_configs(&json!({"y": ["a"]}), &json!({"y": "b"}));
        assert_eq!(out, json!({"y": "b"}));
    }
}
