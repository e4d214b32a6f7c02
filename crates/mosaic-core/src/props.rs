//! Plain key/value props handed to fragments.

use serde_json::Value;

/// Props are an arbitrary JSON tree.
pub type Props = Value;

/// Deep-merge `overrides` on top of `base`.
///
/// Objects merge key by key, recursively. Any other override value replaces
/// the base value, arrays included. A `null` override never erases a base
/// value, so an absent route-level props block leaves descriptor defaults
/// untouched.
pub fn deep_merge(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (_, Value::Null) => base.clone(),
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in override_map {
                let next = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => overrides.clone(),
    }
}

/// Structural equality of two props trees. Object key order is irrelevant.
pub fn props_equal(a: &Value, b: &Value) -> bool {
    a == b
}
