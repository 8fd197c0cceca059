//! Loose value semantics shared by argument resolution and branch matching.
//!
//! Step authors think of context and accumulator entries the way a dynamic
//! language does: a property only "counts" when it holds a truthy value, and a
//! pattern matches a record when every attribute it names is present with an
//! equal value. These helpers pin those rules down for `serde_json::Value`.

use serde_json::{Map as JsonMap, Value};

/// Returns `true` when the value would be considered truthy.
///
/// `null`, `false`, `0`, `NaN` and the empty string are falsy; everything
/// else, including empty arrays and objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Returns the entry stored under `key` only when it is truthy.
pub fn truthy_entry<'a>(map: &'a JsonMap<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|value| is_truthy(value))
}

/// Attribute-subset match: every key of `pattern` must exist in `target` with
/// a matching value. Nested objects match recursively by the same rule; all
/// other values must be equal.
pub fn matches_attributes(pattern: &JsonMap<String, Value>, target: &JsonMap<String, Value>) -> bool {
    pattern.iter().all(|(key, expected)| match target.get(key) {
        Some(actual) => value_matches(expected, actual),
        None => false,
    })
}

fn value_matches(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(expected_map), Value::Object(actual_map)) => matches_attributes(expected_map, actual_map),
        _ => expected == actual,
    }
}
