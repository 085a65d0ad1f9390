//! Helpers over manifest tree nodes.
//!
//! Manifest documents are held as [`serde_json::Value`] with insertion order
//! preserved, so a document that passes through untouched serializes back
//! field for field.

use serde_json::{Map, Value};

/// Render a value the way it appears when spliced into a string.
///
/// Strings are inserted verbatim, booleans and null use the expression
/// language's spelling (`True`, `False`, `None`), and containers fall back
/// to compact JSON.
pub fn render(value: &Value) -> String {
  match value {
    Value::Null => "None".to_string(),
    Value::Bool(true) => "True".to_string(),
    Value::Bool(false) => "False".to_string(),
    Value::Number(n) => n.to_string(),
    Value::String(s) => s.clone(),
    Value::Array(_) | Value::Object(_) => value.to_string(),
  }
}

/// Truthiness used by `if`, `and`, `or` and `not`.
pub fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(a) => !a.is_empty(),
    Value::Object(o) => !o.is_empty(),
  }
}

/// Short type name used in error messages.
pub fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "None",
    Value::Bool(_) => "bool",
    Value::Number(n) if n.is_f64() => "float",
    Value::Number(_) => "int",
    Value::String(_) => "str",
    Value::Array(_) => "list",
    Value::Object(_) => "dict",
  }
}

/// Recursively sort the keys of every object in the tree.
pub fn sort_keys(value: &mut Value) {
  match value {
    Value::Object(map) => {
      let mut entries: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
      entries.sort_by(|a, b| a.0.cmp(&b.0));
      for (key, mut child) in entries {
        sort_keys(&mut child);
        map.insert(key, child);
      }
    }
    Value::Array(items) => items.iter_mut().for_each(sort_keys),
    _ => {}
  }
}

/// First object key in the tree (depth first) that starts with `prefix`.
pub fn find_key_with_prefix<'a>(value: &'a Value, prefix: &str) -> Option<&'a str> {
  match value {
    Value::Object(map) => map.iter().find_map(|(k, v)| {
      if k.starts_with(prefix) {
        Some(k.as_str())
      } else {
        find_key_with_prefix(v, prefix)
      }
    }),
    Value::Array(items) => items.iter().find_map(|v| find_key_with_prefix(v, prefix)),
    _ => None,
  }
}

/// Get `key` as an object, inserting an empty one if missing or not an object.
pub fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
  let slot = map.entry(key.to_string()).or_insert_with(|| Value::Object(Map::new()));
  if !slot.is_object() {
    *slot = Value::Object(Map::new());
  }
  match slot {
    Value::Object(inner) => inner,
    _ => unreachable!("slot was just made an object"),
  }
}
