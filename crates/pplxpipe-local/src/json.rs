//! Tolerant accessors over untyped JSON.
//!
//! Every accessor returns `None` (or an empty list) when a field is missing or has the wrong
//! shape. Nothing here errors or panics on backend input.

use serde_json::{Map, Value};

pub type Object = Map<String, Value>;

pub fn parse(input: &str) -> Option<Value> {
    serde_json::from_str(input).ok()
}

pub fn parse_object(input: &str) -> Option<Object> {
    match parse(input)? {
        Value::Object(m) => Some(m),
        _ => None,
    }
}

pub trait FieldExt {
    fn str_field(&self, key: &str) -> Option<&str>;
    fn non_empty_str_field(&self, key: &str) -> Option<&str>;
    fn list_field(&self, key: &str) -> Option<&Vec<Value>>;
    fn object_field(&self, key: &str) -> Option<&Object>;
}

impl FieldExt for Object {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn non_empty_str_field(&self, key: &str) -> Option<&str> {
        self.str_field(key).filter(|s| !s.trim().is_empty())
    }

    fn list_field(&self, key: &str) -> Option<&Vec<Value>> {
        self.get(key).and_then(Value::as_array)
    }

    fn object_field(&self, key: &str) -> Option<&Object> {
        self.get(key).and_then(Value::as_object)
    }
}

/// String entries of a list; non-string entries are skipped.
pub fn string_list(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}
