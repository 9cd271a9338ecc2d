//! Small helpers for working with loosely-typed YAML values.
//!
//! The resolution pipeline operates on [`serde_yaml::Value`] trees until the
//! canonical object model is constructed, so a handful of shape and
//! formatting helpers are shared by every stage.

use serde_yaml::{Mapping, Value};

/// Look up a string key in a mapping.
pub(crate) fn get<'a>(mapping: &'a Mapping, key: &str) -> Option<&'a Value> {
    mapping.get(key)
}

/// True if `mapping` has `key`, regardless of its value.
pub(crate) fn has(mapping: &Mapping, key: &str) -> bool {
    get(mapping, key).is_some()
}

/// Insert under a string key.
pub(crate) fn set(mapping: &mut Mapping, key: &str, val: Value) {
    mapping.insert(Value::String(key.to_string()), val);
}

/// Interpret a value as a boolean the way a permissive YAML reader would:
/// `yes`/`true`/`on` strings count as true, `no`/`false`/`off` as false,
/// other values by emptiness.
pub(crate) fn truthy(val: &Value) -> bool {
    match val {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => match s.as_str() {
            "" | "no" | "false" | "off" => false,
            _ => true,
        },
        Value::Sequence(s) => !s.is_empty(),
        Value::Mapping(m) => !m.is_empty(),
        Value::Tagged(t) => truthy(&t.value),
    }
}

/// An explicit disable marker: boolean false or one of its permissive
/// YAML spellings.
pub(crate) fn explicit_no(val: &Value) -> bool {
    match val {
        Value::Bool(false) => true,
        Value::String(s) => matches!(s.as_str(), "no" | "off" | "false"),
        _ => false,
    }
}

/// An explicit enable marker: boolean true or one of its permissive
/// YAML spellings.
pub(crate) fn explicit_yes(val: &Value) -> bool {
    match val {
        Value::Bool(true) => true,
        Value::String(s) => matches!(s.as_str(), "yes" | "on" | "true"),
        _ => false,
    }
}

/// Render a value compactly for error messages and logs.
pub(crate) fn desc(val: &Value) -> String {
    match val {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{s}'"),
        Value::Sequence(seq) => {
            let items: Vec<String> = seq.iter().map(desc).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Mapping(map) => {
            let items: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", desc(k), desc(v)))
                .collect();
            format!("{{{}}}", items.join(", "))
        }
        Value::Tagged(t) => format!("{} {}", t.tag, desc(&t.value)),
    }
}

/// Render a scalar for string joining during parameter substitution.
/// Collections fall back to the compact error rendering.
pub(crate) fn stringify(val: &Value) -> String {
    match val {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => desc(other),
    }
}

/// Interpret a value as an optional string, erroring via the caller on
/// other shapes. Null maps to `None`.
pub(crate) fn as_opt_str(val: Option<&Value>) -> Option<String> {
    match val {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(stringify(other)),
    }
}

/// The keys of a mapping, in insertion order, coerced to strings where
/// possible. Non-string keys come back as their compact rendering so the
/// caller can report them.
pub(crate) fn keys(mapping: &Mapping) -> Vec<String> {
    mapping
        .keys()
        .map(|k| match k {
            Value::String(s) => s.clone(),
            other => desc(other),
        })
        .collect()
}
