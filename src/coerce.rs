//! Coercion of flexible input shapes into canonical forms.
//!
//! Guildfile documents are deliberately loose: a flag may be a bare value or
//! a mapping of attributes, an operation may be a bare string or a mapping,
//! a source-file selection may be a string, a list, or a structured mapping.
//! This module normalizes every such slot into exactly one canonical shape
//! before any reference resolution touches the data, so downstream stages
//! never re-check shapes.
//!
//! Coercion failures are [`GuildfileError::Schema`] errors naming the
//! offending slot and the file it occurred in. The only non-fatal anomaly is
//! an unrecognized key in a structured source-selection mapping, which is
//! logged as a warning and dropped.

use crate::error::{GuildfileError, Result};
use crate::value;
use serde_yaml::{Mapping, Value};
use tracing::warn;

/// Item tags recognized at the top level of a document.
pub const ALL_TYPES: [&str; 4] = ["config", "include", "model", "package"];

/// Item tags that can be targets of `$include` and `extends` references.
pub const MODEL_TYPES: [&str; 2] = ["model", "config"];

/// Coerce a whole parsed document into the canonical item list.
///
/// A null document becomes an empty list. A bare top-level mapping is the
/// anonymous-model shorthand: it is wrapped as a single `model: ""` item
/// whose `operations` table is the original mapping. Anything other than a
/// mapping or a sequence of mappings is a schema error.
pub fn guildfile_data(data: Value, path: &str) -> Result<Vec<Mapping>> {
    let items = match data {
        Value::Null => return Ok(Vec::new()),
        Value::Mapping(map) => vec![Value::Mapping(anonymous_model_data(map))],
        Value::Sequence(items) => items,
        other => {
            return Err(GuildfileError::schema(
                path,
                format!(
                    "invalid guildfile data {}: expected a mapping",
                    value::desc(&other)
                ),
            ));
        }
    };
    items.into_iter().map(|item| item_data(item, path)).collect()
}

/// Wrap an operations table as an anonymous model item.
fn anonymous_model_data(ops_data: Mapping) -> Mapping {
    let mut item = Mapping::new();
    value::set(&mut item, "model", Value::String(String::new()));
    value::set(&mut item, "operations", Value::Mapping(ops_data));
    item
}

/// Coerce one top-level item: attribute-wise coercion by name, then the
/// anonymous-model shorthand for list items that define `operations` but
/// carry no `model`/`config` tag.
fn item_data(data: Value, path: &str) -> Result<Mapping> {
    let Value::Mapping(map) = data else {
        return Err(GuildfileError::schema(
            path,
            format!(
                "invalid guildfile item {}: expected a mapping",
                value::desc(&data)
            ),
        ));
    };
    let mut coerced = Mapping::new();
    for (key, val) in map {
        let coerced_val = match key.as_str() {
            Some(name) => top_level_attr(name, val, path)?,
            None => val,
        };
        coerced.insert(key, coerced_val);
    }
    maybe_apply_anonymous_model(&mut coerced);
    Ok(coerced)
}

/// Coerce a top-level item attribute by name.
///
/// This is name-based, not context-based: a `flags` attribute under a
/// `config` item is coerced with the same rules as one under an operation.
fn top_level_attr(name: &str, val: Value, path: &str) -> Result<Value> {
    match name {
        "include" => Ok(Value::Sequence(
            string_or_list(val, path, "include")?
                .into_iter()
                .map(Value::String)
                .collect(),
        )),
        "extends" => Ok(Value::Sequence(
            string_or_list(val, path, "extends")?
                .into_iter()
                .map(Value::String)
                .collect(),
        )),
        "operations" => operations(val, path),
        "flags" => flags(val, path),
        "sourcecode" => select_files(val, path),
        _ => Ok(val),
    }
}

/// Apply the anonymous-model shorthand to a list item in place.
fn maybe_apply_anonymous_model(data: &mut Mapping) {
    if !value::has(data, "operations") {
        return;
    }
    for name in MODEL_TYPES {
        if value::has(data, name) {
            return;
        }
    }
    value::set(data, "model", Value::String(String::new()));
}

/// Coerce an operations table: each entry becomes a mapping, with bare
/// strings promoted to `{main: ...}`. `$include` entries pass through.
pub fn operations(data: Value, path: &str) -> Result<Value> {
    let Value::Mapping(map) = data else {
        return Err(GuildfileError::schema(
            path,
            format!(
                "invalid operations value {}: expected a mapping",
                value::desc(&data)
            ),
        ));
    };
    let mut coerced = Mapping::new();
    for (key, val) in map {
        let op = match key.as_str() {
            Some(name) => operation(name, val, path)?,
            None => val,
        };
        coerced.insert(key, op);
    }
    Ok(Value::Mapping(coerced))
}

/// Coerce one operation value.
pub fn operation(name: &str, data: Value, path: &str) -> Result<Value> {
    if name == "$include" {
        return Ok(data);
    }
    match data {
        Value::String(main) => {
            let mut map = Mapping::new();
            value::set(&mut map, "main", Value::String(main));
            Ok(Value::Mapping(map))
        }
        Value::Mapping(map) => {
            let mut coerced = Mapping::new();
            for (key, val) in map {
                let coerced_val = match key.as_str() {
                    Some(attr) => operation_attr(attr, val, path)?,
                    None => val,
                };
                coerced.insert(key, coerced_val);
            }
            Ok(Value::Mapping(coerced))
        }
        other => Err(GuildfileError::schema(
            path,
            format!(
                "invalid value for operation '{name}' {}: expected a string or a mapping",
                value::desc(&other)
            ),
        )),
    }
}

/// Coerce an operation attribute by name.
fn operation_attr(name: &str, val: Value, path: &str) -> Result<Value> {
    match name {
        "flags" => flags(val, path),
        "flags-import" => flags_import(val, path),
        "publish" => publish(val, path),
        "output-capture" => output_capture(val, path),
        "sourcecode" => select_files(val, path),
        _ => Ok(val),
    }
}

/// Coerce a flags table: each entry becomes a mapping of flag attributes,
/// with bare values promoted to `{default: ...}`.
pub fn flags(data: Value, path: &str) -> Result<Value> {
    let Value::Mapping(map) = data else {
        return Err(GuildfileError::schema(
            path,
            format!(
                "invalid flags value {}: expected a mapping",
                value::desc(&data)
            ),
        ));
    };
    let mut coerced = Mapping::new();
    for (key, val) in map {
        let flag = match key.as_str() {
            Some(name) => flag_data(name, val, path)?,
            None => val,
        };
        coerced.insert(key, flag);
    }
    Ok(Value::Mapping(coerced))
}

/// Coerce one flag value to its canonical mapping shape.
pub fn flag_data(name: &str, data: Value, path: &str) -> Result<Value> {
    if name == "$include" {
        // Reference strings pass through for the section resolver.
        return Ok(data);
    }
    match data {
        Value::Mapping(_) => Ok(data),
        Value::Null
        | Value::Bool(_)
        | Value::Number(_)
        | Value::String(_)
        | Value::Sequence(_) => {
            let mut map = Mapping::new();
            value::set(&mut map, "default", data);
            Ok(Value::Mapping(map))
        }
        other => Err(GuildfileError::schema(
            path,
            format!(
                "invalid value for {name} flag {}: expected a mapping of flag \
                 attributes or default flag value",
                value::desc(&other)
            ),
        )),
    }
}

/// Coerce a flags-import value: `true`/`"all"` imports everything,
/// `false` imports nothing, a list imports exactly those names.
pub fn flags_import(data: Value, path: &str) -> Result<Value> {
    match data {
        _ if value::explicit_yes(&data) => Ok(Value::Bool(true)),
        Value::String(ref s) if s == "all" => Ok(Value::Bool(true)),
        _ if value::explicit_no(&data) => Ok(Value::Sequence(Vec::new())),
        Value::Sequence(_) => Ok(data),
        other => Err(GuildfileError::schema(
            path,
            format!(
                "invalid flags-import value {}: expected yes/all, no, or a \
                 list of flag names",
                value::desc(&other)
            ),
        )),
    }
}

/// Coerce an output-capture value to a list of capture specs.
pub fn output_capture(data: Value, path: &str) -> Result<Value> {
    match data {
        Value::Null => Ok(Value::Null),
        _ if value::explicit_no(&data) => Ok(Value::Sequence(Vec::new())),
        Value::String(_) | Value::Mapping(_) => Ok(Value::Sequence(vec![data])),
        Value::Sequence(_) => Ok(data),
        other => Err(GuildfileError::schema(
            path,
            format!(
                "invalid output-capture {}: expected a mapping, list, string, or false",
                value::desc(&other)
            ),
        )),
    }
}

/// Coerce a publish spec, normalizing its `files` selection.
pub fn publish(data: Value, path: &str) -> Result<Value> {
    let Value::Mapping(mut map) = data else {
        return Ok(data);
    };
    if let Some(files) = value::get(&map, "files").cloned() {
        if value::truthy(&files) {
            let coerced = select_files(files, path)?;
            value::set(&mut map, "files", coerced);
        }
    }
    Ok(Value::Mapping(map))
}

/// Coerce a source-file selection spec to its canonical shape.
///
/// A bare string means "exclude everything, then include this". A list of
/// bare strings gets the same leading exclude-all rule. A structured mapping
/// is split into `select`/`root`/`digest`/`dest`, warning on anything else.
pub fn select_files(data: Value, path: &str) -> Result<Value> {
    match data {
        Value::Null => Ok(Value::Sequence(Vec::new())),
        _ if value::explicit_no(&data) => Ok(Value::Bool(false)),
        Value::Sequence(ref items) if items.is_empty() => Ok(Value::Bool(false)),
        Value::String(s) => Ok(Value::Sequence(vec![
            single_rule("exclude", Value::String("*".to_string())),
            single_rule("include", Value::String(s)),
        ])),
        Value::Mapping(map) => select_files_mapping(map, path),
        Value::Sequence(items) => select_files_list(items, path),
        other => Err(GuildfileError::schema(
            path,
            format!(
                "invalid select files spec {}: expected a string, list, or mapping",
                value::desc(&other)
            ),
        )),
    }
}

fn single_rule(kind: &str, pattern: Value) -> Value {
    let mut map = Mapping::new();
    value::set(&mut map, kind, pattern);
    Value::Mapping(map)
}

fn select_files_mapping(map: Mapping, path: &str) -> Result<Value> {
    let mut coerced = Mapping::new();
    let select = value::get(&map, "select").cloned().unwrap_or(Value::Null);
    value::set(&mut coerced, "select", select_files(select, path)?);
    for key in ["root", "digest", "dest"] {
        let val = value::get(&map, key).cloned().unwrap_or(Value::Null);
        value::set(&mut coerced, key, val);
    }
    let mut unexpected: Vec<String> = value::keys(&map)
        .into_iter()
        .filter(|k| !matches!(k.as_str(), "select" | "root" | "digest" | "dest"))
        .collect();
    if !unexpected.is_empty() {
        unexpected.sort();
        warn!(
            "unexpected sourcecode attribute(s) in {}: {}",
            path,
            unexpected.join(", ")
        );
    }
    Ok(Value::Mapping(coerced))
}

fn select_files_list(items: Vec<Value>, path: &str) -> Result<Value> {
    let mut coerced = Vec::with_capacity(items.len() + 1);
    let mut all_strings = true;
    for item in items {
        match item {
            Value::String(s) => coerced.push(single_rule("include", Value::String(s))),
            Value::Mapping(_) => {
                coerced.push(item);
                all_strings = false;
            }
            other => {
                return Err(GuildfileError::schema(
                    path,
                    format!(
                        "invalid sourcecode {}: expected a string or mapping",
                        value::desc(&other)
                    ),
                ));
            }
        }
    }
    if all_strings {
        coerced.insert(0, single_rule("exclude", Value::String("*".to_string())));
    }
    Ok(Value::Sequence(coerced))
}

/// Coerce a string-or-list slot to a list of strings. Null is empty.
pub fn string_or_list(val: Value, path: &str, name: &str) -> Result<Vec<String>> {
    match val {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(GuildfileError::schema(
                    path,
                    format!(
                        "invalid {name} value {}: expected a string or list",
                        value::desc(&other)
                    ),
                )),
            })
            .collect(),
        other => Err(GuildfileError::schema(
            path,
            format!(
                "invalid {name} value {}: expected a string or list",
                value::desc(&other)
            ),
        )),
    }
}
