//! Section-include resolution: `$include` entries inside `flags`,
//! `operations`, and `resources` tables.
//!
//! A reference has the grammar `MODEL[:OPERATION][#ATTR,ATTR,...]` - either
//! operation-scoped (`model:op`) or model/config-scoped (`model`). The
//! target is searched in the current file's top-level items first, then in
//! each ancestor guildfile reachable through `extends`. `$include` entries
//! always apply before ordinary sibling entries, so local definitions win
//! for the same name.

use crate::coerce;
use crate::error::{GuildfileError, Result};
use crate::value;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::sync::LazyLock;

/// `MODEL:OPERATION[#ATTRS]` - the model part may be empty.
static REF_OP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:#]*):([^#]+)(?:#(.+))?$").expect("op ref regex"));

/// `MODEL[#ATTRS]`.
static REF_MODEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:#]+)(?:#(.+))?$").expect("model ref regex"));

const REF_DESC: &str = "CONFIG[#ATTRS] or MODEL:OPERATION[#ATTRS]";

/// One searchable file in the include scope: the current guildfile's items
/// followed by each ancestor's.
pub(crate) struct SectionScope<'a> {
    pub items: &'a [Mapping],
    pub path: String,
}

/// Resolve the named section of `data`, applying `$include` references
/// first and ordinary entries second.
///
/// A reference already applied in this call is skipped silently; merged
/// attribute values are overwritten by later applications, which is what
/// gives locally-defined entries precedence.
pub(crate) fn resolve_includes(
    data: &Mapping,
    section_name: &str,
    scopes: &[SectionScope<'_>],
) -> Result<Mapping> {
    let section_data = match value::get(data, section_name) {
        Some(Value::Mapping(map)) => map.clone(),
        Some(Value::Null) | None => Mapping::new(),
        Some(other) => {
            return Err(GuildfileError::schema(
                current_path(scopes),
                format!(
                    "invalid {section_name} value {}: expected a mapping",
                    value::desc(other)
                ),
            ));
        }
    };
    let mut resolved = Mapping::new();
    let mut seen = HashSet::new();
    apply_section_data(&section_data, scopes, section_name, &mut seen, &mut resolved)?;
    Ok(resolved)
}

fn current_path(scopes: &[SectionScope<'_>]) -> String {
    scopes
        .first()
        .map(|s| s.path.clone())
        .unwrap_or_else(|| crate::error::GENERATED_SRC.to_string())
}

fn apply_section_data(
    data: &Mapping,
    scopes: &[SectionScope<'_>],
    section_name: &str,
    seen: &mut HashSet<String>,
    resolved: &mut Mapping,
) -> Result<()> {
    for name in includes_first(data) {
        let val = value::get(data, &name).cloned().unwrap_or(Value::Null);
        if name == "$include" {
            let refs = coerce::string_or_list(val, &current_path(scopes), "$include")?;
            apply_includes(&refs, scopes, section_name, seen, resolved)?;
        } else {
            apply_data(&name, val, resolved);
        }
    }
    Ok(())
}

/// Section entry names with `$include` forced first; remaining names apply
/// in sorted order.
fn includes_first(data: &Mapping) -> Vec<String> {
    let mut names = value::keys(data);
    names.sort_by(|a, b| {
        let rank = |n: &String| if n == "$include" { 0 } else { 1 };
        rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
    });
    names
}

fn apply_includes(
    refs: &[String],
    scopes: &[SectionScope<'_>],
    section_name: &str,
    seen: &mut HashSet<String>,
    resolved: &mut Mapping,
) -> Result<()> {
    for reference in refs {
        if seen.contains(reference) {
            // Re-applying the same reference cannot add anything new;
            // skipping also breaks item-level include loops.
            break;
        }
        seen.insert(reference.clone());
        let parsed = split_include_ref(reference, &current_path(scopes))?;
        let Some(mut include_data) =
            find_include_data(&parsed.model, parsed.operation.as_deref(), section_name, scopes)
        else {
            return Err(GuildfileError::reference(
                current_path(scopes),
                format!("invalid include reference '{reference}': cannot find target"),
            ));
        };
        if let Some(attrs) = &parsed.attrs {
            include_data = filter_data(&include_data, attrs);
        }
        apply_section_data(&include_data, scopes, section_name, seen, resolved)?;
    }
    Ok(())
}

struct IncludeRef {
    model: String,
    operation: Option<String>,
    attrs: Option<Vec<String>>,
}

fn split_include_ref(reference: &str, path: &str) -> Result<IncludeRef> {
    if let Some(caps) = REF_OP.captures(reference) {
        return Ok(IncludeRef {
            model: caps[1].to_string(),
            operation: Some(caps[2].to_string()),
            attrs: caps.get(3).map(|m| split_attrs(m.as_str())),
        });
    }
    if let Some(caps) = REF_MODEL.captures(reference) {
        return Ok(IncludeRef {
            model: caps[1].to_string(),
            operation: None,
            attrs: caps.get(2).map(|m| split_attrs(m.as_str())),
        });
    }
    Err(GuildfileError::reference(
        path,
        format!(
            "invalid include reference '{reference}': operation references \
             must be specified as {REF_DESC}"
        ),
    ))
}

fn split_attrs(attrs: &str) -> Vec<String> {
    attrs
        .split(',')
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect()
}

/// Search the scope chain for the requested section of the named model or
/// operation. The first matching item wins; a model item lacking the
/// requested operation keeps the search going.
fn find_include_data(
    model_name: &str,
    op_name: Option<&str>,
    section_name: &str,
    scopes: &[SectionScope<'_>],
) -> Option<Mapping> {
    for scope in scopes {
        for item in scope.items {
            if item_name(item).as_deref() != Some(model_name) {
                continue;
            }
            match op_name {
                Some(op) => {
                    let Some(op_data) = op_data(item, op) else {
                        continue;
                    };
                    return Some(section_of(op_data, section_name));
                }
                None => return Some(section_of(item, section_name)),
            }
        }
    }
    None
}

/// The name of a model/config item, if it is one.
pub(crate) fn item_name(item: &Mapping) -> Option<String> {
    for attr in coerce::MODEL_TYPES {
        if let Some(val) = value::get(item, attr) {
            return val.as_str().map(str::to_string);
        }
    }
    None
}

fn op_data<'a>(item: &'a Mapping, op_name: &str) -> Option<&'a Mapping> {
    match value::get(item, "operations")? {
        Value::Mapping(ops) => match value::get(ops, op_name)? {
            Value::Mapping(op) => Some(op),
            _ => None,
        },
        _ => None,
    }
}

fn section_of(data: &Mapping, section_name: &str) -> Mapping {
    match value::get(data, section_name) {
        Some(Value::Mapping(map)) => map.clone(),
        _ => Mapping::new(),
    }
}

fn filter_data(data: &Mapping, attrs: &[String]) -> Mapping {
    data.iter()
        .filter(|(k, _)| k.as_str().is_some_and(|name| attrs.iter().any(|a| a == name)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Merge one resolved entry. Mapping values merge attribute-wise into any
/// existing entry of the same name; other values replace it.
fn apply_data(name: &str, data: Value, resolved: &mut Mapping) {
    match data {
        Value::Mapping(map) => match value::get(resolved, name) {
            Some(Value::Mapping(_)) => {
                if let Some(Value::Mapping(cur)) = resolved.get_mut(name) {
                    for (k, v) in map {
                        cur.insert(k, v);
                    }
                }
            }
            _ => value::set(resolved, name, Value::Mapping(map)),
        },
        other => value::set(resolved, name, other),
    }
}
