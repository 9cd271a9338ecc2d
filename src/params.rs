//! Parameter templating: `{{name}}` substitution over a model's data.
//!
//! Parameters are scoped to one model's local `params` table. Values may
//! reference other parameters, which may reference others in turn; each
//! parameter is resolved to a fixed point before substitution into the
//! model's data tree. Resolution never fails: a genuine reference cycle
//! terminates via the seen-set (or, pathologically, the iteration bound)
//! and yields the last computed value.

use crate::value;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::sync::LazyLock;

static PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{.*?\}\}").expect("param regex"));

/// Hard stop for self-referential parameter chains. The seen-set terminates
/// every practical case first; this bound is the safety valve.
const MAX_RESOLVE_ITERATIONS: usize = 100;

/// Resolve a model's raw `params` table to concrete values.
///
/// Each string-valued parameter is repeatedly re-substituted against the
/// raw table until a produced value repeats one already seen (fixed point
/// or cycle) or the iteration bound is hit; the current value wins either
/// way. Non-string parameters pass through unchanged.
pub(crate) fn resolved_params(data: &Mapping) -> Mapping {
    let raw = match value::get(data, "params") {
        Some(Value::Mapping(map)) => map,
        _ => return Mapping::new(),
    };
    let mut resolved = Mapping::new();
    for (key, val) in raw {
        resolved.insert(key.clone(), resolve_param(val, raw));
    }
    resolved
}

fn resolve_param(val: &Value, params: &Mapping) -> Value {
    let Value::String(_) = val else {
        return val.clone();
    };
    let mut seen = vec![val.clone()];
    let mut cur = val.clone();
    for _ in 0..MAX_RESOLVE_ITERATIONS {
        cur = resolve_str_refs(&value::stringify(&cur), params);
        if seen.contains(&cur) {
            return cur;
        }
        seen.push(cur.clone());
    }
    cur
}

/// Substitute resolved parameter values into every string leaf of a tree.
/// Non-string leaves pass through unchanged.
pub(crate) fn resolve_refs(val: Value, params: &Mapping) -> Value {
    match val {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (k, resolve_refs(v, params)))
                .collect(),
        ),
        Value::Sequence(items) => {
            Value::Sequence(items.into_iter().map(|v| resolve_refs(v, params)).collect())
        }
        Value::String(s) => resolve_str_refs(&s, params),
        other => other,
    }
}

/// Substitute `{{name}}` tokens in one string. A string that is exactly one
/// token resolves to the parameter's value with its type preserved; mixed
/// strings stringify each part and join. Unknown names stay literal.
fn resolve_str_refs(s: &str, params: &Mapping) -> Value {
    let mut parts: Vec<Value> = Vec::new();
    let mut last = 0;
    for m in PARAM_RE.find_iter(s) {
        if m.start() > last {
            parts.push(Value::String(s[last..m.start()].to_string()));
        }
        parts.push(resolve_ref(m.as_str(), params));
        last = m.end();
    }
    if last < s.len() {
        parts.push(Value::String(s[last..].to_string()));
    }
    match parts.len() {
        0 => Value::String(String::new()),
        1 => parts.remove(0),
        _ => Value::String(
            parts
                .iter()
                .map(value::stringify)
                .collect::<Vec<_>>()
                .join(""),
        ),
    }
}

fn resolve_ref(token: &str, params: &Mapping) -> Value {
    let name = token
        .trim_start_matches("{{")
        .trim_end_matches("}}")
        .trim();
    match value::get(params, name) {
        Some(val) => val.clone(),
        None => Value::String(token.to_string()),
    }
}
