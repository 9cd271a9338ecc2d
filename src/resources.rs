//! Resource definitions and their sources.
//!
//! A resource is a named list of sources an operation can depend on. Each
//! source is exactly one of a file, a URL, a config reference, or an
//! operation reference, plus selection, rename, and target-path controls.

use crate::error::{GuildfileError, Result};
use crate::value;
use regex::Captures;
use serde_yaml::{Mapping, Value};
use tracing::warn;

const SOURCE_TYPES: [&str; 4] = ["file", "url", "config", "operation"];
const DEFAULT_SOURCE_TYPE: &str = "file";

const SOURCE_ATTRS: [&str; 18] = [
    "name",
    "sha256",
    "unpack",
    "type",
    "select",
    "select-min",
    "select-max",
    "warn-if-empty",
    "fail-if-empty",
    "rename",
    "help",
    "post-process",
    "target-path",
    "target-type",
    "replace-existing",
    "always-resolve",
    "path",
    "preserve-path",
];

/// A named list of dependency sources.
#[derive(Debug, Clone)]
pub struct ResourceDef {
    /// Resource name; derived from source names when not given.
    pub name: String,
    /// `model:name` qualified name used in messages.
    pub fullname: String,
    /// Owning model's name.
    pub model_name: String,
    /// Flag name used to override the resource on the command line.
    pub flag_name: Option<String>,
    /// Description.
    pub description: String,
    /// Directory resolved files land in.
    pub target_path: Option<String>,
    /// Keep source-relative paths when resolving.
    pub preserve_path: bool,
    /// Link type for resolved files.
    pub target_type: Option<String>,
    /// Whether sources unpack archives by default.
    pub default_unpack: bool,
    /// Hidden from resource listings.
    pub private: bool,
    /// Free-form reference strings.
    pub references: Vec<String>,
    /// The sources, in definition order.
    pub sources: Vec<ResourceSource>,
}

impl ResourceDef {
    pub(crate) fn new(
        name: Option<&str>,
        data: &Value,
        model_name: &str,
        path: &str,
    ) -> Result<Self> {
        let data = coerce_resdef(data, name.unwrap_or(""), path)?;
        let given_name = name.unwrap_or("");
        let default_unpack = match value::get(&data, "default-unpack") {
            None | Some(Value::Null) => true,
            Some(val) => value::truthy(val),
        };
        let sources = init_sources(
            value::get(&data, "sources").unwrap_or(&Value::Null),
            &format!("{model_name}:{given_name}"),
            default_unpack,
            path,
        )?;
        let flag_name = value::as_opt_str(value::get(&data, "flag-name"));
        // Anonymous (inline) resources take their flag name, else the
        // joined source names.
        let name = if given_name.is_empty() {
            flag_name.clone().unwrap_or_else(|| {
                sources
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            })
        } else {
            given_name.to_string()
        };
        let fullname = format!("{model_name}:{name}");
        Ok(Self {
            name,
            fullname: fullname.clone(),
            model_name: model_name.to_string(),
            flag_name,
            description: value::get(&data, "description")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            target_path: init_target_path(
                value::as_opt_str(value::get(&data, "target-path")),
                value::as_opt_str(value::get(&data, "path")),
                &format!("resource {fullname}"),
            ),
            preserve_path: value::get(&data, "preserve-path").is_some_and(value::truthy),
            target_type: value::as_opt_str(value::get(&data, "target-type")),
            default_unpack,
            private: value::get(&data, "private").is_some_and(value::truthy),
            references: match value::get(&data, "references") {
                Some(Value::Sequence(items)) => {
                    items.iter().map(value::stringify).collect()
                }
                Some(Value::String(s)) => vec![s.clone()],
                _ => Vec::new(),
            },
            sources,
        })
    }
}

impl PartialEq for ResourceDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Resource data given as a bare list is a source list.
fn coerce_resdef(data: &Value, name: &str, path: &str) -> Result<Mapping> {
    match data {
        Value::Mapping(map) => Ok(map.clone()),
        Value::Sequence(_) => {
            let mut map = Mapping::new();
            value::set(&mut map, "sources", data.clone());
            Ok(map)
        }
        other => Err(GuildfileError::schema(
            path,
            format!(
                "invalid resource def '{name}' {}: expected a mapping or list",
                value::desc(other)
            ),
        )),
    }
}

fn init_sources(
    data: &Value,
    fullname: &str,
    default_unpack: bool,
    path: &str,
) -> Result<Vec<ResourceSource>> {
    let items = match data {
        Value::Null => return Ok(Vec::new()),
        Value::Sequence(items) => items,
        other => {
            return Err(GuildfileError::schema(
                path,
                format!(
                    "invalid sources value for resource '{fullname}': {}",
                    value::desc(other)
                ),
            ));
        }
    };
    items
        .iter()
        .map(|src| init_source(src, fullname, default_unpack, path))
        .collect()
}

fn init_source(
    data: &Value,
    fullname: &str,
    default_unpack: bool,
    path: &str,
) -> Result<ResourceSource> {
    match data {
        Value::Mapping(map) => source_for_data(map, fullname, default_unpack, path),
        Value::String(val) => ResourceSource::new(
            DEFAULT_SOURCE_TYPE,
            val,
            &Mapping::new(),
            default_unpack,
            path,
        ),
        other => Err(GuildfileError::schema(
            path,
            format!(
                "invalid source for resource '{fullname}': {}",
                value::desc(other)
            ),
        )),
    }
}

/// A mapping source names its type by carrying exactly one type attribute.
fn source_for_data(
    data: &Mapping,
    fullname: &str,
    default_unpack: bool,
    path: &str,
) -> Result<ResourceSource> {
    let mut type_items: Vec<(&str, String)> = Vec::new();
    for attr in SOURCE_TYPES {
        if let Some(val) = value::get(data, attr) {
            if value::truthy(val) {
                type_items.push((attr, value::stringify(val)));
            }
        }
    }
    match type_items.len() {
        0 => Err(GuildfileError::schema(
            path,
            format!(
                "invalid source {} in resource '{fullname}': missing required \
                 attribute (one of {})",
                value::desc(&Value::Mapping(data.clone())),
                SOURCE_TYPES.join(", ")
            ),
        )),
        1 => {
            let (type_name, type_val) = &type_items[0];
            let rest: Mapping = data
                .iter()
                .filter(|(k, _)| {
                    !k.as_str().is_some_and(|name| SOURCE_TYPES.contains(&name))
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            ResourceSource::new(type_name, type_val, &rest, default_unpack, path)
        }
        _ => {
            let conflicting: Vec<&str> =
                type_items.iter().map(|(name, _)| *name).collect();
            Err(GuildfileError::schema(
                path,
                format!(
                    "invalid source {} in resource '{fullname}': conflicting \
                     attributes ({})",
                    value::desc(&Value::Mapping(data.clone())),
                    conflicting.join(", ")
                ),
            ))
        }
    }
}

/// One dependency source within a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSource {
    /// Typed URI, e.g. `file:data.csv` or `operation:train`.
    pub uri: String,
    /// Source name; defaults to the URI.
    pub name: String,
    /// Expected content digest.
    pub sha256: Option<String>,
    /// Unpack archives when resolving.
    pub unpack: bool,
    /// Resolved-file type override.
    pub file_type: Option<String>,
    /// File selection rules applied to resolved content.
    pub select: Vec<SelectSpec>,
    /// Warn when selection yields nothing.
    pub warn_if_empty: bool,
    /// Fail when selection yields nothing.
    pub fail_if_empty: bool,
    /// Rename rules applied to selected files.
    pub rename: Option<Vec<RenameSpec>>,
    /// Post-processing command.
    pub post_process: Option<String>,
    /// Directory resolved files land in.
    pub target_path: Option<String>,
    /// Link type for resolved files.
    pub target_type: Option<String>,
    /// Replace existing files when resolving.
    pub replace_existing: Option<bool>,
    /// Re-resolve on every run rather than using a cached copy.
    pub always_resolve: Option<bool>,
    /// Keep source-relative paths when resolving.
    pub preserve_path: bool,
    /// Source parameters, e.g. operation-source flag values.
    pub params: Mapping,
    /// Help shown when resolution fails.
    pub help: Option<String>,
}

impl ResourceSource {
    fn new(
        type_name: &str,
        type_val: &str,
        data: &Mapping,
        default_unpack: bool,
        path: &str,
    ) -> Result<Self> {
        let uri = match type_name {
            "url" => type_val.to_string(),
            _ => format!("{type_name}:{type_val}"),
        };
        let name = value::as_opt_str(value::get(data, "name")).unwrap_or_else(|| uri.clone());
        let source = Self {
            uri,
            name: name.clone(),
            sha256: value::as_opt_str(value::get(data, "sha256")),
            unpack: match value::get(data, "unpack") {
                None | Some(Value::Null) => default_unpack,
                Some(val) => value::truthy(val),
            },
            file_type: value::as_opt_str(value::get(data, "type")),
            select: init_select(
                value::get(data, "select"),
                value::get(data, "select-min"),
                value::get(data, "select-max"),
                path,
            )?,
            warn_if_empty: match value::get(data, "warn-if-empty") {
                None | Some(Value::Null) => true,
                Some(val) => value::truthy(val),
            },
            fail_if_empty: value::get(data, "fail-if-empty").is_some_and(value::truthy),
            rename: init_rename(value::get(data, "rename"), path)?,
            post_process: value::as_opt_str(value::get(data, "post-process")),
            target_path: init_target_path(
                value::as_opt_str(value::get(data, "target-path")),
                value::as_opt_str(value::get(data, "path")),
                &format!("source {name}"),
            ),
            target_type: value::as_opt_str(value::get(data, "target-type")),
            replace_existing: value::get(data, "replace-existing")
                .filter(|v| !v.is_null())
                .map(value::truthy),
            always_resolve: value::get(data, "always-resolve")
                .filter(|v| !v.is_null())
                .map(value::truthy),
            preserve_path: value::get(data, "preserve-path").is_some_and(value::truthy),
            params: match value::get(data, "params") {
                Some(Value::Mapping(map)) => map.clone(),
                _ => Mapping::new(),
            },
            help: value::as_opt_str(value::get(data, "help")),
        };
        warn_unexpected_attrs(data, &source.name);
        Ok(source)
    }
}

fn warn_unexpected_attrs(data: &Mapping, name: &str) {
    let mut unexpected: Vec<&str> = data
        .iter()
        .filter_map(|(k, _)| k.as_str())
        .filter(|attr| !SOURCE_ATTRS.contains(attr))
        .collect();
    unexpected.sort_unstable();
    for attr in unexpected {
        warn!("unexpected source attribute '{}' in resource '{}'", attr, name);
    }
}

/// `path` is the legacy spelling of `target-path`; `target-path` wins when
/// both are given.
fn init_target_path(
    target_path: Option<String>,
    path: Option<String>,
    context: &str,
) -> Option<String> {
    if target_path.is_some() && path.is_some() {
        warn!(
            "target-path and path both specified for {} - using target-path",
            context
        );
    }
    target_path.or(path)
}

/// How a select pattern reduces its matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectReduce {
    /// Keep the match whose first capture group is numerically smallest.
    Min,
    /// Keep the match whose first capture group is numerically largest.
    Max,
}

/// One selection pattern, optionally reducing matched files to a single
/// numeric extreme.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectSpec {
    /// Regular-expression pattern matched against file paths.
    pub pattern: String,
    /// Optional reduction over the matches.
    pub reduce: Option<SelectReduce>,
}

impl SelectSpec {
    /// Apply the reduction, if any, to a match set. Matches whose first
    /// capture group is missing or non-numeric are ignored by reductions.
    pub fn reduce_matches<'a>(&self, matches: Vec<Captures<'a>>) -> Vec<Captures<'a>> {
        let Some(reduce) = self.reduce else {
            return matches;
        };
        let mut best: Option<(f64, Captures<'a>)> = None;
        for m in matches {
            let Some(val) = m.get(1).and_then(|g| g.as_str().parse::<f64>().ok()) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((best_val, _)) => match reduce {
                    SelectReduce::Min => val < *best_val,
                    SelectReduce::Max => val > *best_val,
                },
            };
            if better {
                best = Some((val, m));
            }
        }
        best.map(|(_, m)| vec![m]).unwrap_or_default()
    }
}

fn init_select(
    select: Option<&Value>,
    select_min: Option<&Value>,
    select_max: Option<&Value>,
    path: &str,
) -> Result<Vec<SelectSpec>> {
    let mut specs = Vec::new();
    for (val, reduce, desc) in [
        (select, None, "select"),
        (select_min, Some(SelectReduce::Min), "select-min"),
        (select_max, Some(SelectReduce::Max), "select-max"),
    ] {
        let Some(val) = val else { continue };
        for pattern in crate::coerce::string_or_list(val.clone(), path, desc)? {
            specs.push(SelectSpec { pattern, reduce });
        }
    }
    Ok(specs)
}

/// One rename rule: files matching `pattern` are renamed via `repl`.
#[derive(Debug, Clone, PartialEq)]
pub struct RenameSpec {
    /// Regular-expression pattern.
    pub pattern: String,
    /// Replacement text.
    pub repl: String,
}

fn init_rename(data: Option<&Value>, path: &str) -> Result<Option<Vec<RenameSpec>>> {
    let items = match data {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Sequence(items)) => items.clone(),
        Some(single) => vec![single.clone()],
    };
    let specs = items
        .iter()
        .map(|item| init_rename_spec(item, path))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(specs))
}

fn init_rename_spec(data: &Value, path: &str) -> Result<RenameSpec> {
    match data {
        Value::String(spec) => split_rename_spec(spec, path),
        Value::Mapping(map) => Ok(RenameSpec {
            pattern: value::as_opt_str(value::get(map, "pattern")).unwrap_or_default(),
            repl: value::as_opt_str(value::get(map, "repl")).unwrap_or_default(),
        }),
        other => Err(GuildfileError::schema(
            path,
            format!(
                "invalid rename spec {}: expected string or map",
                value::desc(other)
            ),
        )),
    }
}

/// A rename string is shell-split: two parts are `PATTERN REPL`, one part
/// is a bare name renaming every selected file.
fn split_rename_spec(spec: &str, path: &str) -> Result<RenameSpec> {
    let parts = shlex::split(spec).unwrap_or_default();
    match parts.as_slice() {
        [pattern, repl] => Ok(RenameSpec {
            pattern: pattern.clone(),
            repl: repl.clone(),
        }),
        [name] => Ok(RenameSpec {
            pattern: ".*".to_string(),
            repl: name.clone(),
        }),
        _ => Err(GuildfileError::schema(
            path,
            format!("invalid rename spec '{spec}': expected 'PATTERN REPL' or 'NAME'"),
        )),
    }
}
