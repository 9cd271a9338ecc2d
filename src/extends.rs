//! Model inheritance: resolution of `extends` lists.
//!
//! A model may extend other models defined in the same file or in an
//! installed package (`package/model`). Parents are resolved depth-first,
//! parent-before-child, and a fixed whitelist of attributes is deep-merged
//! into the child: any key present in the parent but absent in the child is
//! filled in, recursively for nested mappings, and child values are never
//! overwritten. The merge is pure - parent data is never mutated.
//!
//! Runs strictly after file-include expansion and before parameter
//! resolution, so inherited data may still contain `{{...}}` templates that
//! resolve in the child's parameter scope.

use crate::error::{GuildfileError, Result};
use crate::guildfile::{FileCtx, Guildfile};
use crate::loader::Loader;
use crate::section;
use crate::{coerce, params, value};
use serde_yaml::{Mapping, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Attributes a child inherits from its parents.
const INHERITABLE_ATTRS: [&str; 9] = [
    "description",
    "extra",
    "flags",
    "operation-defaults",
    "operations",
    "params",
    "references",
    "resources",
    "sourcecode",
];

/// A model item with its `extends` chain applied: the merged data plus the
/// package guildfiles encountered along the way, which become the model's
/// ancestor search chain for section includes.
pub(crate) struct ExtendedData {
    pub data: Mapping,
    pub parents: Vec<Arc<Guildfile>>,
}

/// Resolve a model item's `extends` chain and, at the top level, its
/// parameter references.
///
/// `seen` is the visited-names path threaded through the recursion for
/// cycle detection. `resolve_params` is false while resolving a parent so
/// that inherited templates resolve in the child's scope.
pub(crate) fn extended_data(
    loader: &mut Loader,
    item: &Mapping,
    file: &FileCtx<'_>,
    seen: &[String],
    resolve_params: bool,
) -> Result<ExtendedData> {
    let mut data = item.clone();
    let mut parents = Vec::new();
    let extends =
        coerce::string_or_list(item_extends(item), &file.path_desc(), "extends")?;
    for name in &extends {
        if seen.iter().any(|s| s == name) {
            let mut chain = seen.to_vec();
            chain.push(name.clone());
            return Err(GuildfileError::cycle(
                file.path_desc(),
                "cycle in 'extends'",
                chain,
            ));
        }
        let parent = parent_data(loader, name, file, seen)?;
        parents.extend(parent.parents);
        apply_parent_data(&parent.data, &mut data, Some(&INHERITABLE_ATTRS));
    }
    if resolve_params {
        let resolved = params::resolved_params(&data);
        data = match params::resolve_refs(Value::Mapping(data), &resolved) {
            Value::Mapping(map) => map,
            other => unreachable!("mapping resolved to {}", value::desc(&other)),
        };
    }
    Ok(ExtendedData { data, parents })
}

fn item_extends(item: &Mapping) -> Value {
    value::get(item, "extends").cloned().unwrap_or(Value::Null)
}

fn parent_data(
    loader: &mut Loader,
    name: &str,
    file: &FileCtx<'_>,
    seen: &[String],
) -> Result<ExtendedData> {
    if name.contains('/') {
        pkg_parent_data(loader, name, file, seen)
    } else {
        local_parent_data(loader, name, file, seen)
    }
}

/// Resolve a `package/model` parent: load the package's own guildfile from
/// the module search path and extend the named model inside it. The package
/// guildfile handle joins the child's ancestor chain.
fn pkg_parent_data(
    loader: &mut Loader,
    name: &str,
    file: &FileCtx<'_>,
    seen: &[String],
) -> Result<ExtendedData> {
    let (pkg, model_name) = name.split_once('/').unwrap_or((name, ""));
    if model_name.is_empty() {
        return Err(GuildfileError::reference(
            file.path_desc(),
            format!("invalid model or config reference '{name}': missing model name"),
        ));
    }
    let Some(pkg_path) = find_pkg_guildfile(pkg, loader.search_path()) else {
        return Err(GuildfileError::reference(
            file.path_desc(),
            format!("cannot find guildfile for package '{pkg}'"),
        ));
    };
    let mut pkg_seen = seen.to_vec();
    pkg_seen.push(name.to_string());
    let pkg_guildfile = loader.for_file_seen(&pkg_path, &pkg_seen, false)?;
    let Some(parent_item) = modeldef_data(model_name, &pkg_guildfile.data) else {
        return Err(GuildfileError::reference(
            file.path_desc(),
            format!("undefined model or config '{model_name}' in package '{pkg}'"),
        ));
    };
    let pkg_ctx = FileCtx {
        src: pkg_guildfile.src.as_deref(),
        dir: pkg_guildfile.dir.as_deref(),
        items: &pkg_guildfile.data,
    };
    let parent_item = parent_item.clone();
    let mut extended = extended_data(loader, &parent_item, &pkg_ctx, &pkg_seen, false)?;
    extended.parents.push(Arc::clone(&pkg_guildfile));
    Ok(extended)
}

fn local_parent_data(
    loader: &mut Loader,
    name: &str,
    file: &FileCtx<'_>,
    seen: &[String],
) -> Result<ExtendedData> {
    let Some(parent_item) = modeldef_data(name, file.items) else {
        return Err(GuildfileError::reference(
            file.path_desc(),
            format!("undefined model or config '{name}'"),
        ));
    };
    let mut parent_seen = seen.to_vec();
    parent_seen.push(name.to_string());
    let parent_item = parent_item.clone();
    extended_data(loader, &parent_item, file, &parent_seen, false)
}

/// Find a model/config item by name in a coerced item list.
pub(crate) fn modeldef_data<'a>(name: &str, items: &'a [Mapping]) -> Option<&'a Mapping> {
    items
        .iter()
        .find(|item| section::item_name(item).as_deref() == Some(name))
}

/// Locate an installed package's guildfile on the module search path. The
/// package name maps to a directory path with `-` as `_` and `.` as a
/// separator.
fn find_pkg_guildfile(pkg: &str, search_path: &[PathBuf]) -> Option<PathBuf> {
    let segments: PathBuf = pkg.replace('-', "_").split('.').collect();
    for dir in search_path {
        debug!("looking for package '{}' in {}", pkg, dir.display());
        let candidate = crate::loader::guildfile_path(&dir.join(&segments));
        if candidate.exists() {
            debug!("found package guildfile {}", candidate.display());
            return Some(candidate);
        }
    }
    None
}

/// Fill any key present in `parent` but absent in `child`, recursing
/// through nested mappings. With `attrs` set, only whitelisted top-level
/// keys participate. Child values are never overwritten.
fn apply_parent_data(parent: &Mapping, child: &mut Mapping, attrs: Option<&[&str]>) {
    for (key, parent_val) in parent {
        if let Some(attrs) = attrs {
            let included = key
                .as_str()
                .is_some_and(|name| attrs.contains(&name));
            if !included {
                continue;
            }
        }
        match child.get_mut(key) {
            None => {
                child.insert(key.clone(), parent_val.clone());
            }
            Some(child_val) => {
                if let (Value::Mapping(parent_map), Value::Mapping(child_map)) =
                    (parent_val, child_val)
                {
                    apply_parent_data(parent_map, child_map, None);
                }
            }
        }
    }
}
