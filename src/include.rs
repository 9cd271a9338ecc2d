//! File-level include expansion.
//!
//! Before any model or package is constructed, top-level `include:` items
//! are replaced by the contents of the files they name. Targets are found
//! relative to the including file, as dotted references on the module
//! search path, or under the `gpkg.` package namespace. Expansion is
//! recursive and eager; the chain of files visited is threaded through
//! every level so cycles are reported with the full path.

use crate::coerce;
use crate::error::{GuildfileError, Result};
use crate::value;
use serde_yaml::Mapping;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Expand every `include` item in `items`, splicing the included files'
/// item lists in place. `included` is the visited-files chain used for
/// cycle detection, shared across the whole recursive expansion.
pub(crate) fn expand_data_includes(
    items: Vec<Mapping>,
    src: Option<&str>,
    dir: Option<&Path>,
    search_path: &[PathBuf],
    included: &mut Vec<PathBuf>,
    path_desc: &str,
) -> Result<Vec<Mapping>> {
    let mut expanded = Vec::with_capacity(items.len());
    for item in items {
        match value::get(&item, "include") {
            Some(includes) => {
                let refs =
                    coerce::string_or_list(includes.clone(), path_desc, "include")?;
                let mut new_items =
                    include_data(&refs, src, dir, search_path, included, path_desc)?;
                expanded.append(&mut new_items);
            }
            None => expanded.push(item),
        }
    }
    Ok(expanded)
}

fn include_data(
    refs: &[String],
    src: Option<&str>,
    dir: Option<&Path>,
    search_path: &[PathBuf],
    included: &mut Vec<PathBuf>,
    path_desc: &str,
) -> Result<Vec<Mapping>> {
    if let Some(src) = src {
        if !crate::loader::is_string_source(src) {
            let abs = absolute(Path::new(src));
            if !included.contains(&abs) {
                included.push(abs);
            }
        }
    }
    let mut result = Vec::new();
    for reference in refs {
        let target = find_include(reference, dir, search_path, path_desc)?;
        if included.contains(&target) {
            let mut chain: Vec<String> =
                included.iter().map(|p| p.display().to_string()).collect();
            chain.push(target.display().to_string());
            let origin = included
                .first()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| path_desc.to_string());
            return Err(GuildfileError::cycle(origin, "cycle in 'includes'", chain));
        }
        let data = crate::loader::read_yaml(&target)?;
        let target_desc = target.display().to_string();
        let items = coerce::guildfile_data(data, &target_desc)?;
        let target_dir = target.parent().map(Path::to_path_buf);
        let mut expanded = expand_data_includes(
            items,
            Some(&target_desc),
            target_dir.as_deref(),
            search_path,
            included,
            &target_desc,
        )?;
        result.append(&mut expanded);
    }
    Ok(result)
}

/// Resolve an include reference to a file: first relative to the including
/// file's directory, then as a dotted reference on the module search path,
/// then the same search under the `gpkg.` namespace.
fn find_include(
    reference: &str,
    dir: Option<&Path>,
    search_path: &[PathBuf],
    path_desc: &str,
) -> Result<PathBuf> {
    if let Some(path) = local_include(reference, dir) {
        return Ok(path);
    }
    if let Some(path) = search_path_include(reference, search_path) {
        return Ok(path);
    }
    if let Some(path) = search_path_include(&format!("gpkg.{reference}"), search_path) {
        return Ok(path);
    }
    Err(GuildfileError::IncludeNotFound {
        path: path_desc.to_string(),
        reference: reference.to_string(),
    })
}

fn local_include(reference: &str, dir: Option<&Path>) -> Option<PathBuf> {
    let base = dir.unwrap_or_else(|| Path::new(""));
    debug!("looking for include '{}' in {}", reference, base.display());
    let full = absolute(&base.join(reference));
    if full.exists() {
        debug!("found include {}", full.display());
        return Some(full);
    }
    None
}

fn search_path_include(reference: &str, search_path: &[PathBuf]) -> Option<PathBuf> {
    let segments: PathBuf = reference.split('.').collect();
    for dir in search_path {
        debug!("looking for include '{}' in {}", reference, dir.display());
        let candidate = crate::loader::guildfile_path(&dir.join(&segments));
        if candidate.exists() {
            debug!("found include {}", candidate.display());
            return Some(candidate);
        }
    }
    None
}

/// Absolute form of a path without resolving symlinks, tolerating paths
/// that do not exist yet.
pub(crate) fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
