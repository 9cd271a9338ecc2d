//! The resolved guildfile: top-level item dispatch and the package def.
//!
//! A [`Guildfile`] is the fully resolved form of one configuration file:
//! raw YAML is coerced to a list of typed items, file includes are spliced
//! in, and each item becomes a model definition or the package definition.
//! Construction happens through [`crate::loader::Loader`], which supplies
//! the module search path and the cache of already-loaded files.

use crate::error::{GuildfileError, Result, GENERATED_SRC};
use crate::loader::Loader;
use crate::model::ModelDef;
use crate::{coerce, extends, include, value};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

const DEFAULT_PKG_VERSION: &str = "0.0.0";

/// Borrowed view of a file being resolved, passed through the extends and
/// model-construction layers.
pub(crate) struct FileCtx<'a> {
    pub src: Option<&'a str>,
    pub dir: Option<&'a Path>,
    pub items: &'a [Mapping],
}

impl FileCtx<'_> {
    /// The path used in error messages: the source, else the directory,
    /// else the generated-content marker.
    pub fn path_desc(&self) -> String {
        self.src
            .map(str::to_string)
            .or_else(|| self.dir.map(|d| d.display().to_string()))
            .unwrap_or_else(|| GENERATED_SRC.to_string())
    }
}

/// One fully resolved configuration file.
#[derive(Debug)]
pub struct Guildfile {
    /// Source path, or a `<...>` marker for in-memory content.
    pub src: Option<String>,
    /// Directory includes and packages resolve against.
    pub dir: Option<PathBuf>,
    /// Coerced, include-expanded top-level items. Config items live here
    /// as include and extends targets.
    pub data: Vec<Mapping>,
    /// Model definitions in file order.
    pub models: Vec<ModelDef>,
    /// The package definition, when the file declares one.
    pub package: Option<PackageDef>,
}

impl Guildfile {
    pub(crate) fn build(
        loader: &mut Loader,
        data: Value,
        src: Option<&str>,
        dir: Option<&Path>,
        included: &mut Vec<PathBuf>,
        extends_seen: &[String],
    ) -> Result<Self> {
        let dir: Option<PathBuf> = match (dir, src) {
            (Some(dir), _) => Some(dir.to_path_buf()),
            (None, Some(src)) if !crate::loader::is_string_source(src) => {
                Path::new(src).parent().map(Path::to_path_buf)
            }
            (None, Some(_)) => None,
            (None, None) => {
                return Err(GuildfileError::Missing {
                    reason: "either src or dir must be specified".to_string(),
                });
            }
        };
        let path_desc = src
            .map(str::to_string)
            .or_else(|| dir.as_ref().map(|d| d.display().to_string()))
            .unwrap_or_else(|| GENERATED_SRC.to_string());

        let coerced = coerce::guildfile_data(data, &path_desc)?;
        let items = include::expand_data_includes(
            coerced,
            src,
            dir.as_deref(),
            loader.search_path(),
            included,
            &path_desc,
        )?;

        let ctx = FileCtx {
            src,
            dir: dir.as_deref(),
            items: &items,
        };
        let mut models: Vec<ModelDef> = Vec::new();
        let mut package = None;
        let mut has_config = false;
        for item in &items {
            let (item_type, name) = validated_item_type(item, &path_desc)?;
            match item_type {
                "model" => {
                    if models.iter().any(|m| m.name == name) {
                        return Err(GuildfileError::schema(
                            &path_desc,
                            format!("duplicate model '{name}'"),
                        ));
                    }
                    let extended =
                        extends::extended_data(loader, item, &ctx, extends_seen, true)?;
                    models.push(ModelDef::new(&name, extended, &ctx)?);
                }
                "package" => {
                    if package.is_some() {
                        return Err(GuildfileError::schema(
                            &path_desc,
                            "multiple package definitions".to_string(),
                        ));
                    }
                    package = Some(PackageDef::new(&name, item, &path_desc)?);
                }
                "config" => has_config = true,
                _ => {}
            }
        }
        if models.is_empty() && package.is_none() && !has_config {
            return Err(GuildfileError::NoModels { path: path_desc });
        }
        Ok(Self {
            src: src.map(str::to_string),
            dir,
            data: items,
            models,
            package,
        })
    }

    /// The path used in error messages and logs.
    pub fn path_desc(&self) -> String {
        self.src
            .clone()
            .or_else(|| self.dir.as_ref().map(|d| d.display().to_string()))
            .unwrap_or_else(|| GENERATED_SRC.to_string())
    }

    /// Look up a model by name.
    pub fn model(&self, name: &str) -> Option<&ModelDef> {
        self.models.iter().find(|m| m.name == name)
    }

    /// The default model: the only model, else an explicitly flagged one.
    pub fn default_model(&self) -> Option<&ModelDef> {
        if self.models.len() == 1 {
            return Some(&self.models[0]);
        }
        self.models.iter().find(|m| m.default)
    }

    /// The default model's default operation.
    pub fn default_operation(&self) -> Option<&crate::model::OpDef> {
        self.default_model().and_then(ModelDef::default_operation)
    }
}

/// An item's type tag and name. Exactly one type attribute must be
/// present and its value must be a string.
fn validated_item_type(item: &Mapping, path: &str) -> Result<(&'static str, String)> {
    let used: Vec<&str> = coerce::ALL_TYPES
        .into_iter()
        .filter(|attr| value::has(item, attr))
        .collect();
    let item_type = match used.as_slice() {
        [] => {
            return Err(GuildfileError::schema(
                path,
                format!(
                    "missing required type (one of: {}) in {}",
                    coerce::ALL_TYPES.join(", "),
                    value::desc(&Value::Mapping(item.clone()))
                ),
            ));
        }
        [one] => *one,
        many => {
            return Err(GuildfileError::schema(
                path,
                format!(
                    "multiple types ({}) in {}",
                    many.join(", "),
                    value::desc(&Value::Mapping(item.clone()))
                ),
            ));
        }
    };
    let name_val = value::get(item, item_type).unwrap_or(&Value::Null);
    let Some(name) = name_val.as_str() else {
        return Err(GuildfileError::schema(
            path,
            format!(
                "invalid {item_type} name {}: expected a string",
                value::desc(name_val)
            ),
        ));
    };
    Ok((item_type, name.to_string()))
}

/// Distribution metadata declared by a `package` item.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDef {
    /// Package name.
    pub name: String,
    /// Trimmed description.
    pub description: String,
    /// Version string; numbers coerce to their string form.
    pub version: String,
    /// Project URL.
    pub url: Option<String>,
    /// Author name.
    pub author: Option<String>,
    /// Author contact email.
    pub author_email: Option<String>,
    /// License identifier.
    pub license: Option<String>,
    /// Index tags.
    pub tags: Vec<String>,
    /// Extra data files included in the distribution.
    pub data_files: Vec<String>,
    /// Packages this one depends on.
    pub requires: Vec<String>,
}

impl PackageDef {
    fn new(name: &str, data: &Mapping, path: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            description: value::get(data, "description")
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim()
                .to_string(),
            version: match value::get(data, "version") {
                None | Some(Value::Null) => DEFAULT_PKG_VERSION.to_string(),
                Some(val) => value::stringify(val),
            },
            url: value::as_opt_str(value::get(data, "url")),
            author: value::as_opt_str(value::get(data, "author")),
            author_email: value::as_opt_str(value::get(data, "author-email")),
            license: value::as_opt_str(value::get(data, "license")),
            tags: coerce::string_or_list(
                value::get(data, "tags").cloned().unwrap_or(Value::Null),
                path,
                "tags",
            )?,
            data_files: coerce::string_or_list(
                value::get(data, "data-files").cloned().unwrap_or(Value::Null),
                path,
                "data-files",
            )?,
            requires: coerce::string_or_list(
                value::get(data, "requires").cloned().unwrap_or(Value::Null),
                path,
                "requires",
            )?,
        })
    }
}
