//! Loading entry points: files, directories, strings, and runs.
//!
//! A [`Loader`] owns everything that used to be ambient state: the module
//! search path that package references resolve against, the cache of
//! already-loaded files, and the hooks invoked around each load. Loaded
//! guildfiles are shared as [`Arc`] handles; a consumer that needs to
//! mutate one (flag merging, model-reference attachment) clones the
//! inner value first.

use crate::error::{GuildfileError, Result};
use crate::guildfile::Guildfile;
use crate::include::absolute;
use crate::opref::OpRef;
use serde_yaml::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// The configuration file name probed in directories and packages.
pub const GUILDFILE_NAME: &str = "guild.yml";

const STRING_SRC: &str = "<string>";

/// Whether a source is an in-memory marker rather than a file path.
pub fn is_string_source(src: &str) -> bool {
    src.starts_with('<') && src.ends_with('>')
}

/// The guildfile path for a directory.
pub fn guildfile_path(dir: &Path) -> PathBuf {
    dir.join(GUILDFILE_NAME)
}

/// Whether a directory contains a guildfile.
pub fn is_guildfile_dir(path: &Path) -> bool {
    guildfile_path(path).exists()
}

/// Read and parse a YAML file.
pub(crate) fn read_yaml(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|source| GuildfileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| GuildfileError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Hook invoked around each file load. Registered hooks run in order.
pub trait GuildfileHook {
    /// Called with the parsed data before resolution; may rewrite it.
    fn guildfile_data(&self, _data: &mut Value, _src: &str) {}

    /// Called with each fully resolved guildfile.
    fn guildfile_loaded(&self, _guildfile: &Guildfile) {}
}

/// Cache of loaded guildfiles keyed by absolute source path.
#[derive(Default)]
pub struct GuildfileCache {
    entries: HashMap<PathBuf, Arc<Guildfile>>,
}

impl GuildfileCache {
    fn get(&self, src: &Path) -> Option<Arc<Guildfile>> {
        self.entries.get(&absolute(src)).cloned()
    }

    fn put(&mut self, src: &Path, guildfile: Arc<Guildfile>) {
        self.entries.insert(absolute(src), guildfile);
    }

    /// Drop every cached entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Loads and resolves guildfiles.
pub struct Loader {
    search_path: Vec<PathBuf>,
    cache: GuildfileCache,
    hooks: Vec<Box<dyn GuildfileHook>>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// A loader with an empty search path and no hooks.
    pub fn new() -> Self {
        Self {
            search_path: Vec::new(),
            cache: GuildfileCache::default(),
            hooks: Vec::new(),
        }
    }

    /// Set the module search path used for dotted include and package
    /// references.
    pub fn with_search_path(mut self, search_path: Vec<PathBuf>) -> Self {
        self.search_path = search_path;
        self
    }

    /// Register a load hook. Hooks run in registration order.
    pub fn with_hook(mut self, hook: Box<dyn GuildfileHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// The module search path.
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// The guildfile cache.
    pub fn cache(&mut self) -> &mut GuildfileCache {
        &mut self.cache
    }

    /// Load the guildfile in a directory.
    pub fn for_dir(&mut self, path: &Path, no_cache: bool) -> Result<Arc<Guildfile>> {
        debug!("checking '{}' for model sources", path.display());
        let model_file = absolute(&guildfile_path(path));
        if model_file.is_file() {
            debug!("found model source '{}'", model_file.display());
            return self.for_file(&model_file, no_cache);
        }
        Err(GuildfileError::NoModels {
            path: path.display().to_string(),
        })
    }

    /// Load a guildfile from a file path.
    pub fn for_file(&mut self, src: &Path, no_cache: bool) -> Result<Arc<Guildfile>> {
        self.for_file_seen(src, &[], no_cache)
    }

    /// Load a file or a directory containing a guildfile.
    pub fn for_file_or_dir(&mut self, src: &Path, no_cache: bool) -> Result<Arc<Guildfile>> {
        if src.is_dir() {
            self.for_dir(src, no_cache)
        } else {
            self.for_file(src, no_cache)
        }
    }

    /// Resolve a guildfile from YAML text. Never cached.
    pub fn for_string(&mut self, s: &str, src: Option<&str>) -> Result<Guildfile> {
        let src = src.unwrap_or(STRING_SRC);
        let mut data: Value =
            serde_yaml::from_str(s).map_err(|source| GuildfileError::Parse {
                path: src.to_string(),
                source,
            })?;
        for hook in &self.hooks {
            hook.guildfile_data(&mut data, src);
        }
        let guildfile =
            Guildfile::build(self, data, Some(src), None, &mut Vec::new(), &[])?;
        for hook in &self.hooks {
            hook.guildfile_loaded(&guildfile);
        }
        Ok(guildfile)
    }

    /// Load the guildfile a run was started from.
    pub fn for_run(&mut self, run: &RunRef) -> Result<Arc<Guildfile>> {
        match run.opref.pkg_type.as_str() {
            "guildfile" => self.for_guildfile_ref(run),
            "package" => self.for_package_ref(&run.opref),
            other => Err(GuildfileError::Missing {
                reason: format!(
                    "unsupported package type '{}' for run {}",
                    other,
                    run.dir.display()
                ),
            }),
        }
    }

    fn for_guildfile_ref(&mut self, run: &RunRef) -> Result<Arc<Guildfile>> {
        let path = run.dir.join(&run.opref.pkg_name);
        if !path.exists() {
            return Err(GuildfileError::Missing {
                reason: format!("cannot find guildfile {}", path.display()),
            });
        }
        self.for_file(&path, false)
    }

    fn for_package_ref(&mut self, opref: &OpRef) -> Result<Arc<Guildfile>> {
        let segments: PathBuf = opref.pkg_name.split('.').collect();
        for dir in self.search_path.clone() {
            let candidate = guildfile_path(&dir.join(&segments));
            if candidate.exists() {
                return self.for_file(&candidate, false);
            }
        }
        Err(GuildfileError::Missing {
            reason: format!("cannot find package '{}'", opref.pkg_name),
        })
    }

    /// Load a file with an inherited extends chain. Used when a package
    /// parent pulls in its own guildfile mid-resolution so that extends
    /// cycles spanning files are still caught.
    pub(crate) fn for_file_seen(
        &mut self,
        src: &Path,
        extends_seen: &[String],
        no_cache: bool,
    ) -> Result<Arc<Guildfile>> {
        if !no_cache {
            if let Some(cached) = self.cache.get(src) {
                return Ok(cached);
            }
        }
        let mut data = read_yaml(src)?;
        let src_desc = src.display().to_string();
        for hook in &self.hooks {
            hook.guildfile_data(&mut data, &src_desc);
        }
        let guildfile = Guildfile::build(
            self,
            data,
            Some(&src_desc),
            None,
            &mut Vec::new(),
            extends_seen,
        )?;
        for hook in &self.hooks {
            hook.guildfile_loaded(&guildfile);
        }
        let guildfile = Arc::new(guildfile);
        if !no_cache {
            self.cache.put(src, Arc::clone(&guildfile));
        }
        Ok(guildfile)
    }
}

/// The coordinates a run records about its originating guildfile.
#[derive(Debug, Clone)]
pub struct RunRef {
    /// Run directory.
    pub dir: PathBuf,
    /// Operation reference recorded for the run.
    pub opref: OpRef,
}
