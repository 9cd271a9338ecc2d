//! Declarative project-configuration resolution.
//!
//! A guildfile (`guild.yml`) describes models, their operations, flags,
//! and resource dependencies. This crate turns such a document into a
//! fully resolved object graph:
//!
//! 1. **Coercion** - flexible input shapes (bare strings for operations,
//!    bare values for flags, string-or-list slots) are normalized into
//!    canonical mappings.
//! 2. **File includes** - top-level `include:` items are replaced by the
//!    contents of the files they name, recursively, with cycle detection.
//! 3. **Inheritance** - `extends` chains are resolved depth-first and a
//!    whitelist of attributes is merged parent-into-child, never
//!    overwriting child values.
//! 4. **Parameters** - `{{name}}` templates are substituted from each
//!    model's `params` table, resolved to a fixed point.
//! 5. **Section includes** - `$include` entries inside `flags`,
//!    `operations`, and `resources` tables graft sections from other
//!    models or operations, with local entries taking precedence.
//!
//! The result is a [`Guildfile`] of [`ModelDef`]s, each carrying
//! [`OpDef`]s, [`FlagDef`]s, and [`ResourceDef`]s. Loading goes through a
//! [`Loader`], which owns the module search path, the file cache, and any
//! registered [`GuildfileHook`]s.
//!
//! ```no_run
//! use guildfile::Loader;
//!
//! let mut loader = Loader::new();
//! let gf = loader.for_dir(std::path::Path::new("."), false)?;
//! for model in &gf.models {
//!     for op in &model.operations {
//!         println!("{}", op.fullname());
//!     }
//! }
//! # Ok::<(), guildfile::GuildfileError>(())
//! ```

mod coerce;
mod extends;
mod include;
mod params;
mod section;
mod value;

pub mod error;
pub mod guildfile;
pub mod loader;
pub mod model;
pub mod opref;
pub mod resources;

pub use error::{GuildfileError, Result, GENERATED_SRC};
pub use guildfile::{Guildfile, PackageDef};
pub use loader::{
    guildfile_path, is_guildfile_dir, is_string_source, GuildfileCache, GuildfileHook,
    Loader, RunRef, GUILDFILE_NAME,
};
pub use model::{
    FileSelectDef, FileSelectSpec, FileSelectType, FlagChoice, FlagDef, FlagsImport,
    ModelDef, OpDef, OpDependencyDef, OptimizerDef, PluginList, PublishDef,
};
pub use opref::{ModelRef, OpRef};
pub use resources::{RenameSpec, ResourceDef, ResourceSource, SelectReduce, SelectSpec};

#[cfg(test)]
mod coerce_tests;
#[cfg(test)]
mod extends_tests;
#[cfg(test)]
mod params_tests;
