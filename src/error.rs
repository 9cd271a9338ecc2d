//! Error handling for guildfile resolution.
//!
//! Every failure in the engine is reported through a single typed family,
//! [`GuildfileError`]. Callers (CLI front ends, packaging tools) are
//! responsible for presentation and process exit status; nothing in this
//! crate retries, since configuration errors are deterministic.
//!
//! # Error Categories
//!
//! - **Schema errors** ([`GuildfileError::Schema`]) - missing required
//!   fields, wrong shapes, duplicate model names, items with zero or
//!   multiple type tags. Reported with the offending file and value.
//! - **Reference errors** ([`GuildfileError::Reference`],
//!   [`GuildfileError::IncludeNotFound`]) - an `$include`, `extends`, or
//!   file include that names something that cannot be found.
//! - **Cycle errors** ([`GuildfileError::Cycle`]) - include or extends
//!   cycles, reported with the full chain of names or files visited.
//! - **Load errors** ([`GuildfileError::Parse`], [`GuildfileError::Io`],
//!   [`GuildfileError::Missing`]) - the document could not be read at all.
//!
//! Non-fatal anomalies (unrecognized source-selection keys, unexpected
//! resource source attributes) are logged as warnings and never surface
//! here.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GuildfileError>;

/// Placeholder path used when a guildfile is built from in-memory data
/// with no source location at all.
pub const GENERATED_SRC: &str = "<generated>";

/// The error family for all guildfile resolution failures.
#[derive(Error, Debug)]
pub enum GuildfileError {
    /// The document violates the guildfile schema: a required field is
    /// missing, a value has the wrong shape, a model name is duplicated,
    /// or an item carries zero or multiple type tags.
    #[error("error in {path}: {reason}")]
    Schema {
        /// File in which the violation occurred.
        path: String,
        /// Description of the violation, including the offending value.
        reason: String,
    },

    /// The document defines no models. Kept distinct from [`Self::Schema`]
    /// so callers can special-case the empty-project situation.
    #[error("no models in {path}")]
    NoModels {
        /// Directory or file that was expected to define models.
        path: String,
    },

    /// An `$include` or `extends` reference names a target that cannot be
    /// located, or the reference itself is malformed.
    #[error("error in {path}: {reason}")]
    Reference {
        /// File containing the reference.
        path: String,
        /// Description including the reference string.
        reason: String,
    },

    /// A file-level or model-level resolution revisited something already
    /// on the current resolution path.
    #[error("error in {path}: {description} ({})", chain.join(" -> "))]
    Cycle {
        /// File in which the cycle was detected.
        path: String,
        /// Which mechanism cycled, e.g. `cycle in 'includes'`.
        description: String,
        /// The full path of names or files visited, ending with the repeat.
        chain: Vec<String>,
    },

    /// A top-level `include:` entry cannot be resolved to a file.
    #[error(
        "error in {path}: cannot find include '{reference}' (includes must \
         be local to the including guildfile or a package on the module \
         search path)"
    )]
    IncludeNotFound {
        /// File containing the include.
        path: String,
        /// The include reference as written.
        reference: String,
    },

    /// A guildfile was expected at a known location (run directory,
    /// installed package) but is not there.
    #[error("cannot find guildfile: {reason}")]
    Missing {
        /// Description of what was looked for and where.
        reason: String,
    },

    /// The document is not valid YAML.
    #[error("error in {path}: {source}")]
    Parse {
        /// File that failed to parse.
        path: String,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },

    /// The document or an included file could not be read.
    #[error("error reading {path}: {source}")]
    Io {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl GuildfileError {
    /// Build a schema error for `path` with a formatted reason.
    pub(crate) fn schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build a reference error for `path` with a formatted reason.
    pub(crate) fn reference(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Reference {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build a cycle error carrying the full visited chain.
    pub(crate) fn cycle(
        path: impl Into<String>,
        description: impl Into<String>,
        chain: Vec<String>,
    ) -> Self {
        Self::Cycle {
            path: path.into(),
            description: description.into(),
            chain,
        }
    }
}
