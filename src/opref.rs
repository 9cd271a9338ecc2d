//! Fully qualified references to models and operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a model definition came from and what it is called there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    /// Source kind, e.g. `guildfile`, `package`, or `script`.
    pub pkg_type: String,
    /// Source identifier, e.g. a guildfile directory or package name.
    pub pkg_name: String,
    /// Source version.
    pub pkg_version: String,
    /// Model name within the source.
    pub model_name: String,
}

/// A [`ModelRef`] narrowed to one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpRef {
    /// Source kind.
    pub pkg_type: String,
    /// Source identifier.
    pub pkg_name: String,
    /// Source version.
    pub pkg_version: String,
    /// Model name within the source.
    pub model_name: String,
    /// Operation name within the model.
    pub op_name: String,
}

impl OpRef {
    /// Qualify a model reference with an operation name.
    pub fn for_op(op_name: &str, modelref: &ModelRef) -> Self {
        Self {
            pkg_type: modelref.pkg_type.clone(),
            pkg_name: modelref.pkg_name.clone(),
            pkg_version: modelref.pkg_version.clone(),
            model_name: modelref.model_name.clone(),
            op_name: op_name.to_string(),
        }
    }

    /// The `model:operation` display form used in run listings.
    pub fn to_opspec(&self) -> String {
        if self.model_name.is_empty() {
            self.op_name.clone()
        } else {
            format!("{}:{}", self.model_name, self.op_name)
        }
    }
}

impl fmt::Display for OpRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opspec())
    }
}
