//! The canonical object model: models, operations, flags, and their
//! auxiliary definitions.
//!
//! Everything here is constructed from fully coerced, include-expanded,
//! extends-merged, parameter-resolved data, and is read-mostly thereafter.
//! The only sanctioned post-construction mutations are
//! [`OpDef::set_modelref`], [`OpDef::merge_flags`], and
//! [`OpDef::set_flag_value`], which exist for operation-reference
//! attachment and flag-import plugins.

use crate::error::{GuildfileError, Result};
use crate::guildfile::{FileCtx, Guildfile};
use crate::opref::{ModelRef, OpRef};
use crate::resources::ResourceDef;
use crate::section::{self, SectionScope};
use crate::{coerce, extends, params, value};
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// A plugin allow-list: absent, explicitly disabled, or a list of names.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginList {
    /// `plugins: no` - plugins are disabled outright.
    Disabled,
    /// An explicit list of plugin names.
    Names(Vec<String>),
}

pub(crate) fn init_plugins(data: Option<&Value>, path: &str) -> Result<Option<PluginList>> {
    match data {
        None | Some(Value::Null) => Ok(None),
        Some(val) if value::explicit_no(val) => Ok(Some(PluginList::Disabled)),
        Some(val) => Ok(Some(PluginList::Names(coerce::string_or_list(
            val.clone(),
            path,
            "plugins",
        )?))),
    }
}

/// A flags-import directive: import everything discovered, or exactly the
/// named flags. "Import none" is `Names([])`.
#[derive(Debug, Clone, PartialEq)]
pub enum FlagsImport {
    /// Import every discovered flag.
    All,
    /// Import exactly these flags.
    Names(Vec<String>),
}

fn init_flags_import(data: Option<&Value>, path: &str) -> Result<Option<FlagsImport>> {
    match data {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(true)) => Ok(Some(FlagsImport::All)),
        Some(val) => Ok(Some(FlagsImport::Names(coerce::string_or_list(
            val.clone(),
            path,
            "flags-import",
        )?))),
    }
}

///////////////////////////////////////////////////////////////////////
// Model def
///////////////////////////////////////////////////////////////////////

/// A named bundle of operations, resources, flags, and parameters. An
/// empty-string name denotes the anonymous/default model.
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// Model name; empty for the anonymous model.
    pub name: String,
    /// Explicitly flagged as the default model.
    pub default: bool,
    /// Trimmed description.
    pub description: String,
    /// Free-form reference strings.
    pub references: Vec<String>,
    /// Resolved parameter table.
    pub params: Mapping,
    /// Operations, ordered by name.
    pub operations: Vec<OpDef>,
    /// Resources, ordered by name.
    pub resources: Vec<ResourceDef>,
    /// Ancestor guildfiles reachable via `extends`, deduplicated by
    /// directory, used to scope section-include search.
    pub parents: Vec<Arc<Guildfile>>,
    /// Plugin allow-list.
    pub plugins: Option<PluginList>,
    /// Free-form extra attributes.
    pub extra: Mapping,
    /// Default source-file selection rules.
    pub sourcecode: FileSelectDef,
    /// Coerced `operation-defaults` applied to every operation's data.
    pub op_default_config: Mapping,
}

impl ModelDef {
    pub(crate) fn new(
        name: &str,
        extended: extends::ExtendedData,
        file: &FileCtx<'_>,
    ) -> Result<Self> {
        let data = &extended.data;
        let path = file.path_desc();
        let parents = dedup_parents(extended.parents);

        let op_default_config = init_op_default_config(data, &path)?;

        let own_scope = SectionScope {
            items: file.items,
            path: path.clone(),
        };
        let parent_scopes: Vec<SectionScope<'_>> = parents
            .iter()
            .map(|p| SectionScope {
                items: &p.data,
                path: p.path_desc(),
            })
            .collect();
        let mut scopes = vec![own_scope];
        scopes.extend(parent_scopes);

        let operations = init_ops(data, name, &op_default_config, &scopes, &path)?;
        let resources = init_resources(data, name, &scopes, &path)?;

        Ok(Self {
            name: name.to_string(),
            default: value::get(data, "default").is_some_and(value::truthy),
            description: description_of(data),
            references: coerce::string_or_list(
                value::get(data, "references").cloned().unwrap_or(Value::Null),
                &path,
                "references",
            )?,
            params: params::resolved_params(data),
            operations,
            resources,
            parents,
            plugins: init_plugins(value::get(data, "plugins"), &path)?,
            extra: match value::get(data, "extra") {
                Some(Value::Mapping(map)) => map.clone(),
                _ => Mapping::new(),
            },
            sourcecode: FileSelectDef::new(
                value::get(data, "sourcecode").unwrap_or(&Value::Null),
                &path,
            )?,
            op_default_config,
        })
    }

    /// Look up an operation by name.
    pub fn operation(&self, name: &str) -> Option<&OpDef> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Look up a resource by name.
    pub fn resource(&self, name: &str) -> Option<&ResourceDef> {
        self.resources.iter().find(|res| res.name == name)
    }

    /// The default operation: an explicitly flagged one, else the single
    /// public (non-underscore-prefixed) operation.
    pub fn default_operation(&self) -> Option<&OpDef> {
        let mut public_ops = Vec::new();
        for op in &self.operations {
            if op.default {
                return Some(op);
            }
            if !op.name.starts_with('_') {
                public_ops.push(op);
            }
        }
        match public_ops.len() {
            1 => Some(public_ops[0]),
            _ => None,
        }
    }
}

impl PartialEq for ModelDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

fn description_of(data: &Mapping) -> String {
    value::get(data, "description")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string()
}

fn init_op_default_config(data: &Mapping, path: &str) -> Result<Mapping> {
    let Some(config) = value::get(data, "operation-defaults") else {
        return Ok(Mapping::new());
    };
    if !value::truthy(config) {
        return Ok(Mapping::new());
    }
    match coerce::operation("operation-defaults", config.clone(), path)? {
        Value::Mapping(map) => Ok(map),
        other => Err(GuildfileError::schema(
            path,
            format!(
                "invalid operation-defaults value {}: expected a mapping",
                value::desc(&other)
            ),
        )),
    }
}

fn dedup_parents(parents: Vec<Arc<Guildfile>>) -> Vec<Arc<Guildfile>> {
    let mut seen = HashSet::new();
    let mut deduped = Vec::new();
    for parent in parents {
        let key = parent
            .dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        if seen.insert(key) {
            deduped.push(parent);
        }
    }
    deduped
}

fn init_ops(
    data: &Mapping,
    model_name: &str,
    op_defaults: &Mapping,
    scopes: &[SectionScope<'_>],
    path: &str,
) -> Result<Vec<OpDef>> {
    let ops_data = section::resolve_includes(data, "operations", scopes)?;
    let mut names = value::keys(&ops_data);
    names.sort();
    names
        .iter()
        .map(|name| {
            let op_data = value::get(&ops_data, name).cloned().unwrap_or(Value::Null);
            OpDef::new(name, op_data, model_name, op_defaults, scopes, path)
        })
        .collect()
}

fn init_resources(
    data: &Mapping,
    model_name: &str,
    scopes: &[SectionScope<'_>],
    path: &str,
) -> Result<Vec<ResourceDef>> {
    let res_data = section::resolve_includes(data, "resources", scopes)?;
    let mut names = value::keys(&res_data);
    names.sort();
    names
        .iter()
        .map(|name| {
            let data = value::get(&res_data, name).cloned().unwrap_or(Value::Null);
            ResourceDef::new(Some(name.as_str()), &data, model_name, path)
        })
        .collect()
}

///////////////////////////////////////////////////////////////////////
// Op def
///////////////////////////////////////////////////////////////////////

/// A single named, runnable recipe belonging to a model.
#[derive(Debug, Clone)]
pub struct OpDef {
    /// Operation name, unique within its model.
    pub name: String,
    /// Owning model's name.
    pub model_name: String,
    /// Explicitly flagged as the model's default operation.
    pub default: bool,
    /// Trimmed description.
    pub description: String,
    /// Raw command line to execute.
    pub exec: Option<String>,
    /// Module/script spec to run.
    pub main: Option<String>,
    /// Raw step data for workflow operations; step `flags` have had
    /// `$include` references resolved and values flattened.
    pub steps: Option<Vec<Value>>,
    /// Process environment additions.
    pub env: Mapping,
    /// Reference to an environment-secrets source.
    pub env_secrets: Option<String>,
    /// Plugin allow-list.
    pub plugins: Option<PluginList>,
    /// Resource dependencies (`requires`).
    pub dependencies: Vec<OpDependencyDef>,
    /// Whether the operation may be stopped and resumed.
    pub stoppable: bool,
    /// Run label template.
    pub label: Option<String>,
    /// Run tags.
    pub tags: Vec<String>,
    /// Comparison column spec.
    pub compare: Option<Value>,
    /// Optimization objective.
    pub objective: Option<Value>,
    /// Default max trials for batch runs.
    pub default_max_trials: Option<i64>,
    /// Output capture specs.
    pub output_capture: Option<Vec<Value>>,
    /// Optimizers, ordered by name.
    pub optimizers: Vec<OptimizerDef>,
    /// Publish spec.
    pub publish: PublishDef,
    /// Source-file selection rules.
    pub sourcecode: FileSelectDef,
    /// Flags, ordered by name.
    pub flags: Vec<FlagDef>,
    /// Where imported flag values land.
    pub flags_dest: Option<String>,
    /// Flag-import directive.
    pub flags_import: Option<FlagsImport>,
    /// Flags to skip during import.
    pub flags_import_skip: Vec<String>,
    /// Custom flag encoder spec.
    pub flag_encoder: Option<String>,
    /// Skip default flag-to-arg encoding.
    pub default_flag_arg_skip: bool,
    /// Delete the run automatically on success.
    pub delete_on_success: bool,
    /// Operation supports staged trials.
    pub can_stage_trials: bool,
    /// Extra run attributes.
    pub run_attrs: Option<Mapping>,
    flag_vals: Mapping,
    modelref: Option<ModelRef>,
}

impl OpDef {
    pub(crate) fn new(
        name: &str,
        data: Value,
        model_name: &str,
        op_defaults: &Mapping,
        scopes: &[SectionScope<'_>],
        path: &str,
    ) -> Result<Self> {
        let Value::Mapping(mut data) = data else {
            return Err(GuildfileError::schema(
                path,
                format!(
                    "invalid operation def {}: expected a mapping",
                    value::desc(&data)
                ),
            ));
        };
        apply_op_default_config(op_defaults, &mut data);

        let flags = init_flags(&data, scopes, path)?;
        let flag_vals = init_flag_values(&flags);

        Ok(Self {
            name: name.to_string(),
            model_name: model_name.to_string(),
            default: value::get(&data, "default").is_some_and(value::truthy),
            description: description_of(&data),
            exec: value::as_opt_str(value::get(&data, "exec")),
            main: value::as_opt_str(value::get(&data, "main")),
            steps: init_steps(&data, scopes, path)?,
            env: match value::get(&data, "env") {
                Some(Value::Mapping(map)) => map.clone(),
                _ => Mapping::new(),
            },
            env_secrets: value::as_opt_str(value::get(&data, "env-secrets")),
            plugins: init_plugins(value::get(&data, "plugins"), path)?,
            dependencies: init_dependencies(&data, model_name, path)?,
            stoppable: value::get(&data, "stoppable").is_some_and(value::truthy),
            label: value::as_opt_str(value::get(&data, "label")),
            tags: coerce::string_or_list(
                value::get(&data, "tags").cloned().unwrap_or(Value::Null),
                path,
                "tags",
            )?,
            compare: value::get(&data, "compare").cloned().filter(|v| !v.is_null()),
            objective: value::get(&data, "objective").cloned().filter(|v| !v.is_null()),
            default_max_trials: value::get(&data, "default-max-trials").and_then(Value::as_i64),
            output_capture: match value::get(&data, "output-capture") {
                Some(Value::Sequence(items)) => Some(items.clone()),
                _ => None,
            },
            optimizers: init_optimizers(&data, name, path)?,
            publish: PublishDef::new(value::get(&data, "publish"), path)?,
            sourcecode: FileSelectDef::new(
                value::get(&data, "sourcecode").unwrap_or(&Value::Null),
                path,
            )?,
            flags,
            flags_dest: value::as_opt_str(value::get(&data, "flags-dest")),
            flags_import: init_flags_import(value::get(&data, "flags-import"), path)?,
            flags_import_skip: coerce::string_or_list(
                value::get(&data, "flags-import-skip")
                    .cloned()
                    .unwrap_or(Value::Null),
                path,
                "flags-import-skip",
            )?,
            flag_encoder: value::as_opt_str(value::get(&data, "flag-encoder")),
            default_flag_arg_skip: value::get(&data, "default-flag-arg-skip")
                .is_some_and(value::truthy),
            delete_on_success: value::get(&data, "delete-on-success")
                .is_some_and(value::truthy),
            can_stage_trials: value::get(&data, "can-stage-trials")
                .is_some_and(value::truthy),
            run_attrs: match value::get(&data, "run-attrs") {
                Some(Value::Mapping(map)) => Some(map.clone()),
                _ => None,
            },
            flag_vals,
            modelref: None,
        })
    }

    /// Fully qualified name, `model:operation` for named models.
    pub fn fullname(&self) -> String {
        if self.model_name.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.model_name, self.name)
        }
    }

    /// Look up a flag definition by name.
    pub fn flagdef(&self, name: &str) -> Option<&FlagDef> {
        self.flags.iter().find(|f| f.name == name)
    }

    /// Current flag value table. With `include_none` false, null-valued
    /// flags are omitted.
    pub fn flag_values(&self, include_none: bool) -> Mapping {
        self.flag_vals
            .iter()
            .filter(|(_, v)| include_none || !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Sanctioned mutation point: override one flag value.
    pub fn set_flag_value(&mut self, name: &str, val: Value) {
        value::set(&mut self.flag_vals, name, val);
    }

    /// Read one flag value.
    pub fn flag_value(&self, name: &str) -> Option<&Value> {
        value::get(&self.flag_vals, name)
    }

    /// Attach the model reference used to build [`Self::opref`]. Must be
    /// called before `opref` is read.
    pub fn set_modelref(&mut self, modelref: ModelRef) {
        self.modelref = Some(modelref);
    }

    /// Fully qualified operation reference, available once a model
    /// reference has been attached.
    pub fn opref(&self) -> Option<OpRef> {
        self.modelref
            .as_ref()
            .map(|mr| OpRef::for_op(&self.name, mr))
    }

    /// Sanctioned mutation point for flag-import plugins: merge flags
    /// discovered elsewhere into this operation. Local flag attributes
    /// take precedence; discovered attributes only fill baseline values.
    pub fn merge_flags(&mut self, other: &OpDef) {
        let mut merged: Vec<FlagDef> = Vec::new();
        for other_flag in &other.flags {
            match self.mergeable_flagdef(&other_flag.name) {
                None => merged.push(other_flag.clone()),
                Some(own) => {
                    let mut own = own.clone();
                    own.apply_missing_attrs(other_flag);
                    merged.push(own);
                }
            }
        }
        for own_flag in &self.flags {
            if !merged.iter().any(|f| f.name == own_flag.name) {
                merged.push(own_flag.clone());
            }
        }
        merged.sort_by(|a, b| a.name.cmp(&b.name));
        self.flag_vals = init_flag_values(&merged);
        self.flags = merged;
    }

    /// A flag that can merge under `name`, considering arg-name aliases.
    fn mergeable_flagdef(&self, name: &str) -> Option<&FlagDef> {
        self.flagdef(name).or_else(|| {
            self.flags
                .iter()
                .find(|f| f.arg_name.as_deref() == Some(name))
        })
    }

    /// The default optimizer: an explicitly flagged one, else the first.
    pub fn default_optimizer(&self) -> Option<&OptimizerDef> {
        self.optimizers
            .iter()
            .find(|opt| opt.default)
            .or_else(|| self.optimizers.first())
    }

    /// Look up an optimizer by name.
    pub fn optimizer(&self, name: &str) -> Option<&OptimizerDef> {
        self.optimizers.iter().find(|opt| opt.name == name)
    }
}

impl PartialEq for OpDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Fill keys from the model's `operation-defaults` into an operation's
/// data, never overwriting explicit values.
fn apply_op_default_config(config: &Mapping, data: &mut Mapping) {
    for (key, val) in config {
        if !data.contains_key(key) {
            data.insert(key.clone(), val.clone());
        }
    }
}

fn init_flags(
    data: &Mapping,
    scopes: &[SectionScope<'_>],
    path: &str,
) -> Result<Vec<FlagDef>> {
    let flags_data = section::resolve_includes(data, "flags", scopes)?;
    let mut names = value::keys(&flags_data);
    names.sort();
    names
        .iter()
        .map(|name| {
            let flag_data = value::get(&flags_data, name).cloned().unwrap_or(Value::Null);
            FlagDef::new(name, &flag_data, path)
        })
        .collect()
}

fn init_flag_values(flags: &[FlagDef]) -> Mapping {
    flags
        .iter()
        .map(|f| (Value::String(f.name.clone()), f.default.clone()))
        .collect()
}

/// Step data passes through mostly raw; mapping steps get their `flags`
/// section-include resolved and flattened to plain values.
fn init_steps(
    data: &Mapping,
    scopes: &[SectionScope<'_>],
    path: &str,
) -> Result<Option<Vec<Value>>> {
    let steps_data = match value::get(data, "steps") {
        None | Some(Value::Null) => return Ok(None),
        Some(val) if !value::truthy(val) => return Ok(None),
        Some(Value::Sequence(items)) => items.clone(),
        Some(other) => {
            return Err(GuildfileError::schema(
                path,
                format!(
                    "invalid steps data {}: expected a list",
                    value::desc(other)
                ),
            ));
        }
    };
    let steps = steps_data
        .into_iter()
        .map(|step| step_data(step, scopes))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(steps))
}

fn step_data(step: Value, scopes: &[SectionScope<'_>]) -> Result<Value> {
    let Value::Mapping(mut map) = step else {
        return Ok(step);
    };
    let flags_data = section::resolve_includes(&map, "flags", scopes)?;
    if !flags_data.is_empty() {
        let flattened: Mapping = flags_data
            .into_iter()
            .map(|(k, v)| (k, step_flag_value(v)))
            .collect();
        value::set(&mut map, "flags", Value::Mapping(flattened));
    }
    Ok(Value::Mapping(map))
}

fn step_flag_value(val: Value) -> Value {
    match val {
        Value::Mapping(map) => value::get(&map, "default").cloned().unwrap_or(Value::Null),
        other => other,
    }
}

///////////////////////////////////////////////////////////////////////
// Dependencies
///////////////////////////////////////////////////////////////////////

/// An operation dependency: either a named reference to a resource or an
/// inline resource definition.
#[derive(Debug, Clone)]
pub enum OpDependencyDef {
    /// Reference to a resource by name or spec string.
    Spec {
        /// The resource spec string.
        spec: String,
        /// Optional description.
        description: String,
    },
    /// A resource defined inline in the dependency itself.
    Inline(ResourceDef),
}

impl OpDependencyDef {
    fn new(data: &Value, model_name: &str, path: &str) -> Result<Self> {
        match data {
            Value::String(spec) => Ok(Self::Spec {
                spec: spec.clone(),
                description: String::new(),
            }),
            Value::Mapping(map) => match value::get(map, "resource") {
                Some(spec) => Ok(Self::Spec {
                    spec: value::stringify(spec),
                    description: value::get(map, "description")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                }),
                None => Ok(Self::Inline(init_inline_resource(map, model_name, path)?)),
            },
            other => Err(GuildfileError::schema(
                path,
                format!(
                    "invalid dependency value {}: expected a string or mapping",
                    value::desc(other)
                ),
            )),
        }
    }

    /// The dependency's name: the spec string or the inline resource name.
    pub fn name(&self) -> &str {
        match self {
            Self::Spec { spec, .. } => spec,
            Self::Inline(res) => &res.name,
        }
    }
}

fn init_dependencies(
    data: &Mapping,
    model_name: &str,
    path: &str,
) -> Result<Vec<OpDependencyDef>> {
    let requires = match value::get(data, "requires") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Sequence(items)) => items.clone(),
        Some(single) => vec![single.clone()],
    };
    requires
        .iter()
        .map(|dep| OpDependencyDef::new(dep, model_name, path))
        .collect()
}

fn init_inline_resource(data: &Mapping, model_name: &str, path: &str) -> Result<ResourceDef> {
    let coerced = coerce_inline_resource_data(data);
    let name = value::get(&coerced, "name").and_then(Value::as_str).map(str::to_string);
    ResourceDef::new(name.as_deref(), &Value::Mapping(coerced), model_name, path)
}

/// Inline dependency data without an explicit `sources` list is itself a
/// single source; a source-level `flag-name` is promoted to the resource.
fn coerce_inline_resource_data(data: &Mapping) -> Mapping {
    if value::has(data, "sources") {
        return data.clone();
    }
    let mut source = data.clone();
    let flag_name = value::get(&source, "flag-name").cloned();
    if flag_name.is_some() {
        source = source
            .into_iter()
            .filter(|(k, _)| k.as_str() != Some("flag-name"))
            .collect();
    }
    let mut coerced = Mapping::new();
    value::set(&mut coerced, "sources", Value::Sequence(vec![Value::Mapping(source)]));
    if let Some(flag_name) = flag_name {
        value::set(&mut coerced, "flag-name", flag_name);
    }
    coerced
}

///////////////////////////////////////////////////////////////////////
// Flag def
///////////////////////////////////////////////////////////////////////

/// A typed, defaultable named input to an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagDef {
    /// Flag name.
    pub name: String,
    /// Default value; null when none.
    pub default: Value,
    /// Description.
    pub description: String,
    /// Value type hint.
    pub flag_type: Option<String>,
    /// Whether a value is required.
    pub required: bool,
    /// Argument name override.
    pub arg_name: Option<String>,
    /// Skip encoding this flag as an argument.
    pub arg_skip: Option<bool>,
    /// Encode as a boolean switch with this value.
    pub arg_switch: Option<Value>,
    /// Split the value into multiple arguments.
    pub arg_split: Option<Value>,
    /// Allowed choices.
    pub choices: Vec<FlagChoice>,
    /// Allow values outside the choices.
    pub allow_other: bool,
    /// Environment variable name override.
    pub env_name: Option<String>,
    /// Label shown for null values.
    pub null_label: Option<String>,
    /// Minimum value.
    pub min: Option<Value>,
    /// Maximum value.
    pub max: Option<Value>,
    /// Search distribution hint.
    pub distribution: Option<String>,
    /// Unclaimed attributes.
    pub extra: Mapping,
}

const FLAG_ATTRS: [&str; 16] = [
    "default",
    "description",
    "type",
    "required",
    "arg-name",
    "arg-skip",
    "arg-switch",
    "arg-split",
    "choices",
    "allow-other",
    "env-name",
    "null-label",
    "min",
    "max",
    "distribution",
    "name",
];

impl FlagDef {
    pub(crate) fn new(name: &str, data: &Value, path: &str) -> Result<Self> {
        let Value::Mapping(data) = data else {
            return Err(GuildfileError::schema(
                path,
                format!("invalid flag data {}: expected a mapping", value::desc(data)),
            ));
        };
        let extra: Mapping = data
            .iter()
            .filter(|(k, _)| {
                !k.as_str().is_some_and(|name| FLAG_ATTRS.contains(&name))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self {
            name: name.to_string(),
            default: value::get(data, "default").cloned().unwrap_or(Value::Null),
            description: value::get(data, "description")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            flag_type: value::as_opt_str(value::get(data, "type")),
            required: value::get(data, "required").is_some_and(value::truthy),
            arg_name: value::as_opt_str(value::get(data, "arg-name")),
            arg_skip: value::get(data, "arg-skip").map(value::truthy),
            arg_switch: value::get(data, "arg-switch").cloned().filter(|v| !v.is_null()),
            arg_split: value::get(data, "arg-split").cloned().filter(|v| !v.is_null()),
            choices: init_flag_choices(value::get(data, "choices"), name, path)?,
            allow_other: value::get(data, "allow-other").is_some_and(value::truthy),
            env_name: value::as_opt_str(value::get(data, "env-name")),
            null_label: value::as_opt_str(value::get(data, "null-label")),
            min: value::get(data, "min").cloned().filter(|v| !v.is_null()),
            max: value::get(data, "max").cloned().filter(|v| !v.is_null()),
            distribution: value::as_opt_str(value::get(data, "distribution")),
            extra,
        })
    }

    fn baseline() -> Self {
        Self {
            name: String::new(),
            default: Value::Null,
            description: String::new(),
            flag_type: None,
            required: false,
            arg_name: None,
            arg_skip: None,
            arg_switch: None,
            arg_split: None,
            choices: Vec::new(),
            allow_other: false,
            env_name: None,
            null_label: None,
            min: None,
            max: None,
            distribution: None,
            extra: Mapping::new(),
        }
    }

    /// Fill any attribute that still carries its baseline value from
    /// `src`. Used by [`OpDef::merge_flags`] so local attributes win.
    fn apply_missing_attrs(&mut self, src: &Self) {
        let baseline = Self::baseline();
        macro_rules! fill {
            ($field:ident) => {
                if self.$field == baseline.$field {
                    self.$field = src.$field.clone();
                }
            };
        }
        fill!(default);
        fill!(description);
        fill!(flag_type);
        fill!(required);
        fill!(arg_name);
        fill!(arg_skip);
        fill!(arg_switch);
        fill!(arg_split);
        fill!(choices);
        fill!(allow_other);
        fill!(env_name);
        fill!(null_label);
        fill!(min);
        fill!(max);
        fill!(distribution);
        fill!(extra);
    }
}

/// One allowed value of a flag, optionally carrying flag overrides that
/// apply when the choice is selected.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagChoice {
    /// The choice value.
    pub value: Value,
    /// Description.
    pub description: String,
    /// Flag overrides applied when this choice is selected.
    pub flags: Mapping,
    /// Alternate spelling.
    pub alias: Option<String>,
}

impl FlagChoice {
    fn new(data: &Value, flag_name: &str, path: &str) -> Result<Self> {
        match data {
            Value::Mapping(map) => {
                let Some(val) = value::get(map, "value") else {
                    return Err(GuildfileError::schema(
                        path,
                        format!(
                            "missing required 'value' attribute in choice for flag \
                             '{flag_name}': {}",
                            value::desc(data)
                        ),
                    ));
                };
                Ok(Self {
                    value: val.clone(),
                    description: value::get(map, "description")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    flags: match value::get(map, "flags") {
                        Some(Value::Mapping(flags)) => flags.clone(),
                        _ => Mapping::new(),
                    },
                    alias: value::as_opt_str(value::get(map, "alias")),
                })
            }
            other => Ok(Self {
                value: other.clone(),
                description: String::new(),
                flags: Mapping::new(),
                alias: None,
            }),
        }
    }
}

fn init_flag_choices(
    data: Option<&Value>,
    flag_name: &str,
    path: &str,
) -> Result<Vec<FlagChoice>> {
    let items = match data {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Sequence(items)) => items,
        Some(other) => {
            return Err(GuildfileError::schema(
                path,
                format!(
                    "invalid flag choice data {}: expected a list of values or mappings",
                    value::desc(other)
                ),
            ));
        }
    };
    items
        .iter()
        .map(|choice| FlagChoice::new(choice, flag_name, path))
        .collect()
}

///////////////////////////////////////////////////////////////////////
// Optimizers
///////////////////////////////////////////////////////////////////////

/// An optimizer attached to an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerDef {
    /// Optimizer name.
    pub name: String,
    /// The operation spec to run; defaults to the name.
    pub opspec: String,
    /// Explicitly flagged as the default optimizer.
    pub default: bool,
    /// Optimizer flag values.
    pub flags: Mapping,
}

impl OptimizerDef {
    fn new(name: &str, data: &Mapping) -> Self {
        let opspec = value::get(data, "algorithm")
            .and_then(Value::as_str)
            .unwrap_or(name)
            .to_string();
        let flags: Mapping = data
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), Some("algorithm") | Some("default")))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            name: name.to_string(),
            opspec,
            default: value::get(data, "default").is_some_and(value::truthy),
            flags,
        }
    }

    /// An optimizer referenced only by name.
    pub fn for_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            opspec: name.to_string(),
            default: false,
            flags: Mapping::new(),
        }
    }
}

fn init_optimizers(data: &Mapping, op_name: &str, path: &str) -> Result<Vec<OptimizerDef>> {
    let opts_data = coerce_opts_data(data, op_name, path)?;
    let mut names = value::keys(&opts_data);
    names.sort();
    names
        .iter()
        .map(|name| {
            let opt_data = match value::get(&opts_data, name) {
                Some(Value::Mapping(map)) => map.clone(),
                _ => Mapping::new(),
            };
            Ok(OptimizerDef::new(name, &opt_data))
        })
        .collect()
}

fn coerce_opts_data(data: &Mapping, op_name: &str, path: &str) -> Result<Mapping> {
    if value::has(data, "optimizer") && value::has(data, "optimizers") {
        return Err(GuildfileError::schema(
            path,
            format!(
                "conflicting optimizer configuration in operation '{op_name}' - \
                 cannot define both 'optimizer' and 'optimizers'"
            ),
        ));
    }
    let opts_data = match value::get(data, "optimizers") {
        Some(val) if !val.is_null() => val.clone(),
        _ => match value::get(data, "optimizer") {
            Some(val) if !val.is_null() => {
                let coerced = coerce_opt_data_item(val);
                let Some(name) = value::get(&coerced, "algorithm").and_then(Value::as_str)
                else {
                    return Err(GuildfileError::schema(
                        path,
                        format!(
                            "missing required 'algorithm' attribute in optimizer \
                             for operation '{op_name}'"
                        ),
                    ));
                };
                let mut map = Mapping::new();
                value::set(&mut map, name, Value::Mapping(coerced.clone()));
                Value::Mapping(map)
            }
            _ => return Ok(Mapping::new()),
        },
    };
    match opts_data {
        Value::Sequence(names) => {
            let mut map = Mapping::new();
            for name in names {
                map.insert(name, Value::Mapping(Mapping::new()));
            }
            Ok(map)
        }
        Value::Mapping(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, Value::Mapping(coerce_opt_data_item(&v))))
            .collect()),
        other => Err(GuildfileError::schema(
            path,
            format!(
                "invalid optimizer config {}: expected list or mapping",
                value::desc(&other)
            ),
        )),
    }
}

fn coerce_opt_data_item(data: &Value) -> Mapping {
    match data {
        Value::String(algorithm) => {
            let mut map = Mapping::new();
            value::set(&mut map, "algorithm", Value::String(algorithm.clone()));
            map
        }
        Value::Mapping(map) => map.clone(),
        _ => Mapping::new(),
    }
}

///////////////////////////////////////////////////////////////////////
// Publish def
///////////////////////////////////////////////////////////////////////

/// Publish configuration for an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishDef {
    /// File selection for published artifacts.
    pub files: FileSelectDef,
    /// Publish template name.
    pub template: Option<String>,
}

impl PublishDef {
    fn new(data: Option<&Value>, path: &str) -> Result<Self> {
        let map = match data {
            Some(Value::Mapping(map)) => map.clone(),
            _ => Mapping::new(),
        };
        Ok(Self {
            files: FileSelectDef::new(
                value::get(&map, "files").unwrap_or(&Value::Null),
                path,
            )?,
            template: value::as_opt_str(value::get(&map, "template")),
        })
    }
}

///////////////////////////////////////////////////////////////////////
// File select def
///////////////////////////////////////////////////////////////////////

/// Whether a selection rule includes or excludes matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSelectType {
    /// Matching files are selected.
    Include,
    /// Matching files are dropped.
    Exclude,
}

/// Source-file selection rules for a model or operation.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSelectDef {
    /// Root directory the rules apply under.
    pub root: Option<String>,
    /// Ordered selection rules.
    pub specs: Vec<FileSelectSpec>,
    /// Expected digest of the selected set.
    pub digest: Option<String>,
    /// Destination subdirectory.
    pub dest: Option<String>,
    /// The spec was entirely absent (defaults apply).
    pub empty_def: bool,
    /// Selection was explicitly disabled.
    pub disabled: bool,
}

impl FileSelectDef {
    pub(crate) fn new(data: &Value, path: &str) -> Result<Self> {
        match data {
            Value::Mapping(map) => Self::init(
                value::get(map, "select").unwrap_or(&Value::Null),
                value::as_opt_str(value::get(map, "root")),
                value::as_opt_str(value::get(map, "digest")),
                value::as_opt_str(value::get(map, "dest")),
                path,
            ),
            other => Self::init(other, None, None, None, path),
        }
    }

    fn init(
        select_data: &Value,
        root: Option<String>,
        digest: Option<String>,
        dest: Option<String>,
        path: &str,
    ) -> Result<Self> {
        let empty_def = select_data.is_null();
        let disabled = matches!(select_data, Value::Bool(false));
        let items: Vec<Value> = match select_data {
            Value::Null | Value::Bool(false) => Vec::new(),
            Value::Sequence(items) => items.clone(),
            other => {
                return Err(GuildfileError::schema(
                    path,
                    format!(
                        "invalid file select spec {}: expected a list or no/off",
                        value::desc(other)
                    ),
                ));
            }
        };
        let specs = items
            .iter()
            .map(|item| FileSelectSpec::new(item, path))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            root,
            specs,
            digest,
            dest,
            empty_def,
            disabled,
        })
    }
}

/// One selection rule: include or exclude a pattern list, optionally
/// restricted to a pattern type.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSelectSpec {
    /// Include or exclude.
    pub select_type: FileSelectType,
    /// Glob patterns.
    pub patterns: Vec<String>,
    /// Optional pattern type: `dir`, `text`, or `binary`.
    pub patterns_type: Option<String>,
}

impl FileSelectSpec {
    fn new(data: &Value, path: &str) -> Result<Self> {
        let Value::Mapping(map) = data else {
            return Err(GuildfileError::schema(
                path,
                format!(
                    "invalid file select spec {}: expected a mapping",
                    value::desc(data)
                ),
            ));
        };
        if value::has(map, "include") && value::has(map, "exclude") {
            return Err(GuildfileError::schema(
                path,
                format!(
                    "invalid file select spec {}: cannot include both include and \
                     exclude - use multiple select specs in the order you want to \
                     apply the filters",
                    value::desc(data)
                ),
            ));
        }
        let (select_type, config) = if let Some(config) = value::get(map, "include") {
            (FileSelectType::Include, config)
        } else if let Some(config) = value::get(map, "exclude") {
            (FileSelectType::Exclude, config)
        } else {
            return Err(GuildfileError::schema(
                path,
                format!("unsupported file select spec: {}", value::desc(data)),
            ));
        };
        let name = match select_type {
            FileSelectType::Include => "include",
            FileSelectType::Exclude => "exclude",
        };
        let (patterns, patterns_type) = Self::init_patterns(config, name, path)?;
        Ok(Self {
            select_type,
            patterns,
            patterns_type,
        })
    }

    fn init_patterns(
        config: &Value,
        name: &str,
        path: &str,
    ) -> Result<(Vec<String>, Option<String>)> {
        match config {
            Value::String(_) | Value::Sequence(_) => Ok((
                coerce::string_or_list(config.clone(), path, name)?,
                None,
            )),
            Value::Mapping(map) => {
                for type_name in ["dir", "text", "binary"] {
                    if let Some(patterns) = value::get(map, type_name) {
                        return Ok((
                            coerce::string_or_list(patterns.clone(), path, name)?,
                            Some(type_name.to_string()),
                        ));
                    }
                }
                Err(GuildfileError::schema(
                    path,
                    format!("unsupported {name} value: {}", value::desc(config)),
                ))
            }
            other => Err(GuildfileError::schema(
                path,
                format!("unsupported {name} value: {}", value::desc(other)),
            )),
        }
    }
}
