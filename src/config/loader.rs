//! Source loading
//!
//! Turns a schema name, a root config file, environment bindings, and CLI
//! tokens into an ordered list of fragments (lowest precedence first) plus the
//! tree-level overrides that are applied after merging.

use super::bind::implicit_root_schema;
use super::env::{env_fragment, EnvBinding, EnvSource};
use super::overrides::{parse_overrides, Override, OverrideMode};
use crate::domain::{
    ConfigNode, FieldDefault, FieldType, Fragment, Origin, OriginKind, Scalar, Schema,
    SchemaField,
};
use crate::error::{ConfigError, Result};
use crate::registry::{schema_key, SchemaRegistry};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_EXTENSIONS: &[&str] = &["yaml", "yml", "toml", "json"];

/// Reserved top-level key listing group selections.
pub const DEFAULTS_KEY: &str = "defaults";

/// Defaults-list entry marking where the file's own keys are merged.
pub const SELF_ENTRY: &str = "_self_";

/// Read a YAML, TOML, or JSON file into a config tree, choosing the parser by
/// extension. An empty document is an empty mapping.
pub fn read_structured_file(path: &Path) -> Result<ConfigNode> {
    let content = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    let parse_err =
        |message: String| ConfigError::Parse { path: path.to_path_buf(), message };

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();

    let node = match ext.as_str() {
        "yaml" | "yml" => {
            let raw: serde_yaml::Value =
                serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))?;
            ConfigNode::from_yaml(raw)
        }
        "toml" => {
            let raw: toml::Value = toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?;
            ConfigNode::from_toml(raw)
        }
        "json" => {
            let raw: serde_json::Value =
                serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?;
            ConfigNode::from_json(raw)
        }
        other => {
            return Err(ConfigError::UnsupportedFormat {
                ext: other.to_string(),
                path: path.to_path_buf(),
            })
        }
    };

    Ok(match node {
        ConfigNode::Scalar(Scalar::Null) => ConfigNode::default(),
        node => node,
    })
}

/// Locate `<dir>/<name>.{yaml,yml,toml,json}`. A name that already carries an
/// extension is looked up as-is.
pub fn find_config(dir: &Path, name: &str) -> Option<PathBuf> {
    let direct = dir.join(name);
    if direct.extension().is_some() && direct.is_file() {
        return Some(direct);
    }
    CONFIG_EXTENSIONS.iter().map(|ext| dir.join(format!("{}.{}", name, ext))).find(|p| p.is_file())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultsEntry {
    SelfRef,
    Group { group: String, variant: Option<String> },
}

impl DefaultsEntry {
    fn group_name(&self) -> Option<&str> {
        match self {
            DefaultsEntry::Group { group, .. } => Some(group),
            DefaultsEntry::SelfRef => None,
        }
    }
}

/// Remove the `defaults` list from a root config and parse its entries.
pub fn split_defaults(node: ConfigNode, path: &Path) -> Result<(Vec<DefaultsEntry>, ConfigNode)> {
    let parse_err = |message: String| ConfigError::Parse { path: path.to_path_buf(), message };

    let ConfigNode::Mapping(mut mapping) = node else {
        return Err(parse_err("top level of a config file must be a mapping".to_string()));
    };

    let Some(list) = mapping.remove(DEFAULTS_KEY) else {
        return Ok((Vec::new(), ConfigNode::Mapping(mapping)));
    };
    let ConfigNode::Sequence(items) = list else {
        return Err(parse_err(format!("'{}' must be a list", DEFAULTS_KEY)));
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let entry = match item {
            ConfigNode::Scalar(Scalar::Str(s)) if s == SELF_ENTRY => DefaultsEntry::SelfRef,
            ConfigNode::Mapping(m) if m.len() == 1 => {
                let Some((group, choice)) = m.into_iter().next() else {
                    continue;
                };
                let variant = match choice {
                    ConfigNode::Scalar(Scalar::Str(v)) => Some(v),
                    ConfigNode::Scalar(Scalar::Null) | ConfigNode::Missing => None,
                    other => {
                        return Err(parse_err(format!(
                            "defaults entry for '{}' must name a variant, found {}",
                            group,
                            other.type_name()
                        )))
                    }
                };
                DefaultsEntry::Group { group, variant }
            }
            other => {
                return Err(parse_err(format!(
                    "unsupported defaults entry '{}': expected '{}' or 'group: variant'",
                    other, SELF_ENTRY
                )))
            }
        };
        entries.push(entry);
    }

    Ok((entries, ConfigNode::Mapping(mapping)))
}

/// Default values of a schema as a config tree.
///
/// Fields with a value default get it, `???` defaults and non-required fields
/// without a default become missing, optional fields become null, and nested
/// schemas expand recursively. Required fields without a default are left
/// out so binding reports them.
pub fn schema_defaults(registry: &SchemaRegistry, schema: &Schema) -> Result<ConfigNode> {
    let mut stack = vec![schema.name.clone()];
    defaults_for(registry, schema, &mut stack)
}

fn defaults_for(
    registry: &SchemaRegistry,
    schema: &Schema,
    stack: &mut Vec<String>,
) -> Result<ConfigNode> {
    let mut node = ConfigNode::default();
    for field in &schema.fields {
        let value = match &field.default {
            FieldDefault::Value(v) => Some(v.clone()),
            FieldDefault::Missing => Some(ConfigNode::Missing),
            FieldDefault::Factory(name) => Some(nested_defaults(registry, name, stack)?),
            FieldDefault::None if field.required => None,
            FieldDefault::None => Some(match &field.ty {
                FieldType::Optional(_) => ConfigNode::null(),
                FieldType::Schema(name) => nested_defaults(registry, name, stack)?,
                _ => ConfigNode::Missing,
            }),
        };
        if let Some(value) = value {
            node.set_path(std::slice::from_ref(&field.name), value);
        }
    }
    Ok(node)
}

fn nested_defaults(
    registry: &SchemaRegistry,
    name: &str,
    stack: &mut Vec<String>,
) -> Result<ConfigNode> {
    if stack.iter().any(|s| s == name) {
        return Ok(ConfigNode::Missing);
    }
    let schema = registry.get(name)?;
    stack.push(name.to_string());
    let node = defaults_for(registry, schema, stack);
    stack.pop();
    node
}

/// Env bindings declared on schema fields, with paths relative to `prefix`.
fn schema_env_bindings(
    registry: &SchemaRegistry,
    schema: &Schema,
    prefix: &[String],
    stack: &mut Vec<String>,
    out: &mut Vec<EnvBinding>,
) {
    for field in &schema.fields {
        let mut path = prefix.to_vec();
        path.push(field.name.clone());

        if let Some(var) = &field.env {
            out.push(EnvBinding { var: var.clone(), path: path.clone() });
        }

        let nested = match (&field.ty, &field.default) {
            (FieldType::Schema(name), _) => Some(name),
            (FieldType::Optional(inner), _) => match inner.as_ref() {
                FieldType::Schema(name) => Some(name),
                _ => None,
            },
            (_, FieldDefault::Factory(name)) => Some(name),
            _ => None,
        };
        if let Some(name) = nested {
            if stack.iter().any(|s| s == name) {
                continue;
            }
            if let Ok(inner) = registry.get(name) {
                stack.push(name.clone());
                schema_env_bindings(registry, inner, &path, stack, out);
                stack.pop();
            }
        }
    }
}

/// Schema governing the value of `field`, if it is a nested or group field.
fn nested_schema<'r>(
    registry: &'r SchemaRegistry,
    field: &SchemaField,
    selections: &BTreeMap<String, String>,
) -> Option<&'r Schema> {
    match (&field.ty, &field.default) {
        (FieldType::Schema(name), _) => registry.get(name).ok(),
        (FieldType::Optional(inner), _) => match inner.as_ref() {
            FieldType::Schema(name) => registry.get(name).ok(),
            _ => None,
        },
        (FieldType::Group(group), _) => {
            selections.get(group).and_then(|variant| registry.resolve(group, variant).ok())
        }
        (_, FieldDefault::Factory(name)) => registry.get(name).ok(),
        _ => None,
    }
}

/// Rename aliased keys to their field names so that a source setting a field
/// through its alias competes with lower layers under the same key. When one
/// source sets both, the field name wins.
fn canonical_keys(
    registry: &SchemaRegistry,
    schema: &Schema,
    selections: &BTreeMap<String, String>,
    node: ConfigNode,
    stack: &mut Vec<String>,
) -> ConfigNode {
    let ConfigNode::Mapping(mut mapping) = node else {
        return node;
    };
    for field in &schema.fields {
        if let Some(alias) = field.alias.as_deref() {
            if let Some(value) = mapping.remove(alias) {
                if mapping.contains_key(&field.name) {
                    tracing::warn!(
                        "'{}' is set both directly and through alias '{}'; keeping '{}'",
                        field.name,
                        alias,
                        field.name
                    );
                } else {
                    mapping.insert(field.name.clone(), value);
                }
            }
        }

        let Some(nested) = nested_schema(registry, field, selections) else {
            continue;
        };
        if stack.iter().any(|s| s == &nested.name) {
            continue;
        }
        if let Some(child) = mapping.get_mut(&field.name) {
            stack.push(nested.name.clone());
            let taken = std::mem::take(child);
            *child = canonical_keys(registry, nested, selections, taken, stack);
            stack.pop();
        }
    }
    ConfigNode::Mapping(mapping)
}

/// Replace alias segments of an override path with field names.
fn canonical_path(
    registry: &SchemaRegistry,
    schema: &Schema,
    selections: &BTreeMap<String, String>,
    path: &mut [String],
) {
    let mut current = Some(schema);
    for segment in path.iter_mut() {
        let Some(schema) = current else {
            return;
        };
        let Some(field) = schema.fields.iter().find(|f| f.matches_key(segment)) else {
            return;
        };
        if *segment != field.name {
            tracing::debug!("override key '{}' is an alias of '{}'", segment, field.name);
            *segment = field.name.clone();
        }
        current = nested_schema(registry, field, selections);
    }
}

/// Everything the merge stage needs.
#[derive(Debug, Clone)]
pub struct LoadedSources {
    /// Fragments ordered from lowest to highest precedence.
    pub fragments: Vec<Fragment>,
    /// Tree-level CLI overrides, applied after the fragments are merged.
    pub overrides: Vec<Override>,
    /// Every CLI token as given, group selections included, in order.
    pub tokens: Vec<String>,
    /// Selected variant per config group.
    pub selections: BTreeMap<String, String>,
    /// Registry key of the primary schema, if any.
    pub schema: Option<String>,
}

pub struct SourceLoader<'a> {
    registry: &'a SchemaRegistry,
    schema: Option<String>,
    config_dir: Option<PathBuf>,
    config_name: Option<String>,
    env_bindings: Vec<EnvBinding>,
    env_source: EnvSource,
}

impl<'a> SourceLoader<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            schema: None,
            config_dir: None,
            config_name: None,
            env_bindings: Vec::new(),
            env_source: EnvSource::Process,
        }
    }

    /// Primary schema. Defaults to the schema registered under the config name.
    pub fn schema(mut self, name: Option<String>) -> Self {
        self.schema = name;
        self
    }

    pub fn config_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config_dir = dir;
        self
    }

    pub fn config_name(mut self, name: Option<String>) -> Self {
        self.config_name = name;
        self
    }

    pub fn env_bindings(mut self, bindings: Vec<EnvBinding>) -> Self {
        self.env_bindings = bindings;
        self
    }

    pub fn env_source(mut self, source: EnvSource) -> Self {
        self.env_source = source;
        self
    }

    fn effective_schema(&self) -> Option<String> {
        self.schema.clone().or_else(|| {
            self.config_name.as_ref().filter(|name| self.registry.contains(name)).cloned()
        })
    }

    fn base_dir(&self) -> PathBuf {
        self.config_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    fn is_group(&self, key: &str) -> bool {
        self.registry.has_group(key)
            || self.config_dir.as_ref().map(|dir| dir.join(key).is_dir()).unwrap_or(false)
    }

    /// A token selects a group variant when its key names a group and its
    /// value is a plain string (or it deletes the group).
    fn is_group_selection(&self, ov: &Override) -> bool {
        ov.path.len() == 1
            && self.is_group(&ov.path[0])
            && (ov.mode == OverrideMode::Delete || ov.string_value().is_some())
    }

    pub fn load<S: AsRef<str>>(&self, tokens: &[S]) -> Result<LoadedSources> {
        let parsed = parse_overrides(tokens)?;
        let raw_tokens: Vec<String> = parsed.iter().map(|ov| ov.raw().to_string()).collect();
        let (group_ops, mut overrides): (Vec<Override>, Vec<Override>) =
            parsed.into_iter().partition(|ov| self.is_group_selection(ov));

        let mut fragments = Vec::new();
        let schema_name = self.effective_schema();

        if let Some(name) = &schema_name {
            let schema = self.registry.get(name)?;
            let node = schema_defaults(self.registry, schema)?;
            fragments.push(Fragment::new(
                node,
                Origin::new(OriginKind::SchemaDefault, name.clone()),
                fragments.len(),
            ));
        }

        let (mut defaults, root) = match &self.config_name {
            Some(name) => {
                let dir = self.base_dir();
                let path = find_config(&dir, name)
                    .ok_or_else(|| ConfigError::ConfigNotFound { name: name.clone(), dir })?;
                tracing::debug!("Loading root config {}", path.display());
                let (defaults, node) = split_defaults(read_structured_file(&path)?, &path)?;
                (defaults, Some((node, path)))
            }
            None => (Vec::new(), None),
        };

        if !defaults.contains(&DefaultsEntry::SelfRef) {
            defaults.push(DefaultsEntry::SelfRef);
        }
        for op in &group_ops {
            apply_group_selection(&mut defaults, op)?;
        }

        let mut selections = BTreeMap::new();
        for entry in &defaults {
            match entry {
                DefaultsEntry::SelfRef => {
                    if let Some((node, path)) = &root {
                        fragments.push(Fragment::new(
                            node.clone(),
                            Origin::new(OriginKind::File, path.display().to_string()),
                            fragments.len(),
                        ));
                    }
                }
                DefaultsEntry::Group { group, variant: Some(variant) } => {
                    for (node, origin) in self.group_sources(group, variant)? {
                        fragments.push(Fragment::new(node, origin, fragments.len()));
                    }
                    selections.insert(group.clone(), variant.clone());
                }
                DefaultsEntry::Group { variant: None, .. } => {}
            }
        }

        let root_schema = match &schema_name {
            Some(name) => self.registry.get(name)?.clone(),
            None => implicit_root_schema(&selections),
        };
        fragments = fragments
            .into_iter()
            .map(|fragment| {
                if fragment.origin().kind == OriginKind::SchemaDefault {
                    return fragment;
                }
                fragment.map_node(|node| {
                    let mut stack = vec![root_schema.name.clone()];
                    canonical_keys(self.registry, &root_schema, &selections, node, &mut stack)
                })
            })
            .collect();
        for ov in &mut overrides {
            canonical_path(self.registry, &root_schema, &selections, &mut ov.path);
        }

        let bindings = self.collect_env_bindings(schema_name.as_deref(), &selections);
        if let Some(fragment) = env_fragment(&bindings, &self.env_source, fragments.len()) {
            fragments.push(fragment);
        }

        for fragment in &fragments {
            tracing::debug!("fragment #{} from {}", fragment.sequence(), fragment.origin());
        }

        Ok(LoadedSources {
            fragments,
            overrides,
            tokens: raw_tokens,
            selections,
            schema: schema_name,
        })
    }

    /// Schema defaults and/or file content for one group variant, mounted
    /// under the group key.
    fn group_sources(&self, group: &str, variant: &str) -> Result<Vec<(ConfigNode, Origin)>> {
        let mount = vec![group.to_string()];
        let mut sources = Vec::new();

        if let Ok(schema) = self.registry.resolve(group, variant) {
            let node = schema_defaults(self.registry, schema)?;
            sources.push((
                ConfigNode::nest(&mount, node),
                Origin::new(OriginKind::GroupVariant, schema_key(variant, Some(group))),
            ));
        }

        if let Some(dir) = &self.config_dir {
            if let Some(path) = find_config(&dir.join(group), variant) {
                let (defaults, node) = split_defaults(read_structured_file(&path)?, &path)?;
                if !defaults.is_empty() {
                    tracing::warn!(
                        "Ignoring defaults list in group config {}; only the root config may select groups",
                        path.display()
                    );
                }
                sources.push((
                    ConfigNode::nest(&mount, node),
                    Origin::new(OriginKind::GroupVariant, path.display().to_string()),
                ));
            }
        }

        if sources.is_empty() {
            return Err(ConfigError::UnknownSchema(schema_key(variant, Some(group))));
        }
        Ok(sources)
    }

    fn collect_env_bindings(
        &self,
        schema_name: Option<&str>,
        selections: &BTreeMap<String, String>,
    ) -> Vec<EnvBinding> {
        let mut bindings = Vec::new();
        if let Some(schema) = schema_name.and_then(|name| self.registry.get(name).ok()) {
            let mut stack = vec![schema.name.clone()];
            schema_env_bindings(self.registry, schema, &[], &mut stack, &mut bindings);
        }
        for (group, variant) in selections {
            if let Ok(schema) = self.registry.resolve(group, variant) {
                let mut stack = vec![schema.name.clone()];
                schema_env_bindings(
                    self.registry,
                    schema,
                    std::slice::from_ref(group),
                    &mut stack,
                    &mut bindings,
                );
            }
        }
        // Explicit bindings come last so they win over schema-declared ones.
        bindings.extend(self.env_bindings.iter().cloned());
        bindings
    }
}

fn apply_group_selection(defaults: &mut Vec<DefaultsEntry>, op: &Override) -> Result<()> {
    let group = op.path[0].clone();
    let variant = op.string_value().map(str::to_string);
    let existing = defaults.iter().position(|e| e.group_name() == Some(group.as_str()));

    match (op.mode, existing) {
        (OverrideMode::Override, Some(idx)) | (OverrideMode::Upsert, Some(idx)) => {
            defaults[idx] = DefaultsEntry::Group { group, variant };
        }
        (OverrideMode::Override, None) | (OverrideMode::Delete, None) => {
            return Err(ConfigError::FieldNotFound { path: group });
        }
        (OverrideMode::Add, Some(idx)) => {
            if matches!(&defaults[idx], DefaultsEntry::Group { variant: Some(_), .. }) {
                return Err(ConfigError::FieldAlreadyExists { path: group });
            }
            defaults[idx] = DefaultsEntry::Group { group, variant };
        }
        (OverrideMode::Add, None) | (OverrideMode::Upsert, None) => {
            defaults.push(DefaultsEntry::Group { group, variant });
        }
        (OverrideMode::Delete, Some(idx)) => {
            defaults.remove(idx);
        }
    }
    tracing::debug!("group selection {} applied", op.raw());
    Ok(())
}
