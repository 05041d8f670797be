//! Schema registry
//!
//! Holds named schemas in a flat namespace. Group variants are stored under
//! `group/variant`. The registry is filled once at startup and only read
//! afterwards, so one instance can back any number of concurrent resolutions.

use crate::config::loader::read_structured_file;
use crate::domain::schema::SchemaFileDef;
use crate::domain::{Constraint, FieldDefault, FieldType, Schema, SchemaField};
use crate::error::{ConfigError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Schema>,
    groups: BTreeMap<String, BTreeSet<String>>,
}

/// Registry key for a schema, `name` or `group/name`.
pub fn schema_key(name: &str, group: Option<&str>) -> String {
    match group {
        Some(group) => format!("{}/{}", group, name),
        None => name.to_string(),
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `schema` under `name` (optionally inside `group`). Registering an
    /// existing key replaces the previous schema.
    pub fn register(&mut self, name: &str, mut schema: Schema, group: Option<&str>) {
        let key = schema_key(name, group);
        schema.name = key.clone();
        if self.schemas.insert(key.clone(), schema).is_some() {
            tracing::warn!("Schema '{}' registered twice; keeping the latest definition", key);
        }
        if let Some(group) = group {
            self.groups.entry(group.to_string()).or_default().insert(name.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Result<&Schema> {
        self.schemas.get(key).ok_or_else(|| ConfigError::UnknownSchema(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.schemas.contains_key(key)
    }

    pub fn resolve(&self, group: &str, variant: &str) -> Result<&Schema> {
        self.get(&schema_key(variant, Some(group)))
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn variants(&self, group: &str) -> Vec<&str> {
        self.groups.get(group).map(|v| v.iter().map(String::as_str).collect()).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Schema)> {
        self.schemas.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Register every schema declared in a YAML, TOML, or JSON schema file.
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let raw = read_structured_file(path)?;
        let defs: SchemaFileDef = serde_json::from_value(raw.to_json_value())
            .map_err(|e| ConfigError::Parse { path: path.to_path_buf(), message: e.to_string() })?;

        let count = defs.schemas.len();
        for def in defs.schemas {
            let mut schema = Schema::new(def.name.clone());
            for field in def.fields {
                let field = SchemaField::try_from(field).map_err(|message| ConfigError::Parse {
                    path: path.to_path_buf(),
                    message: format!("schema '{}': {}", def.name, message),
                })?;
                schema.fields.push(field);
            }
            self.register(&def.name, schema, def.group.as_deref());
        }
        tracing::debug!("Loaded {} schema(s) from {}", count, path.display());
        Ok(count)
    }

    /// Schemas for the bundled examples: database variants, an experiment
    /// made of model and dataset groups, and a regression training run.
    pub fn with_demo_schemas() -> Self {
        let mut registry = Self::new();

        registry.register(
            "mysql",
            Schema::new("mysql")
                .field(SchemaField::new("driver", FieldType::STR).default("mysql"))
                .field(SchemaField::new("host", FieldType::STR).default("localhost"))
                .field(port_field(3306)),
            Some("db"),
        );
        registry.register(
            "postgresql",
            Schema::new("postgresql")
                .field(SchemaField::new("driver", FieldType::STR).default("postgresql"))
                .field(SchemaField::new("host", FieldType::STR).default("localhost"))
                .field(port_field(5432))
                .field(SchemaField::new("timeout", FieldType::INT).default(10)),
            Some("db"),
        );
        registry.register(
            "config",
            Schema::new("config")
                .field(SchemaField::new("db", FieldType::group("db")))
                .field(
                    SchemaField::new("db2", FieldType::schema("db/mysql")).factory("db/mysql"),
                )
                .field(
                    SchemaField::new("ui", FieldType::schema("db/postgresql"))
                        .factory("db/postgresql"),
                ),
            None,
        );

        registry.register(
            "resnet",
            Schema::new("resnet")
                .field(SchemaField::new("name", FieldType::STR).default("resnet"))
                .field(SchemaField::new("num_layers", FieldType::STR).default("118"))
                .field(SchemaField::new("pretrained", FieldType::BOOL).default(true)),
            Some("model"),
        );
        registry.register(
            "imagenet",
            Schema::new("imagenet")
                .field(SchemaField::new("name", FieldType::STR).default("imagenet"))
                .field(
                    SchemaField::new("batch_size", FieldType::INT)
                        .default(32)
                        .constraint(Constraint::Gt(0.0)),
                )
                .field(SchemaField::new("shuffle", FieldType::BOOL).default(true)),
            Some("dataset"),
        );
        registry.register(
            "experiment",
            Schema::new("experiment")
                .field(SchemaField::new("model", FieldType::group("model")))
                .field(SchemaField::new("dataset", FieldType::group("dataset"))),
            None,
        );

        registry.register("train_paths", train_paths_schema(), None);
        registry.register("train_files", train_files_schema(), None);
        registry.register("train_hparams", train_hparams_schema(), None);
        registry.register(
            "train",
            Schema::new("train")
                .field(SchemaField::new("path", FieldType::schema("train_paths")).factory("train_paths"))
                .field(SchemaField::new("fname", FieldType::schema("train_files")).factory("train_files"))
                .field(
                    SchemaField::new("modelinstance", FieldType::schema("train_hparams"))
                        .factory("train_hparams"),
                )
                .field(
                    SchemaField::new("train_size", FieldType::FLOAT)
                        .default(0.8)
                        .constraint(Constraint::Gt(0.0))
                        .constraint(Constraint::Lt(1.0)),
                ),
            None,
        );

        registry
    }
}

fn port_field(default: i64) -> SchemaField {
    SchemaField::new("port", FieldType::INT)
        .default(default)
        .constraint(Constraint::Ge(1.0))
        .constraint(Constraint::Le(65535.0))
}

fn train_paths_schema() -> Schema {
    Schema::new("train_paths")
        .field(SchemaField::new("data_dir", FieldType::STR).default("${runtime:cwd}/data"))
        .field(SchemaField::new("model_dir", FieldType::STR).default("${runtime:cwd}/models"))
}

fn train_files_schema() -> Schema {
    Schema::new("train_files")
        .field(SchemaField::new("data_fname", FieldType::STR).default("data_tensors.pt"))
        .field(SchemaField::new("model_fname", FieldType::STR).default("model_weights.pt"))
}

fn train_hparams_schema() -> Schema {
    Schema::new("train_hparams")
        .field(
            SchemaField::new("learning_rate", FieldType::FLOAT)
                .default(0.03)
                .constraint(Constraint::Gt(0.0))
                .env("TRAIN_LEARNING_RATE"),
        )
        .field(
            SchemaField::new("batch_size", FieldType::INT)
                .default(10)
                .constraint(Constraint::Ge(1.0)),
        )
        .field(
            SchemaField::new("epochs", FieldType::INT).default(3).constraint(Constraint::Ge(1.0)),
        )
        .field(SchemaField::new("test_after_training", FieldType::BOOL).default(true))
}

/// Render a one-line summary of a field for listings.
pub fn describe_field(field: &SchemaField) -> String {
    let mut out = format!("{}: {}", field.name, field.ty);
    match &field.default {
        FieldDefault::None if field.required => out.push_str(" (required)"),
        FieldDefault::None => {}
        FieldDefault::Value(value) => out.push_str(&format!(" = {}", value)),
        FieldDefault::Missing => out.push_str(" = ???"),
        FieldDefault::Factory(schema) => out.push_str(&format!(" = <{}>", schema)),
    }
    if let Some(alias) = &field.alias {
        out.push_str(&format!(" [alias: {}]", alias));
    }
    if let Some(env) = &field.env {
        out.push_str(&format!(" [env: {}]", env));
    }
    for constraint in &field.constraints {
        out.push_str(&format!(" [{}]", constraint));
    }
    out
}
