//! Schema binding and validation
//!
//! Walks a schema field by field over the resolved tree, coercing each value
//! to the declared type and checking constraints. Field failures are collected
//! across the whole tree and returned together; an unknown schema reference
//! aborts immediately.

use super::loader::schema_defaults;
use crate::domain::{
    join_path, ConfigNode, Constraint, FieldDefault, FieldType, Mapping, Scalar, ScalarKind,
    Schema, SchemaField,
};
use crate::error::{FailureKind, FieldFailure, Result, ValidationError};
use crate::registry::SchemaRegistry;
use crate::utils::{parse_bool, parse_float, parse_int};
use regex::Regex;
use std::collections::BTreeMap;

/// A bound tree plus the declared type of every schema-covered path.
#[derive(Debug, Clone)]
pub struct Bound {
    pub tree: ConfigNode,
    pub types: BTreeMap<String, FieldType>,
}

/// Root schema used when no primary schema is given: one group field per
/// selected group, so selected variants are still validated.
pub fn implicit_root_schema(selections: &BTreeMap<String, String>) -> Schema {
    selections.keys().fold(Schema::new("<root>"), |schema, group| {
        schema.field(SchemaField::new(group.clone(), FieldType::group(group.clone())))
    })
}

pub fn bind(
    registry: &SchemaRegistry,
    schema: &Schema,
    tree: ConfigNode,
    selections: &BTreeMap<String, String>,
) -> Result<Bound> {
    let mut binder = Binder {
        registry,
        selections,
        failures: Vec::new(),
        types: BTreeMap::new(),
    };
    let tree = binder.bind_schema(schema, &mut Vec::new(), tree)?;

    if !binder.failures.is_empty() {
        return Err(ValidationError::new(binder.failures).into());
    }
    Ok(Bound { tree, types: binder.types })
}

struct Binder<'a> {
    registry: &'a SchemaRegistry,
    selections: &'a BTreeMap<String, String>,
    failures: Vec<FieldFailure>,
    types: BTreeMap<String, FieldType>,
}

impl Binder<'_> {
    fn bind_schema(
        &mut self,
        schema: &Schema,
        path: &mut Vec<String>,
        node: ConfigNode,
    ) -> Result<ConfigNode> {
        let mut input = match node {
            ConfigNode::Mapping(m) => m,
            ConfigNode::Missing => return Ok(ConfigNode::Missing),
            other => {
                let received = describe_received(&other);
                self.fail(path, FailureKind::TypeCoercionError, format!("schema:{}", schema.name), Some(received));
                return Ok(other);
            }
        };

        let mut out = Mapping::new();
        for field in &schema.fields {
            path.push(field.name.clone());
            let value = take_field(&mut input, field);
            let bound = match value {
                Some(value) => self.bind_present(field, path, value)?,
                None => self.bind_absent(field, path)?,
            };
            self.types.insert(join_path(path), field.ty.clone());
            if let Some(bound) = bound {
                out.insert(field.name.clone(), bound);
            }
            path.pop();
        }

        for (key, value) in input {
            tracing::debug!("keeping key '{}' not declared by schema '{}'", key, schema.name);
            out.insert(key, value);
        }
        Ok(ConfigNode::Mapping(out))
    }

    fn bind_present(
        &mut self,
        field: &SchemaField,
        path: &mut Vec<String>,
        value: ConfigNode,
    ) -> Result<Option<ConfigNode>> {
        if value.is_missing() {
            if field.required {
                self.fail(path, FailureKind::MissingRequiredField, field.ty.to_string(), None);
            }
            return Ok(Some(ConfigNode::Missing));
        }
        let coerced = self.coerce(&field.ty, path, value)?;
        if let Some(node) = &coerced {
            self.check_constraints(field, path, node);
        }
        Ok(coerced)
    }

    fn bind_absent(&mut self, field: &SchemaField, path: &mut Vec<String>) -> Result<Option<ConfigNode>> {
        let registry = self.registry;
        let fallback = match &field.default {
            FieldDefault::Value(value) => return self.bind_present(field, path, value.clone()),
            FieldDefault::Missing => ConfigNode::Missing,
            FieldDefault::Factory(name) => {
                let schema = registry.get(name)?;
                let defaults = schema_defaults(registry, schema)?;
                self.bind_schema(schema, path, defaults)?
            }
            FieldDefault::None if field.required => {
                self.fail(path, FailureKind::MissingRequiredField, field.ty.to_string(), None);
                return Ok(None);
            }
            FieldDefault::None => match &field.ty {
                FieldType::Optional(_) => ConfigNode::null(),
                FieldType::Schema(name) => {
                    let schema = registry.get(name)?;
                    let defaults = schema_defaults(registry, schema)?;
                    self.bind_schema(schema, path, defaults)?
                }
                _ => ConfigNode::Missing,
            },
        };
        if fallback.is_missing() && field.required {
            self.fail(path, FailureKind::MissingRequiredField, field.ty.to_string(), None);
        }
        Ok(Some(fallback))
    }

    /// Coerce `node` to `ty`. Returns `None` after recording a failure.
    fn coerce(
        &mut self,
        ty: &FieldType,
        path: &mut Vec<String>,
        node: ConfigNode,
    ) -> Result<Option<ConfigNode>> {
        if matches!(node, ConfigNode::Missing | ConfigNode::Interpolation(_)) {
            return Ok(Some(node));
        }

        let registry = self.registry;
        let received = describe_received(&node);
        let coerced = match ty {
            FieldType::Any => Some(node),
            FieldType::Optional(inner) => match node {
                ConfigNode::Scalar(Scalar::Null) => Some(node),
                other => return self.coerce(inner, path, other),
            },
            FieldType::Scalar(kind) => coerce_scalar(*kind, &node),
            FieldType::List(inner) => match node {
                ConfigNode::Sequence(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    let mut ok = true;
                    for (i, item) in items.into_iter().enumerate() {
                        path.push(i.to_string());
                        match self.coerce(inner, path, item)? {
                            Some(item) => out.push(item),
                            None => ok = false,
                        }
                        path.pop();
                    }
                    // Element failures are already recorded.
                    return Ok(ok.then_some(ConfigNode::Sequence(out)));
                }
                _ => None,
            },
            FieldType::Schema(name) => {
                let schema = registry.get(name)?;
                return self.bind_schema(schema, path, node).map(Some);
            }
            FieldType::Group(group) => {
                let selected = self
                    .selections
                    .get(group)
                    .and_then(|variant| registry.resolve(group, variant).ok());
                match selected {
                    Some(schema) => return self.bind_schema(schema, path, node).map(Some),
                    None => Some(node),
                }
            }
        };

        if coerced.is_none() {
            self.fail(path, FailureKind::TypeCoercionError, ty.to_string(), Some(received));
        }
        Ok(coerced)
    }

    fn check_constraints(&mut self, field: &SchemaField, path: &[String], node: &ConfigNode) {
        for constraint in &field.constraints {
            if let Some(false) = satisfies(constraint, node) {
                let received = describe_received(node);
                self.fail(path, FailureKind::ConstraintViolation, constraint.to_string(), Some(received));
            }
        }
    }

    fn fail(&mut self, path: &[String], kind: FailureKind, expected: String, received: Option<String>) {
        self.failures.push(FieldFailure { path: join_path(path), kind, expected, received });
    }
}

/// Look up a field by name, then by alias, removing it from `input`.
fn take_field(input: &mut Mapping, field: &SchemaField) -> Option<ConfigNode> {
    if let Some(value) = input.remove(&field.name) {
        return Some(value);
    }
    let alias = field.alias.as_deref()?;
    input.remove(alias)
}

fn describe_received(node: &ConfigNode) -> String {
    match node {
        ConfigNode::Scalar(Scalar::Str(s)) => format!("'{}'", s),
        other => other.to_inline_string(),
    }
}

/// Scalar coercion follows the declared type, never the literal's type.
fn coerce_scalar(kind: ScalarKind, node: &ConfigNode) -> Option<ConfigNode> {
    let ConfigNode::Scalar(scalar) = node else {
        return None;
    };
    let out = match (kind, scalar) {
        (ScalarKind::Str, Scalar::Null) => return None,
        (ScalarKind::Str, Scalar::Str(_)) => scalar.clone(),
        (ScalarKind::Str, other) => Scalar::Str(other.to_string()),

        (ScalarKind::Int, Scalar::Int(_)) => scalar.clone(),
        (ScalarKind::Int, Scalar::Float(x))
            if x.fract() == 0.0 && *x >= i64::MIN as f64 && *x < i64::MAX as f64 =>
        {
            Scalar::Int(*x as i64)
        }
        (ScalarKind::Int, Scalar::Str(s)) => Scalar::Int(parse_int(s.trim())?),

        (ScalarKind::Float, Scalar::Float(_)) => scalar.clone(),
        (ScalarKind::Float, Scalar::Int(i)) => Scalar::Float(*i as f64),
        (ScalarKind::Float, Scalar::Str(s)) => Scalar::Float(parse_float(s.trim())?),

        (ScalarKind::Bool, Scalar::Bool(_)) => scalar.clone(),
        (ScalarKind::Bool, Scalar::Int(0)) => Scalar::Bool(false),
        (ScalarKind::Bool, Scalar::Int(1)) => Scalar::Bool(true),
        (ScalarKind::Bool, Scalar::Str(s)) => Scalar::Bool(parse_bool(s.trim())?),

        _ => return None,
    };
    Some(ConfigNode::Scalar(out))
}

/// `None` when the constraint does not apply to this kind of value.
fn satisfies(constraint: &Constraint, node: &ConfigNode) -> Option<bool> {
    let length = || match node {
        ConfigNode::Scalar(Scalar::Str(s)) => Some(s.chars().count()),
        ConfigNode::Sequence(items) => Some(items.len()),
        _ => None,
    };
    let number = || match node {
        ConfigNode::Scalar(Scalar::Int(_)) | ConfigNode::Scalar(Scalar::Float(_)) => node.as_f64(),
        _ => None,
    };

    match constraint {
        Constraint::Ge(bound) => number().map(|x| x >= *bound),
        Constraint::Gt(bound) => number().map(|x| x > *bound),
        Constraint::Le(bound) => number().map(|x| x <= *bound),
        Constraint::Lt(bound) => number().map(|x| x < *bound),
        Constraint::MinLength(n) => length().map(|len| len >= *n),
        Constraint::MaxLength(n) => length().map(|len| len <= *n),
        Constraint::Pattern(pattern) => {
            let text = node.as_str()?;
            Some(Regex::new(pattern).map(|re| re.is_match(text)).unwrap_or(false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    fn yaml(src: &str) -> ConfigNode {
        ConfigNode::from_yaml(serde_yaml::from_str(src).expect("valid yaml"))
    }

    fn user_registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register(
            "user",
            Schema::new("user")
                .field(SchemaField::new("full_name", FieldType::STR).alias("name").required())
                .field(SchemaField::new("email", FieldType::STR).required())
                .field(
                    SchemaField::new("age", FieldType::INT)
                        .default(18)
                        .constraint(Constraint::Ge(18.0)),
                )
                .field(
                    SchemaField::new("password", FieldType::STR)
                        .default("changeme")
                        .constraint(Constraint::MinLength(8)),
                )
                .field(SchemaField::new("tags", FieldType::list(FieldType::INT)).default(yaml("[]")))
                .field(SchemaField::new("active", FieldType::BOOL).default(true)),
            None,
        );
        registry
    }

    fn bind_user(src: &str) -> Result<Bound> {
        let registry = user_registry();
        let schema = registry.get("user").expect("user").clone();
        bind(&registry, &schema, yaml(src), &BTreeMap::new())
    }

    fn failures(err: ConfigError) -> ValidationError {
        match err {
            ConfigError::Validation(v) => v,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_coercion_follows_declared_type() {
        let bound = bind_user("name: 42\nemail: a@b.c\nage: \"20\"\nactive: \"yes\"\ntags: [\"1\", 2]\n")
            .expect("bind");
        assert_eq!(bound.tree["full_name"], ConfigNode::string("42"));
        assert_eq!(bound.tree["age"], ConfigNode::from(20));
        assert_eq!(bound.tree["active"], ConfigNode::from(true));
        assert_eq!(bound.tree["tags"], yaml("[1, 2]"));
        assert_eq!(bound.types.get("age"), Some(&FieldType::INT));
    }

    #[test]
    fn test_non_numeric_string_fails_int_coercion() {
        let err = failures(bind_user("name: x\nemail: e\nage: \"20x\"\n").unwrap_err());
        let failure = err.find("age").expect("age failure");
        assert_eq!(failure.kind, FailureKind::TypeCoercionError);
        assert_eq!(failure.expected, "int");
        assert_eq!(failure.received.as_deref(), Some("'20x'"));
    }

    #[test]
    fn test_whole_float_binds_to_int_only_within_range() {
        let bound = bind_user("name: x\nemail: e\nage: 30.0\n").expect("bind");
        assert_eq!(bound.tree["age"], ConfigNode::from(30));

        let err = failures(bind_user("name: x\nemail: e\nage: 1.0e20\n").unwrap_err());
        assert_eq!(err.find("age").expect("age").kind, FailureKind::TypeCoercionError);
    }

    #[test]
    fn test_all_failures_reported_together() {
        let err = failures(bind_user("name: Ann\nage: 12\npassword: short\n").unwrap_err());
        assert_eq!(err.paths(), vec!["email", "age", "password"]);
        assert_eq!(err.find("email").expect("email").kind, FailureKind::MissingRequiredField);
        assert_eq!(err.find("age").expect("age").kind, FailureKind::ConstraintViolation);
        assert_eq!(err.find("age").expect("age").expected, ">= 18");
        assert_eq!(err.find("password").expect("password").expected, "min_length 8");
    }

    #[test]
    fn test_alias_binds_to_field_name() {
        let bound = bind_user("name: Ann\nemail: e\n").expect("bind");
        assert_eq!(bound.tree["full_name"], ConfigNode::string("Ann"));
        assert!(bound.tree.child("name").is_none());
    }

    #[test]
    fn test_missing_on_optional_path_stays_lazy() {
        let mut registry = SchemaRegistry::new();
        registry.register(
            "node",
            Schema::new("node")
                .field(SchemaField::new("loompa", FieldType::INT))
                .field(SchemaField::new("waldo", FieldType::STR)),
            None,
        );
        let schema = registry.get("node").expect("node").clone();
        let bound = bind(&registry, &schema, yaml("loompa: 10\nwaldo: ???\n"), &BTreeMap::new())
            .expect("bind");
        assert!(bound.tree["waldo"].is_missing());
    }

    #[test]
    fn test_required_missing_marker_is_reported() {
        let err = failures(bind_user("name: ???\nemail: e\n").unwrap_err());
        assert_eq!(err.find("full_name").expect("name").kind, FailureKind::MissingRequiredField);
    }

    #[test]
    fn test_extra_keys_are_kept() {
        let bound = bind_user("name: Ann\nemail: e\nnickname: annie\n").expect("bind");
        assert_eq!(bound.tree["nickname"], ConfigNode::string("annie"));
    }

    #[test]
    fn test_group_field_binds_selected_variant() {
        let registry = SchemaRegistry::with_demo_schemas();
        let schema = registry.get("config").expect("config").clone();
        let selections = BTreeMap::from([("db".to_string(), "postgresql".to_string())]);
        let tree = yaml("db: {driver: postgresql, host: h, port: \"5433\", timeout: 10}\ndb2: {}\nui: {}\n");

        let bound = bind(&registry, &schema, tree, &selections).expect("bind");
        assert_eq!(bound.tree["db"]["port"], ConfigNode::from(5433));
        assert_eq!(bound.tree["db2"]["port"], ConfigNode::from(3306));
        assert_eq!(bound.types.get("db.timeout"), Some(&FieldType::INT));
    }

    #[test]
    fn test_nested_constraint_path() {
        let registry = SchemaRegistry::with_demo_schemas();
        let schema = registry.get("config").expect("config").clone();
        let err = failures(
            bind(&registry, &schema, yaml("db: ???\ndb2: {port: 70000}\n"), &BTreeMap::new())
                .unwrap_err(),
        );
        assert_eq!(err.paths(), vec!["db2.port"]);
    }

    #[test]
    fn test_unknown_nested_schema_is_fail_fast() {
        let mut registry = SchemaRegistry::new();
        registry.register(
            "app",
            Schema::new("app").field(SchemaField::new("db", FieldType::schema("nope"))),
            None,
        );
        let schema = registry.get("app").expect("app").clone();
        let err = bind(&registry, &schema, yaml("db: {}\n"), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSchema(ref name) if name == "nope"));
    }

    #[test]
    fn test_implicit_root_schema_validates_selected_groups() {
        let registry = SchemaRegistry::with_demo_schemas();
        let selections = BTreeMap::from([("db".to_string(), "mysql".to_string())]);
        let schema = implicit_root_schema(&selections);
        let err = failures(
            bind(&registry, &schema, yaml("db: {port: abc}\nextra: 1\n"), &selections).unwrap_err(),
        );
        assert_eq!(err.paths(), vec!["db.port"]);
    }
}
