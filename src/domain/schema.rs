//! Typed schema definitions
//!
//! A `Schema` is an ordered list of fields. Schemas are built in code with the
//! builder methods on `SchemaField`, or read from a YAML/TOML/JSON schema file
//! through the serde definitions at the bottom of this module.

use super::node::ConfigNode;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Str,
    Int,
    Float,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// No coercion; any node is accepted.
    Any,
    Scalar(ScalarKind),
    /// Nested schema, referenced by registry key (`name` or `group/name`).
    Schema(String),
    /// One of the variants of a config group, chosen by the defaults list.
    Group(String),
    List(Box<FieldType>),
    Optional(Box<FieldType>),
}

impl FieldType {
    pub const STR: FieldType = FieldType::Scalar(ScalarKind::Str);
    pub const INT: FieldType = FieldType::Scalar(ScalarKind::Int);
    pub const FLOAT: FieldType = FieldType::Scalar(ScalarKind::Float);
    pub const BOOL: FieldType = FieldType::Scalar(ScalarKind::Bool);

    pub fn list(inner: FieldType) -> Self {
        FieldType::List(Box::new(inner))
    }

    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    pub fn schema(name: impl Into<String>) -> Self {
        FieldType::Schema(name.into())
    }

    pub fn group(name: impl Into<String>) -> Self {
        FieldType::Group(name.into())
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Any => write!(f, "any"),
            FieldType::Scalar(ScalarKind::Str) => write!(f, "str"),
            FieldType::Scalar(ScalarKind::Int) => write!(f, "int"),
            FieldType::Scalar(ScalarKind::Float) => write!(f, "float"),
            FieldType::Scalar(ScalarKind::Bool) => write!(f, "bool"),
            FieldType::Schema(name) => write!(f, "schema:{}", name),
            FieldType::Group(name) => write!(f, "group:{}", name),
            FieldType::List(inner) => write!(f, "list<{}>", inner),
            FieldType::Optional(inner) => write!(f, "optional<{}>", inner),
        }
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();

        if let Some(inner) = strip_wrapper(s, "list") {
            return Ok(FieldType::list(inner.parse()?));
        }
        if let Some(inner) = strip_wrapper(s, "optional") {
            return Ok(FieldType::optional(inner.parse()?));
        }
        if let Some(name) = s.strip_prefix("schema:") {
            return Ok(FieldType::schema(name.trim()));
        }
        if let Some(name) = s.strip_prefix("group:") {
            return Ok(FieldType::group(name.trim()));
        }

        match lower.as_str() {
            "any" | "" => Ok(FieldType::Any),
            "str" | "string" => Ok(FieldType::STR),
            "int" | "integer" => Ok(FieldType::INT),
            "float" | "number" => Ok(FieldType::FLOAT),
            "bool" | "boolean" => Ok(FieldType::BOOL),
            _ => Err(format!("unknown field type '{}'", s)),
        }
    }
}

/// `list<int>` and `list[int]` are both accepted.
fn strip_wrapper<'a>(s: &'a str, wrapper: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(wrapper)?;
    rest.strip_prefix('<')
        .and_then(|r| r.strip_suffix('>'))
        .or_else(|| rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')))
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    /// No default: absent values are missing (or an error when required).
    None,
    Value(ConfigNode),
    /// Explicit `???`: must be provided before it is read.
    Missing,
    /// Instantiate the named schema's defaults.
    Factory(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Ge(f64),
    Gt(f64),
    Le(f64),
    Lt(f64),
    MinLength(usize),
    MaxLength(usize),
    Pattern(String),
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Ge(v) => write!(f, ">= {}", v),
            Constraint::Gt(v) => write!(f, "> {}", v),
            Constraint::Le(v) => write!(f, "<= {}", v),
            Constraint::Lt(v) => write!(f, "< {}", v),
            Constraint::MinLength(n) => write!(f, "min_length {}", n),
            Constraint::MaxLength(n) => write!(f, "max_length {}", n),
            Constraint::Pattern(p) => write!(f, "pattern /{}/", p),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
    pub default: FieldDefault,
    /// Alternate external key accepted when binding.
    pub alias: Option<String>,
    /// Environment variable that feeds this field.
    pub env: Option<String>,
    pub constraints: Vec<Constraint>,
    pub description: Option<String>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            default: FieldDefault::None,
            alias: None,
            env: None,
            constraints: Vec::new(),
            description: None,
        }
    }

    pub fn default(mut self, value: impl Into<ConfigNode>) -> Self {
        self.default = match value.into() {
            ConfigNode::Missing => FieldDefault::Missing,
            node => FieldDefault::Value(node),
        };
        self
    }

    pub fn missing(mut self) -> Self {
        self.default = FieldDefault::Missing;
        self
    }

    pub fn factory(mut self, schema: impl Into<String>) -> Self {
        self.default = FieldDefault::Factory(schema.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn env(mut self, var: impl Into<String>) -> Self {
        self.env = Some(var.into());
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Does `key` address this field, either by name or by alias?
    pub fn matches_key(&self, key: &str) -> bool {
        self.name == key || self.alias.as_deref() == Some(key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub name: String,
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fields: Vec::new() }
    }

    pub fn field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// ── Schema files ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFileDef {
    #[serde(default)]
    pub schemas: Vec<SchemaDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDef {
    pub name: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
    #[serde(default)]
    pub default_factory: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ge: Option<f64>,
    #[serde(default)]
    pub gt: Option<f64>,
    #[serde(default)]
    pub le: Option<f64>,
    #[serde(default)]
    pub lt: Option<f64>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub pattern: Option<String>,
}

impl TryFrom<FieldDef> for SchemaField {
    type Error = String;

    fn try_from(def: FieldDef) -> Result<Self, Self::Error> {
        let ty: FieldType =
            def.ty.parse().map_err(|e| format!("field '{}': {}", def.name, e))?;

        let default = match (def.default, def.default_factory) {
            (Some(_), Some(_)) => {
                return Err(format!(
                    "field '{}': default and default_factory are mutually exclusive",
                    def.name
                ))
            }
            (Some(value), None) => match ConfigNode::from_yaml(value) {
                ConfigNode::Missing => FieldDefault::Missing,
                node => FieldDefault::Value(node),
            },
            (None, Some(factory)) => FieldDefault::Factory(factory),
            (None, None) => FieldDefault::None,
        };

        if let Some(pattern) = &def.pattern {
            regex::Regex::new(pattern)
                .map_err(|e| format!("field '{}': invalid pattern: {}", def.name, e))?;
        }

        let constraints = [
            def.ge.map(Constraint::Ge),
            def.gt.map(Constraint::Gt),
            def.le.map(Constraint::Le),
            def.lt.map(Constraint::Lt),
            def.min_length.map(Constraint::MinLength),
            def.max_length.map(Constraint::MaxLength),
            def.pattern.map(Constraint::Pattern),
        ]
        .into_iter()
        .flatten()
        .collect();

        Ok(SchemaField {
            name: def.name,
            ty,
            required: def.required,
            default,
            alias: def.alias,
            env: def.env,
            constraints,
            description: def.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_parsing() {
        assert_eq!("int".parse::<FieldType>(), Ok(FieldType::INT));
        assert_eq!("String".parse::<FieldType>(), Ok(FieldType::STR));
        assert_eq!("list<float>".parse::<FieldType>(), Ok(FieldType::list(FieldType::FLOAT)));
        assert_eq!(
            "optional[list<int>]".parse::<FieldType>(),
            Ok(FieldType::optional(FieldType::list(FieldType::INT)))
        );
        assert_eq!("schema:db/mysql".parse::<FieldType>(), Ok(FieldType::schema("db/mysql")));
        assert_eq!("group:db".parse::<FieldType>(), Ok(FieldType::group("db")));
        assert!("tensor".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_field_type_display_round_trips() {
        let ty = FieldType::optional(FieldType::list(FieldType::schema("model/resnet")));
        assert_eq!(ty.to_string().parse::<FieldType>(), Ok(ty));
    }

    #[test]
    fn test_builder_missing_default() {
        let field = SchemaField::new("waldo", FieldType::STR).default("???");
        assert_eq!(field.default, FieldDefault::Missing);
    }

    #[test]
    fn test_field_def_conversion_collects_constraints() {
        let def: FieldDef = serde_yaml::from_str(
            "name: password\ntype: str\nrequired: true\nmin_length: 8\npattern: '^[a-z]+$'\n",
        )
        .expect("valid def");
        let field = SchemaField::try_from(def).expect("convert");
        assert!(field.required);
        assert_eq!(
            field.constraints,
            vec![Constraint::MinLength(8), Constraint::Pattern("^[a-z]+$".into())]
        );
    }

    #[test]
    fn test_field_def_rejects_invalid_pattern() {
        let def: FieldDef =
            serde_yaml::from_str("name: code\ntype: str\npattern: '[a-z'\n").expect("valid def");
        let err = SchemaField::try_from(def).unwrap_err();
        assert!(err.contains("invalid pattern"), "{}", err);
    }

    #[test]
    fn test_field_def_rejects_default_and_factory() {
        let def: FieldDef =
            serde_yaml::from_str("name: db\ndefault: 1\ndefault_factory: db/mysql\n")
                .expect("valid def");
        assert!(SchemaField::try_from(def).is_err());
    }
}
