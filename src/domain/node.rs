//! Configuration tree
//!
//! A `ConfigNode` is the untyped representation every source is parsed into
//! before merging. Mapping keys keep insertion order so rendered output is
//! stable across runs.

use std::fmt;
use std::ops::Index;

/// Token that marks a value as mandatory but not yet provided.
pub const MISSING_TOKEN: &str = "???";

static NULL_NODE: ConfigNode = ConfigNode::Scalar(Scalar::Null);

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Str(_) => "str",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => {
                write!(f, "{:.1}", x)
            }
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Ordered string-keyed mapping with unique keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: Vec<(String, ConfigNode)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ConfigNode> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace a value. Replacing keeps the key's original position.
    pub fn insert(&mut self, key: impl Into<String>, value: ConfigNode) -> Option<ConfigNode> {
        let key = key.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<ConfigNode> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl IntoIterator for Mapping {
    type Item = (String, ConfigNode);
    type IntoIter = std::vec::IntoIter<(String, ConfigNode)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>> FromIterator<(K, ConfigNode)> for Mapping {
    fn from_iter<T: IntoIterator<Item = (K, ConfigNode)>>(iter: T) -> Self {
        let mut mapping = Mapping::new();
        for (k, v) in iter {
            mapping.insert(k, v);
        }
        mapping
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    Scalar(Scalar),
    Mapping(Mapping),
    Sequence(Vec<ConfigNode>),
    /// Mandatory value that has not been provided yet (`???`).
    Missing,
    /// Raw, unresolved `${...}` expression.
    Interpolation(String),
}

impl Default for ConfigNode {
    fn default() -> Self {
        ConfigNode::Mapping(Mapping::new())
    }
}

/// Split a dotted key path into segments. An empty string is the root.
pub fn split_path(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    path.split('.').map(str::to_string).collect()
}

pub fn join_path(path: &[String]) -> String {
    path.join(".")
}

impl ConfigNode {
    pub fn null() -> Self {
        ConfigNode::Scalar(Scalar::Null)
    }

    pub fn string(value: impl Into<String>) -> Self {
        ConfigNode::Scalar(Scalar::Str(value.into()))
    }

    /// Classify a raw string from a file or override: `???` is missing, anything
    /// containing `${` is an interpolation, the rest is a plain string.
    pub fn from_raw_str(raw: &str) -> Self {
        if raw == MISSING_TOKEN {
            ConfigNode::Missing
        } else if raw.contains("${") {
            ConfigNode::Interpolation(raw.to_string())
        } else {
            ConfigNode::string(raw)
        }
    }

    /// Wrap `node` in nested mappings so it sits at `path`.
    pub fn nest(path: &[String], node: ConfigNode) -> Self {
        path.iter().rev().fold(node, |acc, key| {
            let mut mapping = Mapping::new();
            mapping.insert(key.clone(), acc);
            ConfigNode::Mapping(mapping)
        })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, ConfigNode::Missing)
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, ConfigNode::Mapping(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigNode::Scalar(s) => s.type_name(),
            ConfigNode::Mapping(_) => "mapping",
            ConfigNode::Sequence(_) => "sequence",
            ConfigNode::Missing => "missing",
            ConfigNode::Interpolation(_) => "interpolation",
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            ConfigNode::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigNode]> {
        match self {
            ConfigNode::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigNode::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigNode::Scalar(Scalar::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigNode::Scalar(Scalar::Float(x)) => Some(*x),
            ConfigNode::Scalar(Scalar::Int(i)) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigNode::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Single-step child lookup; sequence children are addressed by index.
    pub fn child(&self, key: &str) -> Option<&ConfigNode> {
        match self {
            ConfigNode::Mapping(m) => m.get(key),
            ConfigNode::Sequence(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    fn child_mut(&mut self, key: &str) -> Option<&mut ConfigNode> {
        match self {
            ConfigNode::Mapping(m) => m.get_mut(key),
            ConfigNode::Sequence(items) => {
                key.parse::<usize>().ok().and_then(move |i| items.get_mut(i))
            }
            _ => None,
        }
    }

    pub fn get_path(&self, path: &[String]) -> Option<&ConfigNode> {
        path.iter().try_fold(self, |node, key| node.child(key))
    }

    pub fn get_path_mut(&mut self, path: &[String]) -> Option<&mut ConfigNode> {
        path.iter().try_fold(self, |node, key| node.child_mut(key))
    }

    /// Set `value` at `path`, creating intermediate mappings. Any intermediate
    /// node that is not a mapping (or an indexable sequence) is replaced.
    pub fn set_path(&mut self, path: &[String], value: ConfigNode) {
        let Some((last, parents)) = path.split_last() else {
            *self = value;
            return;
        };

        let mut node = self;
        for key in parents {
            let descend = matches!(node.child(key), Some(ConfigNode::Mapping(_)))
                || matches!(node.child(key), Some(ConfigNode::Sequence(_)));
            if !descend {
                node.insert_child(key, ConfigNode::Mapping(Mapping::new()));
            }
            node = match node.child_mut(key) {
                Some(child) => child,
                None => return,
            };
        }
        node.insert_child(last, value);
    }

    fn insert_child(&mut self, key: &str, value: ConfigNode) {
        if let ConfigNode::Sequence(items) = self {
            if let Some(slot) = key.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *slot = value;
                return;
            }
        }
        if !self.is_mapping() {
            *self = ConfigNode::Mapping(Mapping::new());
        }
        if let ConfigNode::Mapping(m) = self {
            m.insert(key, value);
        }
    }

    pub fn remove_path(&mut self, path: &[String]) -> Option<ConfigNode> {
        let (last, parents) = path.split_last()?;
        match self.get_path_mut(parents)? {
            ConfigNode::Mapping(m) => m.remove(last),
            ConfigNode::Sequence(items) => {
                let idx = last.parse::<usize>().ok().filter(|i| *i < items.len())?;
                Some(items.remove(idx))
            }
            _ => None,
        }
    }

    /// Dotted paths of every `???` leaf, in document order.
    pub fn missing_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_missing(self, &mut Vec::new(), &mut out);
        out
    }

    pub fn from_yaml(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value;
        match value {
            Value::Null => ConfigNode::null(),
            Value::Bool(b) => ConfigNode::Scalar(Scalar::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ConfigNode::Scalar(Scalar::Int(i)),
                None => ConfigNode::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => ConfigNode::from_raw_str(&s),
            Value::Sequence(items) => {
                ConfigNode::Sequence(items.into_iter().map(ConfigNode::from_yaml).collect())
            }
            Value::Mapping(map) => ConfigNode::Mapping(
                map.into_iter().map(|(k, v)| (yaml_key(k), ConfigNode::from_yaml(v))).collect(),
            ),
            Value::Tagged(tagged) => ConfigNode::from_yaml(tagged.value),
        }
    }

    pub fn from_toml(value: toml::Value) -> Self {
        use toml::Value;
        match value {
            Value::String(s) => ConfigNode::from_raw_str(&s),
            Value::Integer(i) => ConfigNode::Scalar(Scalar::Int(i)),
            Value::Float(x) => ConfigNode::Scalar(Scalar::Float(x)),
            Value::Boolean(b) => ConfigNode::Scalar(Scalar::Bool(b)),
            Value::Datetime(dt) => ConfigNode::string(dt.to_string()),
            Value::Array(items) => {
                ConfigNode::Sequence(items.into_iter().map(ConfigNode::from_toml).collect())
            }
            Value::Table(table) => ConfigNode::Mapping(
                table.into_iter().map(|(k, v)| (k, ConfigNode::from_toml(v))).collect(),
            ),
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => ConfigNode::null(),
            Value::Bool(b) => ConfigNode::Scalar(Scalar::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ConfigNode::Scalar(Scalar::Int(i)),
                None => ConfigNode::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => ConfigNode::from_raw_str(&s),
            Value::Array(items) => {
                ConfigNode::Sequence(items.into_iter().map(ConfigNode::from_json).collect())
            }
            Value::Object(map) => ConfigNode::Mapping(
                map.into_iter().map(|(k, v)| (k, ConfigNode::from_json(v))).collect(),
            ),
        }
    }

    /// YAML view of the tree. Missing values render as `???`, unresolved
    /// interpolations as their raw expression.
    pub fn to_yaml_value(&self) -> serde_yaml::Value {
        use serde_yaml::Value;
        match self {
            ConfigNode::Scalar(Scalar::Null) => Value::Null,
            ConfigNode::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            ConfigNode::Scalar(Scalar::Int(i)) => Value::Number((*i).into()),
            ConfigNode::Scalar(Scalar::Float(x)) => Value::Number((*x).into()),
            ConfigNode::Scalar(Scalar::Str(s)) => Value::String(s.clone()),
            ConfigNode::Mapping(m) => Value::Mapping(
                m.iter().map(|(k, v)| (Value::String(k.to_string()), v.to_yaml_value())).collect(),
            ),
            ConfigNode::Sequence(items) => {
                Value::Sequence(items.iter().map(ConfigNode::to_yaml_value).collect())
            }
            ConfigNode::Missing => Value::String(MISSING_TOKEN.to_string()),
            ConfigNode::Interpolation(raw) => Value::String(raw.clone()),
        }
    }

    /// JSON view of the tree. `???` renders as the string `"???"`.
    pub fn to_json_value(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            ConfigNode::Scalar(Scalar::Null) => Value::Null,
            ConfigNode::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            ConfigNode::Scalar(Scalar::Int(i)) => Value::from(*i),
            ConfigNode::Scalar(Scalar::Float(x)) => {
                serde_json::Number::from_f64(*x).map(Value::Number).unwrap_or(Value::Null)
            }
            ConfigNode::Scalar(Scalar::Str(s)) => Value::String(s.clone()),
            ConfigNode::Mapping(m) => Value::Object(
                m.iter().map(|(k, v)| (k.to_string(), v.to_json_value())).collect(),
            ),
            ConfigNode::Sequence(items) => {
                Value::Array(items.iter().map(|v| v.to_json_value()).collect())
            }
            ConfigNode::Missing => Value::String(MISSING_TOKEN.to_string()),
            ConfigNode::Interpolation(raw) => Value::String(raw.clone()),
        }
    }

    /// Text used when a value is spliced into a string interpolation.
    pub fn to_inline_string(&self) -> String {
        match self {
            ConfigNode::Scalar(s) => s.to_string(),
            ConfigNode::Missing => MISSING_TOKEN.to_string(),
            ConfigNode::Interpolation(raw) => raw.clone(),
            other => other.to_json_value().to_string(),
        }
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_yaml::to_string(&other).unwrap_or_default().trim().to_string(),
    }
}

fn collect_missing(node: &ConfigNode, path: &mut Vec<String>, out: &mut Vec<String>) {
    match node {
        ConfigNode::Missing => out.push(join_path(path)),
        ConfigNode::Mapping(m) => {
            for (k, v) in m.iter() {
                path.push(k.to_string());
                collect_missing(v, path, out);
                path.pop();
            }
        }
        ConfigNode::Sequence(items) => {
            for (i, v) in items.iter().enumerate() {
                path.push(i.to_string());
                collect_missing(v, path, out);
                path.pop();
            }
        }
        _ => {}
    }
}

impl fmt::Display for ConfigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_inline_string())
    }
}

/// Dictionary-style sugar: `node["db"]["port"]`. Absent keys yield `null`
/// instead of panicking; use `ResolvedConfig::get` for checked access.
impl Index<&str> for ConfigNode {
    type Output = ConfigNode;

    fn index(&self, key: &str) -> &ConfigNode {
        self.child(key).unwrap_or(&NULL_NODE)
    }
}

impl From<bool> for ConfigNode {
    fn from(value: bool) -> Self {
        ConfigNode::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for ConfigNode {
    fn from(value: i64) -> Self {
        ConfigNode::Scalar(Scalar::Int(value))
    }
}

impl From<i32> for ConfigNode {
    fn from(value: i32) -> Self {
        ConfigNode::Scalar(Scalar::Int(value.into()))
    }
}

impl From<f64> for ConfigNode {
    fn from(value: f64) -> Self {
        ConfigNode::Scalar(Scalar::Float(value))
    }
}

impl From<&str> for ConfigNode {
    fn from(value: &str) -> Self {
        ConfigNode::from_raw_str(value)
    }
}

impl From<String> for ConfigNode {
    fn from(value: String) -> Self {
        ConfigNode::from_raw_str(&value)
    }
}

impl From<Mapping> for ConfigNode {
    fn from(value: Mapping) -> Self {
        ConfigNode::Mapping(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(src: &str) -> ConfigNode {
        ConfigNode::from_yaml(serde_yaml::from_str(src).expect("valid yaml"))
    }

    #[test]
    fn test_yaml_classifies_missing_and_interpolation() {
        let node = yaml("node:\n  loompa: 10\n  zippity: ${node.loompa}\n  waldo: ???\n");
        assert_eq!(node["node"]["loompa"], ConfigNode::from(10));
        assert_eq!(node["node"]["zippity"], ConfigNode::Interpolation("${node.loompa}".into()));
        assert!(node["node"]["waldo"].is_missing());
    }

    #[test]
    fn test_mapping_preserves_insertion_order() {
        let node = yaml("zeta: 1\nalpha: 2\nmid: 3\n");
        let keys: Vec<&str> = node.as_mapping().expect("mapping").keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_set_path_creates_intermediate_mappings() {
        let mut node = ConfigNode::default();
        node.set_path(&split_path("db.conn.port"), 5432.into());
        assert_eq!(node.get_path(&split_path("db.conn.port")), Some(&ConfigNode::from(5432)));
    }

    #[test]
    fn test_set_path_replaces_scalar_intermediate() {
        let mut node = yaml("db: mysql\n");
        node.set_path(&split_path("db.port"), 3306.into());
        assert_eq!(node["db"]["port"], ConfigNode::from(3306));
    }

    #[test]
    fn test_sequence_index_paths() {
        let mut node = yaml("layers: [4, 8, 16]\n");
        assert_eq!(node.get_path(&split_path("layers.1")), Some(&ConfigNode::from(8)));
        node.set_path(&split_path("layers.2"), 32.into());
        assert_eq!(node["layers"]["2"], ConfigNode::from(32));
        assert_eq!(node.remove_path(&split_path("layers.0")), Some(ConfigNode::from(4)));
        assert_eq!(node["layers"].as_sequence().map(|s| s.len()), Some(2));
    }

    #[test]
    fn test_index_on_absent_key_is_null() {
        let node = yaml("a: 1\n");
        assert_eq!(node["b"]["c"], ConfigNode::null());
    }

    #[test]
    fn test_missing_paths_in_document_order() {
        let node = yaml("a: ???\nb:\n  c: 1\n  d: ???\n");
        assert_eq!(node.missing_paths(), vec!["a".to_string(), "b.d".to_string()]);
    }

    #[test]
    fn test_float_inline_string_keeps_decimal_point() {
        assert_eq!(ConfigNode::from(2.0).to_inline_string(), "2.0");
        assert_eq!(ConfigNode::from(0.25).to_inline_string(), "0.25");
    }

    #[test]
    fn test_toml_table_converts() {
        let value: toml::Value = toml::from_str("[db]\nport = 5432\nhost = \"${env:HOST}\"\n")
            .expect("valid toml");
        let node = ConfigNode::from_toml(value);
        assert_eq!(node["db"]["port"], ConfigNode::from(5432));
        assert!(matches!(node["db"]["host"], ConfigNode::Interpolation(_)));
    }
}
