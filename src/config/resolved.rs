//! The resolved configuration handed to applications

use crate::domain::{join_path, split_path, ConfigNode, FieldType};
use crate::error::{ConfigError, FailureKind, FieldFailure, Result, ValidationError};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::ops::Index;

/// Fully merged, interpolated, and validated configuration.
///
/// Lookups are path based (`get("db.port")`). Reading a path that still holds
/// a `???` marker fails with `RequiredValueMissing`; other missing values in
/// the tree do not matter until they are read.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    root: ConfigNode,
    types: BTreeMap<String, FieldType>,
    selections: BTreeMap<String, String>,
    overrides: Vec<String>,
}

impl ResolvedConfig {
    pub fn new(
        root: ConfigNode,
        types: BTreeMap<String, FieldType>,
        selections: BTreeMap<String, String>,
        overrides: Vec<String>,
    ) -> Self {
        Self { root, types, selections, overrides }
    }

    pub fn get(&self, path: &str) -> Result<&ConfigNode> {
        let segments = split_path(path);
        match self.root.get_path(&segments) {
            Some(ConfigNode::Missing) => {
                Err(ConfigError::RequiredValueMissing { path: path.to_string() })
            }
            Some(node) => match node.missing_paths().into_iter().next() {
                Some(inner) if !inner.is_empty() => Err(ConfigError::RequiredValueMissing {
                    path: join_path(&[path.to_string(), inner]),
                }),
                _ => Ok(node),
            },
            None => Err(ConfigError::FieldNotFound { path: path.to_string() }),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.root.get_path(&split_path(path)).is_some()
    }

    pub fn get_str(&self, path: &str) -> Result<&str> {
        let node = self.get(path)?;
        node.as_str().ok_or_else(|| mismatch(path, "str", node))
    }

    pub fn get_i64(&self, path: &str) -> Result<i64> {
        let node = self.get(path)?;
        node.as_i64().ok_or_else(|| mismatch(path, "int", node))
    }

    pub fn get_f64(&self, path: &str) -> Result<f64> {
        let node = self.get(path)?;
        node.as_f64().ok_or_else(|| mismatch(path, "float", node))
    }

    pub fn get_bool(&self, path: &str) -> Result<bool> {
        let node = self.get(path)?;
        node.as_bool().ok_or_else(|| mismatch(path, "bool", node))
    }

    /// Declared schema type of a path, when a schema covers it.
    pub fn declared_type(&self, path: &str) -> Option<&FieldType> {
        self.types.get(path)
    }

    pub fn selections(&self) -> &BTreeMap<String, String> {
        &self.selections
    }

    /// Every CLI token that shaped this config, group selections included,
    /// in the order given.
    pub fn overrides(&self) -> &[String] {
        &self.overrides
    }

    /// The whole tree, including any `???` markers.
    pub fn root(&self) -> &ConfigNode {
        &self.root
    }

    /// Deserialize the whole tree (or the subtree at `path` when given) into
    /// an application type. Fails on the first `???` left in that subtree.
    pub fn deserialize<T: DeserializeOwned>(&self, path: Option<&str>) -> Result<T> {
        let node = match path {
            Some(path) => self
                .root
                .get_path(&split_path(path))
                .ok_or_else(|| ConfigError::FieldNotFound { path: path.to_string() })?,
            None => &self.root,
        };
        if let Some(inner) = node.missing_paths().into_iter().next() {
            let mut full = path.map(split_path).unwrap_or_default();
            full.extend(split_path(&inner));
            return Err(ConfigError::RequiredValueMissing { path: join_path(&full) });
        }

        serde_json::from_value(node.to_json_value())
            .map_err(|e| ConfigError::Deserialize(e.to_string()))
    }
}

fn mismatch(path: &str, expected: &str, node: &ConfigNode) -> ConfigError {
    ValidationError::single(FieldFailure {
        path: path.to_string(),
        kind: FailureKind::TypeCoercionError,
        expected: expected.to_string(),
        received: Some(node.to_inline_string()),
    })
    .into()
}

/// `cfg["node"]["loompa"]` sugar over the tree. Missing keys index to `null`;
/// use `get` when absence or `???` must be an error.
impl Index<&str> for ResolvedConfig {
    type Output = ConfigNode;

    fn index(&self, key: &str) -> &ConfigNode {
        &self.root[key]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn resolved(src: &str) -> ResolvedConfig {
        let root = ConfigNode::from_yaml(serde_yaml::from_str(src).expect("valid yaml"));
        ResolvedConfig::new(root, BTreeMap::new(), BTreeMap::new(), Vec::new())
    }

    #[test]
    fn test_path_and_index_access_agree() {
        let cfg = resolved("node:\n  loompa: 10\n");
        assert_eq!(cfg.get("node.loompa").expect("present"), &ConfigNode::from(10));
        assert_eq!(cfg["node"]["loompa"], ConfigNode::from(10));
        assert_eq!(cfg.get_i64("node.loompa").expect("int"), 10);
    }

    #[test]
    fn test_missing_value_fails_only_on_read() {
        let cfg = resolved("node:\n  loompa: 10\n  waldo: ???\n");
        assert_eq!(cfg.get_i64("node.loompa").expect("unaffected"), 10);
        let err = cfg.get("node.waldo").unwrap_err();
        assert!(matches!(err, ConfigError::RequiredValueMissing { ref path } if path == "node.waldo"));

        let err = cfg.get("node").unwrap_err();
        assert!(matches!(err, ConfigError::RequiredValueMissing { ref path } if path == "node.waldo"));
    }

    #[test]
    fn test_absent_path() {
        let cfg = resolved("a: 1\n");
        assert!(matches!(cfg.get("b.c").unwrap_err(), ConfigError::FieldNotFound { .. }));
        assert!(!cfg.contains("b"));
    }

    #[test]
    fn test_typed_getter_mismatch() {
        let cfg = resolved("port: \"5432\"\n");
        let err = cfg.get_i64("port").unwrap_err();
        match err {
            ConfigError::Validation(v) => {
                assert_eq!(v.failures()[0].kind, FailureKind::TypeCoercionError);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(cfg.get_str("port").expect("str"), "5432");
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Db {
        driver: String,
        port: u16,
        password: Option<String>,
    }

    #[test]
    fn test_deserialize_subtree() {
        let cfg = resolved("db:\n  driver: mysql\n  port: 3306\n  password: null\nui:\n  theme: ???\n");
        let db: Db = cfg.deserialize(Some("db")).expect("deserialize");
        assert_eq!(db, Db { driver: "mysql".into(), port: 3306, password: None });
    }

    #[test]
    fn test_deserialize_optional_field_still_missing() {
        let cfg = resolved("db:\n  driver: mysql\n  port: 3306\n  password: ???\n");
        let err = cfg.deserialize::<Db>(Some("db")).unwrap_err();
        assert!(matches!(err, ConfigError::RequiredValueMissing { ref path } if path == "db.password"));
    }

    #[test]
    fn test_deserialize_type_mismatch() {
        let cfg = resolved("db:\n  driver: mysql\n  port: high\n");
        assert!(matches!(cfg.deserialize::<Db>(Some("db")).unwrap_err(), ConfigError::Deserialize(_)));
    }

    #[test]
    fn test_deserialize_reports_missing_value() {
        #[derive(Debug, Deserialize)]
        struct Strict {
            #[allow(dead_code)]
            password: String,
        }
        let cfg = resolved("db:\n  password: ???\n");
        let err = cfg.deserialize::<Strict>(Some("db")).unwrap_err();
        assert!(matches!(err, ConfigError::RequiredValueMissing { ref path } if path == "db.password"));
    }
}
