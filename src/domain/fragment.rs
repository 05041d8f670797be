//! Configuration fragments with provenance

use super::node::ConfigNode;
use std::fmt;

/// Where a fragment came from. Variants are listed from lowest to highest
/// precedence; the actual order is decided by the fragment's sequence index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginKind {
    SchemaDefault,
    GroupVariant,
    File,
    Env,
    Cli,
}

impl OriginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginKind::SchemaDefault => "schema-default",
            OriginKind::GroupVariant => "group-variant",
            OriginKind::File => "file",
            OriginKind::Env => "env",
            OriginKind::Cli => "cli",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub kind: OriginKind,
    /// Schema name, file path, `group/variant`, or variable list.
    pub id: String,
}

impl Origin {
    pub fn new(kind: OriginKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// One layer of configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    node: ConfigNode,
    origin: Origin,
    sequence: usize,
}

impl Fragment {
    pub fn new(node: ConfigNode, origin: Origin, sequence: usize) -> Self {
        Self { node, origin, sequence }
    }

    pub fn node(&self) -> &ConfigNode {
        &self.node
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn sequence(&self) -> usize {
        self.sequence
    }

    /// Rebuild the fragment with a rewritten tree, keeping its provenance.
    pub fn map_node(self, f: impl FnOnce(ConfigNode) -> ConfigNode) -> Self {
        Self { node: f(self.node), ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_display() {
        assert_eq!(Origin::new(OriginKind::Cli, "db.port=6000").to_string(), "cli:db.port=6000");
        assert_eq!(Origin::new(OriginKind::GroupVariant, "db/mysql").to_string(), "group-variant:db/mysql");
    }

    #[test]
    fn test_map_node_keeps_provenance() {
        let fragment = Fragment::new(ConfigNode::from(1), Origin::new(OriginKind::File, "a.yaml"), 3);
        let mapped = fragment.map_node(|_| ConfigNode::from(2));
        assert_eq!(mapped.node(), &ConfigNode::from(2));
        assert_eq!(mapped.origin().kind, OriginKind::File);
        assert_eq!(mapped.sequence(), 3);
    }
}
