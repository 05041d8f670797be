//! Fragment merging and override application
//!
//! Precedence is positional: fragments are folded left to right and the later
//! value wins on key collisions, except that a missing marker never replaces a
//! value. CLI overrides run after the fold, with existence checks per mode.

use super::overrides::{Override, OverrideMode};
use crate::domain::{join_path, ConfigNode, Fragment, Origin, OriginKind};
use crate::error::{ConfigError, Result};

/// Merge `over` on top of `base`.
pub fn merge(base: ConfigNode, over: ConfigNode) -> ConfigNode {
    match (base, over) {
        (ConfigNode::Mapping(mut base_map), ConfigNode::Mapping(over_map)) => {
            for (key, value) in over_map {
                match base_map.get_mut(&key) {
                    Some(slot) => {
                        let existing = std::mem::take(slot);
                        *slot = merge(existing, value);
                    }
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
            ConfigNode::Mapping(base_map)
        }
        (base, ConfigNode::Missing) => base,
        (_, over) => over,
    }
}

/// Fold fragments, lowest precedence first, into one tree.
pub fn merge_fragments(fragments: &[Fragment]) -> ConfigNode {
    fragments
        .iter()
        .fold(ConfigNode::default(), |acc, fragment| merge(acc, fragment.node().clone()))
}

/// Apply one CLI override to the merged tree.
pub fn apply_override(tree: &mut ConfigNode, ov: &Override) -> Result<()> {
    let path = &ov.path;
    let key = join_path(path);
    let existing = tree.get_path(path);

    match ov.mode {
        OverrideMode::Override => {
            if existing.is_none() {
                return Err(ConfigError::FieldNotFound { path: key });
            }
            tree.set_path(path, ov.value.clone());
        }
        OverrideMode::Add => {
            if existing.map(|node| !node.is_missing()).unwrap_or(false) {
                return Err(ConfigError::FieldAlreadyExists { path: key });
            }
            // Refuse to silently replace a concrete scalar parent.
            for depth in 1..path.len() {
                match tree.get_path(&path[..depth]) {
                    Some(ConfigNode::Mapping(_)) | Some(ConfigNode::Missing) | None => {}
                    Some(_) => {
                        return Err(ConfigError::FieldAlreadyExists {
                            path: join_path(&path[..depth]),
                        })
                    }
                }
            }
            tree.set_path(path, ov.value.clone());
        }
        OverrideMode::Upsert => tree.set_path(path, ov.value.clone()),
        OverrideMode::Delete => {
            if tree.remove_path(path).is_none() {
                return Err(ConfigError::FieldNotFound { path: key });
            }
        }
    }

    tracing::debug!("applied override from {}", Origin::new(OriginKind::Cli, ov.raw()));
    Ok(())
}

pub fn apply_overrides(tree: &mut ConfigNode, overrides: &[Override]) -> Result<()> {
    overrides.iter().try_for_each(|ov| apply_override(tree, ov))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::overrides::parse_override;

    fn yaml(src: &str) -> ConfigNode {
        ConfigNode::from_yaml(serde_yaml::from_str(src).expect("valid yaml"))
    }

    fn fragment(src: &str, sequence: usize) -> Fragment {
        Fragment::new(yaml(src), Origin::new(OriginKind::File, format!("f{}", sequence)), sequence)
    }

    fn apply(tree: &mut ConfigNode, token: &str) -> Result<()> {
        apply_override(tree, &parse_override(token).expect("valid token"))
    }

    #[test]
    fn test_right_wins_and_left_only_keys_survive() {
        let merged = merge(yaml("a: 1\nb: {x: 1, y: 2}\n"), yaml("b: {y: 3, z: 4}\nc: 5\n"));
        assert_eq!(merged, yaml("a: 1\nb: {x: 1, y: 3, z: 4}\nc: 5\n"));
    }

    #[test]
    fn test_missing_never_overwrites_value() {
        let merged = merge(yaml("waldo: 1\n"), yaml("waldo: ???\n"));
        assert_eq!(merged["waldo"], ConfigNode::from(1));

        let merged = merge(yaml("waldo: ???\n"), yaml("waldo: ???\n"));
        assert!(merged["waldo"].is_missing());

        let merged = merge(yaml("waldo: ???\n"), yaml("waldo: 2\n"));
        assert_eq!(merged["waldo"], ConfigNode::from(2));
    }

    #[test]
    fn test_mismatched_kinds_later_wins() {
        assert_eq!(merge(yaml("db: {port: 1}\n"), yaml("db: mysql\n"))["db"], ConfigNode::string("mysql"));
        assert_eq!(merge(yaml("db: mysql\n"), yaml("db: {port: 1}\n"))["db"], yaml("port: 1\n"));
        assert_eq!(merge(yaml("l: [1, 2]\n"), yaml("l: [3]\n"))["l"], yaml("[3]\n"));
    }

    #[test]
    fn test_merge_is_associative_not_commutative() {
        let a = fragment("k: 1\nshared: {x: a}\n", 0);
        let b = fragment("shared: {x: b, y: b}\n", 1);
        let c = fragment("shared: {x: c}\nextra: true\n", 2);

        let folded = merge_fragments(&[a.clone(), b.clone(), c.clone()]);
        let grouped = merge(merge(a.node().clone(), b.node().clone()), c.node().clone());
        assert_eq!(folded, grouped);

        let swapped = merge_fragments(&[a, c, b]);
        assert_ne!(folded, swapped);
        assert_eq!(folded["shared"]["x"], ConfigNode::string("c"));
        assert_eq!(swapped["shared"]["x"], ConfigNode::string("b"));
    }

    #[test]
    fn test_merge_keeps_base_key_order() {
        let merged = merge(yaml("a: 1\nb: 2\n"), yaml("c: 3\na: 9\n"));
        let keys: Vec<&str> = merged.as_mapping().expect("mapping").keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_plain_override_requires_existing_key() {
        let mut tree = yaml("node: {loompa: 10}\n");
        apply(&mut tree, "node.loompa=20").expect("override");
        assert_eq!(tree["node"]["loompa"], ConfigNode::from(20));

        let err = apply(&mut tree, "node.looma=20").unwrap_err();
        assert!(matches!(err, ConfigError::FieldNotFound { ref path } if path == "node.looma"));
    }

    #[test]
    fn test_plain_override_accepts_missing_marker() {
        let mut tree = yaml("node: {waldo: ???}\n");
        apply(&mut tree, "node.waldo=fred").expect("override");
        assert_eq!(tree["node"]["waldo"], ConfigNode::string("fred"));
    }

    #[test]
    fn test_add_only_rejects_concrete_value() {
        let mut tree = yaml("db: {driver: mysql, password: ???}\n");
        let err = apply(&mut tree, "+db.driver=postgresql").unwrap_err();
        assert!(matches!(err, ConfigError::FieldAlreadyExists { ref path } if path == "db.driver"));

        apply(&mut tree, "+db.password=secret").expect("missing counts as absent");
        apply(&mut tree, "+db.user=omry").expect("new key");
        assert_eq!(tree["db"]["user"], ConfigNode::string("omry"));
    }

    #[test]
    fn test_add_only_rejects_scalar_parent() {
        let mut tree = yaml("db: mysql\n");
        let err = apply(&mut tree, "+db.user=omry").unwrap_err();
        assert!(matches!(err, ConfigError::FieldAlreadyExists { ref path } if path == "db"));
    }

    #[test]
    fn test_upsert_never_fails_on_existence() {
        let mut tree = yaml("node: {loompa: 10}\n");
        apply(&mut tree, "++node.loompa=20").expect("existing");
        apply(&mut tree, "++node.new_key=1").expect("absent");
        apply(&mut tree, "++other.deep.key=x").expect("absent parents");
        assert_eq!(tree["node"]["loompa"], ConfigNode::from(20));
        assert_eq!(tree["other"]["deep"]["key"], ConfigNode::string("x"));
    }

    #[test]
    fn test_delete() {
        let mut tree = yaml("db: {timeout: 10, port: 1}\n");
        apply(&mut tree, "~db.timeout").expect("delete");
        assert!(tree["db"].child("timeout").is_none());
        let err = apply(&mut tree, "~db.timeout").unwrap_err();
        assert!(matches!(err, ConfigError::FieldNotFound { .. }));
    }

    #[test]
    fn test_overrides_stop_at_first_failure() {
        let mut tree = yaml("a: 1\n");
        let ovs = vec![
            parse_override("a=2").expect("ok"),
            parse_override("b=3").expect("ok"),
            parse_override("a=4").expect("ok"),
        ];
        assert!(apply_overrides(&mut tree, &ovs).is_err());
        assert_eq!(tree["a"], ConfigNode::from(2));
    }
}
