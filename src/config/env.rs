//! Environment variable sources
//!
//! Only variables that are explicitly bound to a key path are read; there is
//! no prefix-based wildcard import. Values always enter the tree as strings.

use crate::domain::{join_path, split_path, ConfigNode, Fragment, Origin, OriginKind};
use crate::error::{ConfigError, Result};
use crate::utils::is_valid_key_segment;
use std::collections::HashMap;
use std::str::FromStr;

/// Where variable values come from.
#[derive(Debug, Clone, Default)]
pub enum EnvSource {
    #[default]
    Process,
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    pub fn fixed<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        EnvSource::Fixed(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn get(&self, name: &str) -> Option<String> {
        match self {
            EnvSource::Process => std::env::var(name).ok(),
            EnvSource::Fixed(vars) => vars.get(name).cloned(),
        }
    }
}

/// `VAR=key.path`: read `VAR` into `key.path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvBinding {
    pub var: String,
    pub path: Vec<String>,
}

impl EnvBinding {
    pub fn new(var: impl Into<String>, path: &str) -> Self {
        Self { var: var.into(), path: split_path(path) }
    }
}

impl FromStr for EnvBinding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = |reason: &str| ConfigError::MalformedOverride {
            token: s.to_string(),
            reason: reason.to_string(),
        };
        let (var, path) = s.split_once('=').ok_or_else(|| malformed("expected 'VAR=key.path'"))?;
        let var = var.trim();
        if var.is_empty() {
            return Err(malformed("empty variable name"));
        }
        let path = split_path(path.trim());
        if path.is_empty() || !path.iter().all(|seg| is_valid_key_segment(seg)) {
            return Err(malformed("invalid key path"));
        }
        Ok(Self { var: var.to_string(), path })
    }
}

/// Build the environment fragment. Unset variables are skipped; returns
/// `None` when no bound variable is set.
pub fn env_fragment(bindings: &[EnvBinding], source: &EnvSource, sequence: usize) -> Option<Fragment> {
    let mut node = ConfigNode::default();
    let mut used = Vec::new();

    for binding in bindings {
        match source.get(&binding.var) {
            Some(value) => {
                tracing::debug!("env {} -> {}", binding.var, join_path(&binding.path));
                node.set_path(&binding.path, ConfigNode::string(value));
                used.push(binding.var.as_str());
            }
            None => tracing::debug!("env {} not set, skipping", binding.var),
        }
    }

    if used.is_empty() {
        return None;
    }
    Some(Fragment::new(node, Origin::new(OriginKind::Env, used.join(",")), sequence))
}
