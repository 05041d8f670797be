//! Interpolation resolution
//!
//! Three forms are supported:
//! - `${a.b.c}` as the whole value: replaced by the typed value at `a.b.c`
//! - `text ${a.b.c} text`: the value is rendered and spliced into the string
//! - `${namespace:arg}`: calls a registered resolver function
//!
//! References may point at other interpolations; each leaf is resolved once
//! and memoized, and a reference back into the active chain is a cycle.

use super::resolvers::{ResolverRegistry, RuntimeContext};
use crate::domain::{join_path, split_path, ConfigNode, Mapping};
use crate::error::{ConfigError, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Path(Vec<String>),
    Call { namespace: String, arg: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Ref(Reference),
}

/// Split an expression into literal text and references. `\${` escapes a
/// literal `${`.
pub fn parse_expression(expr: &str) -> std::result::Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut rest = expr;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("\\${") {
            text.push_str("${");
            rest = after;
            continue;
        }
        if let Some(after) = rest.strip_prefix("${") {
            let end = after.find('}').ok_or_else(|| "unterminated '${'".to_string())?;
            let inner = after[..end].trim();
            if inner.contains("${") {
                return Err("nested interpolations are not supported".to_string());
            }
            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }
            segments.push(Segment::Ref(parse_reference(inner)?));
            rest = &after[end + 1..];
            continue;
        }
        let mut chars = rest.chars();
        if let Some(ch) = chars.next() {
            text.push(ch);
        }
        rest = chars.as_str();
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

fn parse_reference(inner: &str) -> std::result::Result<Reference, String> {
    if inner.is_empty() {
        return Err("empty reference".to_string());
    }
    if let Some((namespace, arg)) = inner.split_once(':') {
        let namespace = namespace.trim();
        if namespace.is_empty() {
            return Err("empty resolver namespace".to_string());
        }
        let arg = arg.trim();
        return Ok(Reference::Call {
            namespace: namespace.to_string(),
            arg: (!arg.is_empty()).then(|| arg.to_string()),
        });
    }
    let path = split_path(inner);
    if path.iter().any(|seg| seg.is_empty()) {
        return Err(format!("invalid key path '{}'", inner));
    }
    Ok(Reference::Path(path))
}

/// Resolve every interpolation in `tree`. Missing markers are left in place.
pub fn resolve_tree(
    tree: ConfigNode,
    resolvers: &ResolverRegistry,
    ctx: &RuntimeContext,
) -> Result<ConfigNode> {
    let mut interpolator = Interpolator::new(tree.clone(), resolvers, ctx);
    interpolator.resolve_subtree(&[], tree)
}

struct Interpolator<'a> {
    source: ConfigNode,
    resolvers: &'a ResolverRegistry,
    ctx: &'a RuntimeContext,
    memo: HashMap<String, ConfigNode>,
    active: Vec<String>,
}

impl<'a> Interpolator<'a> {
    fn new(source: ConfigNode, resolvers: &'a ResolverRegistry, ctx: &'a RuntimeContext) -> Self {
        Self { source, resolvers, ctx, memo: HashMap::new(), active: Vec::new() }
    }

    fn resolve_subtree(&mut self, path: &[String], node: ConfigNode) -> Result<ConfigNode> {
        match node {
            ConfigNode::Interpolation(_) => self.resolve_at(path),
            ConfigNode::Mapping(mapping) => {
                let mut out = Mapping::new();
                for (key, child) in mapping {
                    let mut child_path = path.to_vec();
                    child_path.push(key.clone());
                    let resolved = self.resolve_subtree(&child_path, child)?;
                    out.insert(key, resolved);
                }
                Ok(ConfigNode::Mapping(out))
            }
            ConfigNode::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, child) in items.into_iter().enumerate() {
                    let mut child_path = path.to_vec();
                    child_path.push(i.to_string());
                    out.push(self.resolve_subtree(&child_path, child)?);
                }
                Ok(ConfigNode::Sequence(out))
            }
            other => Ok(other),
        }
    }

    /// Resolve the interpolation stored at `path` in the source tree.
    fn resolve_at(&mut self, path: &[String]) -> Result<ConfigNode> {
        let key = join_path(path);
        if let Some(done) = self.memo.get(&key) {
            return Ok(done.clone());
        }
        if let Some(start) = self.active.iter().position(|p| *p == key) {
            let mut chain = self.active[start..].to_vec();
            chain.push(key);
            return Err(ConfigError::InterpolationCycle { chain });
        }

        let expr = match self.source.get_path(path) {
            Some(ConfigNode::Interpolation(expr)) => expr.clone(),
            Some(other) => return Ok(other.clone()),
            None => {
                return Err(ConfigError::InterpolationTargetMissing { path: key.clone(), target: key })
            }
        };
        let segments = parse_expression(&expr).map_err(|reason| ConfigError::InterpolationSyntax {
            path: key.clone(),
            expr: expr.clone(),
            reason,
        })?;

        self.active.push(key.clone());
        let resolved = self.evaluate(&key, &segments);
        self.active.pop();

        let value = resolved?;
        self.memo.insert(key, value.clone());
        Ok(value)
    }

    fn evaluate(&mut self, key: &str, segments: &[Segment]) -> Result<ConfigNode> {
        if let [Segment::Ref(reference)] = segments {
            return self.evaluate_reference(key, reference);
        }

        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Ref(reference) => {
                    let value = self.evaluate_reference(key, reference)?;
                    if value.is_missing() {
                        let target = describe_reference(reference);
                        return Err(ConfigError::RequiredValueMissing { path: target });
                    }
                    out.push_str(&value.to_inline_string());
                }
            }
        }
        Ok(ConfigNode::string(out))
    }

    fn evaluate_reference(&mut self, key: &str, reference: &Reference) -> Result<ConfigNode> {
        match reference {
            Reference::Path(target) => self.lookup(key, target),
            Reference::Call { namespace, arg } => {
                let resolver = self.resolvers.get(namespace).cloned().ok_or_else(|| {
                    ConfigError::InterpolationTargetMissing {
                        path: key.to_string(),
                        target: describe_reference(reference),
                    }
                })?;
                resolver(arg.as_deref(), self.ctx).map_err(|reason| ConfigError::ResolverFailed {
                    path: key.to_string(),
                    resolver: namespace.clone(),
                    reason,
                })
            }
        }
    }

    /// Walk `target` through the source tree, resolving interpolations met on
    /// the way, then resolve everything below the target.
    fn lookup(&mut self, key: &str, target: &[String]) -> Result<ConfigNode> {
        let not_found = || ConfigError::InterpolationTargetMissing {
            path: key.to_string(),
            target: join_path(target),
        };

        if target.is_empty() {
            return Err(not_found());
        }

        // Stays `None` while the walk is still inside the source tree.
        let mut detached: Option<ConfigNode> = None;
        for depth in 0..target.len() {
            let prefix = &target[..=depth];
            let next = match &detached {
                Some(node) => node.child(&target[depth]).cloned().ok_or_else(not_found)?,
                None => {
                    let is_interpolation = match self.source.get_path(prefix) {
                        Some(node) => matches!(node, ConfigNode::Interpolation(_)),
                        None => return Err(not_found()),
                    };
                    if !is_interpolation {
                        continue;
                    }
                    self.resolve_at(prefix)?
                }
            };
            detached = Some(match next {
                ConfigNode::Interpolation(_) => self.resolve_at(prefix)?,
                other => other,
            });
        }

        let current = match detached {
            Some(node) => node,
            None => self.source.get_path(target).cloned().ok_or_else(not_found)?,
        };
        self.resolve_subtree(target, current)
    }
}

fn describe_reference(reference: &Reference) -> String {
    match reference {
        Reference::Path(path) => join_path(path),
        Reference::Call { namespace, arg: Some(arg) } => format!("{}:{}", namespace, arg),
        Reference::Call { namespace, arg: None } => format!("{}:", namespace),
    }
}
