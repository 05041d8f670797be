//! Command-line override grammar
//!
//! Tokens look like `[+|++|~]key.path[=value]`:
//! - `key=value` overrides an existing key
//! - `+key=value` adds a key that must not exist yet
//! - `++key=value` adds or overrides
//! - `~key` deletes a key

use crate::domain::{join_path, ConfigNode, Scalar};
use crate::error::{ConfigError, Result};
use crate::utils::{is_valid_key_segment, parse_float, parse_int};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideMode {
    Override,
    Add,
    Upsert,
    Delete,
}

impl OverrideMode {
    pub fn prefix(&self) -> &'static str {
        match self {
            OverrideMode::Override => "",
            OverrideMode::Add => "+",
            OverrideMode::Upsert => "++",
            OverrideMode::Delete => "~",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub path: Vec<String>,
    pub value: ConfigNode,
    pub mode: OverrideMode,
    raw: String,
}

impl Override {
    pub fn key(&self) -> String {
        join_path(&self.path)
    }

    /// The token exactly as given on the command line.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The plain string value, if the value is an unquoted-or-quoted string.
    pub fn string_value(&self) -> Option<&str> {
        self.value.as_str()
    }
}

fn malformed(token: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::MalformedOverride { token: token.to_string(), reason: reason.into() }
}

pub fn parse_override(token: &str) -> Result<Override> {
    let (mode, rest) = if let Some(rest) = token.strip_prefix("++") {
        (OverrideMode::Upsert, rest)
    } else if let Some(rest) = token.strip_prefix('+') {
        (OverrideMode::Add, rest)
    } else if let Some(rest) = token.strip_prefix('~') {
        (OverrideMode::Delete, rest)
    } else {
        (OverrideMode::Override, token)
    };

    let (key, raw_value) = match rest.split_once('=') {
        Some((key, value)) => (key, Some(value)),
        None if mode == OverrideMode::Delete => (rest, None),
        None => return Err(malformed(token, "expected 'key=value'")),
    };

    let key = key.trim();
    if key.is_empty() {
        return Err(malformed(token, "empty key"));
    }
    let path: Vec<String> = key.split('.').map(str::to_string).collect();
    if let Some(bad) = path.iter().find(|seg| !is_valid_key_segment(seg)) {
        return Err(malformed(token, format!("invalid key segment '{}'", bad)));
    }

    let value = match raw_value {
        Some(raw) => parse_value(raw).map_err(|reason| malformed(token, reason))?,
        None => ConfigNode::null(),
    };

    Ok(Override { path, value, mode, raw: token.to_string() })
}

pub fn parse_overrides<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Override>> {
    tokens.iter().map(|t| parse_override(t.as_ref())).collect()
}

/// Type a raw override value: bool, then int, then float, then string.
/// Bracketed values are parsed as YAML flow collections.
pub fn parse_value(raw: &str) -> std::result::Result<ConfigNode, String> {
    let trimmed = raw.trim();

    if let Some(inner) = unquote(trimmed) {
        return Ok(ConfigNode::from_raw_str(inner));
    }
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        let value: serde_yaml::Value = serde_yaml::from_str(trimmed)
            .map_err(|e| format!("invalid structured literal: {}", e))?;
        return Ok(ConfigNode::from_yaml(value));
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Ok(ConfigNode::Scalar(Scalar::Bool(true))),
        "false" => return Ok(ConfigNode::Scalar(Scalar::Bool(false))),
        "null" => return Ok(ConfigNode::null()),
        _ => {}
    }
    if let Some(i) = parse_int(trimmed) {
        return Ok(ConfigNode::Scalar(Scalar::Int(i)));
    }
    if let Some(x) = parse_float(trimmed) {
        return Ok(ConfigNode::Scalar(Scalar::Float(x)));
    }
    Ok(ConfigNode::from_raw_str(trimmed))
}

fn unquote(s: &str) -> Option<&str> {
    if s.len() < 2 {
        return None;
    }
    ['"', '\''].into_iter().find_map(|q| s.strip_prefix(q).and_then(|r| r.strip_suffix(q)))
}

/// Split a sweep value on top-level commas, ignoring commas inside brackets,
/// braces, quotes, and `${...}` expressions.
pub fn split_sweep(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for ch in value.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
                current.push(ch);
                continue;
            }
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                current.push(ch);
                continue;
            }
            None => {}
        }

        match ch {
            '[' | '{' => depth += 1,
            ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!(parse_override("node.loompa=20").expect("ok").mode, OverrideMode::Override);
        assert_eq!(parse_override("+db.user=omry").expect("ok").mode, OverrideMode::Add);
        assert_eq!(parse_override("++db.user=omry").expect("ok").mode, OverrideMode::Upsert);
        let del = parse_override("~db.timeout").expect("ok");
        assert_eq!(del.mode, OverrideMode::Delete);
        assert_eq!(del.path, vec!["db".to_string(), "timeout".to_string()]);
    }

    #[test]
    fn test_missing_equals_is_malformed() {
        let err = parse_override("node.loompa").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedOverride { .. }));
        assert!(parse_override("+db").is_err());
    }

    #[test]
    fn test_invalid_key_is_malformed() {
        assert!(parse_override("=5").is_err());
        assert!(parse_override("a..b=1").is_err());
        assert!(parse_override("a b=1").is_err());
    }

    #[test]
    fn test_value_typing_order() {
        assert_eq!(parse_value("true"), Ok(ConfigNode::from(true)));
        assert_eq!(parse_value("20"), Ok(ConfigNode::from(20)));
        assert_eq!(parse_value("0.5"), Ok(ConfigNode::from(0.5)));
        assert_eq!(parse_value("secret"), Ok(ConfigNode::string("secret")));
        assert_eq!(parse_value("null"), Ok(ConfigNode::null()));
        assert_eq!(parse_value(""), Ok(ConfigNode::string("")));
        assert_eq!(parse_value("???"), Ok(ConfigNode::Missing));
    }

    #[test]
    fn test_quoted_value_stays_string() {
        assert_eq!(parse_value("'20'"), Ok(ConfigNode::string("20")));
        assert_eq!(parse_value("\"true\""), Ok(ConfigNode::string("true")));
    }

    #[test]
    fn test_structured_literal() {
        let node = parse_value("[1, 2, 3]").expect("list");
        assert_eq!(node.as_sequence().map(|s| s.len()), Some(3));
        let node = parse_value("{host: db, port: 5432}").expect("map");
        assert_eq!(node["port"], ConfigNode::from(5432));
        assert!(parse_value("[1, 2").is_err());
    }

    #[test]
    fn test_interpolation_value() {
        let ov = parse_override("path.data=${runtime:cwd}/data").expect("ok");
        assert!(matches!(ov.value, ConfigNode::Interpolation(_)));
    }

    #[test]
    fn test_value_may_contain_equals() {
        let ov = parse_override("db.dsn=host=a;port=1").expect("ok");
        assert_eq!(ov.value, ConfigNode::string("host=a;port=1"));
    }

    #[test]
    fn test_split_sweep() {
        assert_eq!(split_sweep("mysql,postgresql"), vec!["mysql", "postgresql"]);
        assert_eq!(split_sweep("[1,2],[3]"), vec!["[1,2]", "[3]"]);
        assert_eq!(split_sweep("'a,b',c"), vec!["'a,b'", "c"]);
        assert_eq!(split_sweep("single"), vec!["single"]);
    }
}
