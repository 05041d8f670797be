//! Resolver functions for `${namespace:arg}` interpolations
//!
//! Kept apart from tree lookups: a resolver reads the runtime environment
//! (working directory, output directory, variables, clock), never the config.

use super::env::EnvSource;
use crate::domain::ConfigNode;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Facts about the current run that resolvers may read.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub cwd: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub config_name: Option<String>,
    pub started_at: DateTime<Local>,
    pub env: EnvSource,
}

impl RuntimeContext {
    /// Capture the process working directory and the current time.
    pub fn capture() -> std::io::Result<Self> {
        Ok(Self {
            cwd: std::env::current_dir()?,
            output_dir: None,
            config_name: None,
            started_at: Local::now(),
            env: EnvSource::Process,
        })
    }

    pub fn new(cwd: PathBuf) -> Self {
        Self { cwd, output_dir: None, config_name: None, started_at: Local::now(), env: EnvSource::Process }
    }
}

pub type ResolverFn =
    Arc<dyn Fn(Option<&str>, &RuntimeContext) -> Result<ConfigNode, String> + Send + Sync>;

/// Namespaced table of resolver functions.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    table: BTreeMap<String, ResolverFn>,
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry").field("namespaces", &self.namespaces()).finish()
    }
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `runtime`, `env`, and `now`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("runtime", runtime_resolver);
        registry.register("env", env_resolver);
        registry.register("now", now_resolver);
        registry
    }

    pub fn register<F>(&mut self, namespace: &str, f: F)
    where
        F: Fn(Option<&str>, &RuntimeContext) -> Result<ConfigNode, String> + Send + Sync + 'static,
    {
        self.table.insert(namespace.to_string(), Arc::new(f));
    }

    pub fn get(&self, namespace: &str) -> Option<&ResolverFn> {
        self.table.get(namespace)
    }

    pub fn namespaces(&self) -> Vec<&str> {
        self.table.keys().map(String::as_str).collect()
    }
}

fn runtime_resolver(arg: Option<&str>, ctx: &RuntimeContext) -> Result<ConfigNode, String> {
    match arg.map(str::trim) {
        Some("cwd") => Ok(ConfigNode::string(ctx.cwd.display().to_string())),
        Some("output_dir") => ctx
            .output_dir
            .as_ref()
            .map(|dir| ConfigNode::string(dir.display().to_string()))
            .ok_or_else(|| "no output directory configured for this run".to_string()),
        Some("config_name") => ctx
            .config_name
            .as_ref()
            .map(|name| ConfigNode::string(name.clone()))
            .ok_or_else(|| "no config name for this run".to_string()),
        Some(other) => Err(format!("unknown runtime value '{}'", other)),
        None => Err("expected runtime:cwd, runtime:output_dir, or runtime:config_name".to_string()),
    }
}

fn env_resolver(arg: Option<&str>, ctx: &RuntimeContext) -> Result<ConfigNode, String> {
    let arg = arg.ok_or_else(|| "expected env:NAME or env:NAME,default".to_string())?;
    let (name, default) = match arg.split_once(',') {
        Some((name, default)) => (name.trim(), Some(default.trim())),
        None => (arg.trim(), None),
    };
    match (ctx.env.get(name), default) {
        (Some(value), _) => Ok(ConfigNode::string(value)),
        (None, Some(default)) => Ok(ConfigNode::string(default)),
        (None, None) => Err(format!("environment variable '{}' is not set", name)),
    }
}

fn now_resolver(arg: Option<&str>, ctx: &RuntimeContext) -> Result<ConfigNode, String> {
    let pattern = arg.unwrap_or(DEFAULT_TIME_FORMAT);
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid time format '{}'", pattern));
    }
    Ok(ConfigNode::string(ctx.started_at.format(pattern).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx() -> RuntimeContext {
        RuntimeContext {
            cwd: PathBuf::from("/work"),
            output_dir: Some(PathBuf::from("/work/outputs/run")),
            config_name: Some("config".into()),
            started_at: Local.with_ymd_and_hms(2025, 6, 19, 10, 29, 36).single().expect("valid time"),
            env: EnvSource::fixed([("HOME", "/home/omry")]),
        }
    }

    fn call(registry: &ResolverRegistry, ns: &str, arg: Option<&str>) -> Result<ConfigNode, String> {
        let f = registry.get(ns).expect("registered");
        f(arg, &ctx())
    }

    #[test]
    fn test_runtime_values() {
        let registry = ResolverRegistry::with_builtins();
        assert_eq!(call(&registry, "runtime", Some("cwd")), Ok(ConfigNode::string("/work")));
        assert_eq!(
            call(&registry, "runtime", Some("output_dir")),
            Ok(ConfigNode::string("/work/outputs/run"))
        );
        assert!(call(&registry, "runtime", Some("choices")).is_err());
    }

    #[test]
    fn test_env_with_default() {
        let registry = ResolverRegistry::with_builtins();
        assert_eq!(call(&registry, "env", Some("HOME")), Ok(ConfigNode::string("/home/omry")));
        assert_eq!(call(&registry, "env", Some("USER, nobody")), Ok(ConfigNode::string("nobody")));
        assert!(call(&registry, "env", Some("USER")).is_err());
    }

    #[test]
    fn test_now_formats_start_time() {
        let registry = ResolverRegistry::with_builtins();
        assert_eq!(call(&registry, "now", Some("%Y-%m-%d")), Ok(ConfigNode::string("2025-06-19")));
        assert_eq!(call(&registry, "now", None), Ok(ConfigNode::string("2025-06-19_10-29-36")));
        assert!(call(&registry, "now", Some("%Q")).is_err());
    }

    #[test]
    fn test_custom_resolver() {
        let mut registry = ResolverRegistry::new();
        registry.register("double", |arg, _| {
            let n: i64 = arg.unwrap_or("0").parse().map_err(|_| "not a number".to_string())?;
            Ok(ConfigNode::from(n * 2))
        });
        assert_eq!(call(&registry, "double", Some("21")), Ok(ConfigNode::from(42)));
        assert_eq!(registry.namespaces(), vec!["double"]);
    }
}
