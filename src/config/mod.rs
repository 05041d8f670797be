//! Configuration resolution
//!
//! Builds one validated configuration from layered sources, lowest precedence
//! first: schema defaults, group variants and the root file (in defaults-list
//! order), environment bindings, then CLI overrides. The merged tree is
//! interpolated and finally bound onto the schema.

pub mod bind;
pub mod env;
pub mod interpolate;
pub mod loader;
pub mod merge;
pub mod multirun;
pub mod overrides;
pub mod resolved;
pub mod resolvers;

pub use bind::{bind, implicit_root_schema, Bound};
pub use env::{EnvBinding, EnvSource};
pub use loader::{LoadedSources, SourceLoader};
pub use merge::{apply_overrides, merge, merge_fragments};
pub use multirun::{expand_sweeps, resolve_sweep, RunResult};
pub use overrides::{parse_override, Override, OverrideMode};
pub use resolved::ResolvedConfig;
pub use resolvers::{ResolverRegistry, RuntimeContext};

use crate::error::{ConfigError, Result};
use crate::registry::SchemaRegistry;
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything one resolution needs besides the registry.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    schema: Option<String>,
    config_dir: Option<PathBuf>,
    config_name: Option<String>,
    overrides: Vec<String>,
    env_bindings: Vec<EnvBinding>,
    env_source: EnvSource,
    cwd: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    resolvers: Option<ResolverRegistry>,
}

impl ResolveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary schema. Without one, the schema registered under the config
    /// name is used if there is one.
    pub fn schema(mut self, name: impl Into<String>) -> Self {
        self.schema = Some(name.into());
        self
    }

    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    pub fn config_name(mut self, name: impl Into<String>) -> Self {
        self.config_name = Some(name.into());
        self
    }

    pub fn overrides<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.overrides = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn env_binding(mut self, binding: EnvBinding) -> Self {
        self.env_bindings.push(binding);
        self
    }

    pub fn env_source(mut self, source: EnvSource) -> Self {
        self.env_source = source;
        self
    }

    /// Working directory reported by `${runtime:cwd}`. Defaults to the
    /// process working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Replace the built-in resolver table.
    pub fn resolvers(mut self, resolvers: ResolverRegistry) -> Self {
        self.resolvers = Some(resolvers);
        self
    }

    pub fn overrides_tokens(&self) -> &[String] {
        &self.overrides
    }

    pub fn output_dir_path(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    fn runtime_context(&self) -> Result<RuntimeContext> {
        let mut ctx = match &self.cwd {
            Some(cwd) => RuntimeContext::new(cwd.clone()),
            None => RuntimeContext::capture()
                .map_err(|source| ConfigError::Io { path: PathBuf::from("."), source })?,
        };
        ctx.output_dir = self.output_dir.clone();
        ctx.config_name = self.config_name.clone();
        ctx.env = self.env_source.clone();
        Ok(ctx)
    }
}

/// Run the full pipeline: load, merge, apply overrides, interpolate, bind.
/// Nothing partial is returned on failure.
pub fn resolve(registry: &SchemaRegistry, request: &ResolveRequest) -> Result<ResolvedConfig> {
    let sources = SourceLoader::new(registry)
        .schema(request.schema.clone())
        .config_dir(request.config_dir.clone())
        .config_name(request.config_name.clone())
        .env_bindings(request.env_bindings.clone())
        .env_source(request.env_source.clone())
        .load(&request.overrides)?;

    let mut tree = merge_fragments(&sources.fragments);
    apply_overrides(&mut tree, &sources.overrides)?;

    let ctx = request.runtime_context()?;
    let builtins;
    let resolvers = match &request.resolvers {
        Some(resolvers) => resolvers,
        None => {
            builtins = ResolverRegistry::with_builtins();
            &builtins
        }
    };
    let tree = interpolate::resolve_tree(tree, resolvers, &ctx)?;

    let root_schema = match &sources.schema {
        Some(name) => registry.get(name)?.clone(),
        None => implicit_root_schema(&sources.selections),
    };
    let bound = bind(registry, &root_schema, tree, &sources.selections)?;

    info!(
        "Resolved config from {} fragment(s) and {} override(s)",
        sources.fragments.len(),
        sources.overrides.len()
    );
    Ok(ResolvedConfig::new(bound.tree, bound.types, sources.selections, sources.tokens))
}
