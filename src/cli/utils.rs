//! Shared CLI utilities.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::EnvBinding;
use crate::registry::SchemaRegistry;

/// Build the schema registry from the bundled demo schemas and/or a schema
/// definition file. Later definitions replace earlier ones with the same key.
pub fn load_registry(schema_file: Option<&Path>, demo: bool) -> Result<SchemaRegistry> {
    let mut registry =
        if demo { SchemaRegistry::with_demo_schemas() } else { SchemaRegistry::new() };
    if let Some(path) = schema_file {
        let count = registry
            .load_file(path)
            .with_context(|| format!("Failed to load schemas from {}", path.display()))?;
        tracing::debug!("{} schema(s) loaded from {}", count, path.display());
    }
    Ok(registry)
}

/// Parse repeated `--env VAR=key.path` flags.
pub fn parse_env_bindings(values: &[String]) -> Result<Vec<EnvBinding>> {
    values
        .iter()
        .map(|v| v.parse::<EnvBinding>().with_context(|| format!("Invalid --env binding '{v}'")))
        .collect()
}
