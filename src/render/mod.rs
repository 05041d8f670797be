//! Output rendering (YAML, JSON, run snapshots)

pub mod snapshot;

pub use snapshot::{run_output_dir, write_run_snapshot};

use crate::config::ResolvedConfig;
use anyhow::Result;

/// Render the resolved tree as YAML, keys in insertion order. Missing values
/// print as `???`.
pub fn to_yaml(config: &ResolvedConfig) -> Result<String> {
    Ok(serde_yaml::to_string(&config.root().to_yaml_value())?)
}

pub fn to_json(config: &ResolvedConfig) -> Result<String> {
    Ok(serde_json::to_string_pretty(&config.root().to_json_value())?)
}
