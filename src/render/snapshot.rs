//! Per-run output directories and config snapshots

use super::to_yaml;
use crate::config::ResolvedConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

pub const SNAPSHOT_DIR: &str = ".confstack";

/// `<base>/<date>/<time>` for a run started at `started_at`.
pub fn run_output_dir(base: &Path, started_at: DateTime<Local>) -> PathBuf {
    base.join(started_at.format("%Y-%m-%d").to_string())
        .join(started_at.format("%H-%M-%S").to_string())
}

/// Write the resolved config and the applied overrides under
/// `<dir>/.confstack/`. Returns the snapshot directory.
pub fn write_run_snapshot(dir: &Path, config: &ResolvedConfig) -> Result<PathBuf> {
    let snapshot_dir = dir.join(SNAPSHOT_DIR);
    fs::create_dir_all(&snapshot_dir)
        .with_context(|| format!("Failed to create {}", snapshot_dir.display()))?;

    let config_path = snapshot_dir.join("config.yaml");
    fs::write(&config_path, to_yaml(config)?)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    let overrides_path = snapshot_dir.join("overrides.yaml");
    fs::write(&overrides_path, serde_yaml::to_string(config.overrides())?)
        .with_context(|| format!("Failed to write {}", overrides_path.display()))?;

    tracing::debug!("Wrote run snapshot to {}", snapshot_dir.display());
    Ok(snapshot_dir)
}
