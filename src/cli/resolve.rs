//! Resolve command implementation

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use chrono::Local;
use std::path::{Path, PathBuf};

use super::utils::{load_registry, parse_env_bindings};
use crate::config::{resolve, resolve_sweep, ResolveRequest, ResolvedConfig};
use crate::registry::SchemaRegistry;
use crate::render::{run_output_dir, to_json, to_yaml, write_run_snapshot};

#[derive(Args)]
pub struct ResolveArgs {
    /// Directory holding the root config and one subdirectory per group
    #[arg(short = 'd', long, value_name = "DIR", env = "CONFSTACK_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Root config file name, without extension
    #[arg(short = 'n', long, value_name = "NAME", env = "CONFSTACK_CONFIG_NAME")]
    pub config_name: Option<String>,

    /// Primary schema to validate against
    #[arg(short, long, value_name = "NAME")]
    pub schema: Option<String>,

    /// Load schema definitions from a YAML, TOML, or JSON file
    #[arg(long, value_name = "FILE", env = "CONFSTACK_SCHEMA_FILE")]
    pub schema_file: Option<PathBuf>,

    /// Include the bundled demo schemas
    #[arg(long)]
    pub demo: bool,

    /// Bind an environment variable to a key path (VAR=key.path, repeatable)
    #[arg(long = "env", value_name = "VAR=PATH")]
    pub env: Vec<String>,

    /// Output format
    #[arg(short, long, value_name = "FORMAT", default_value = "yaml")]
    pub format: OutputFormat,

    /// Run output directory; a config snapshot is written there
    #[arg(short, long, value_name = "DIR", conflicts_with = "snapshot")]
    pub output_dir: Option<PathBuf>,

    /// Write a snapshot under outputs/<date>/<time>
    #[arg(long)]
    pub snapshot: bool,

    /// Expand comma-separated override values into one job per combination
    #[arg(short, long)]
    pub multirun: bool,

    /// Overrides: key=value, +key=value, ++key=value, ~key
    #[arg(value_name = "OVERRIDES")]
    pub overrides: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

pub fn run(args: ResolveArgs) -> Result<()> {
    let registry = load_registry(args.schema_file.as_deref(), args.demo)?;
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;

    let output_dir = match (&args.output_dir, args.snapshot) {
        (Some(dir), _) => Some(dir.clone()),
        (None, true) => Some(run_output_dir(&cwd.join("outputs"), Local::now())),
        (None, false) => None,
    };

    let mut request = ResolveRequest::new().cwd(cwd).overrides(args.overrides.iter().cloned());
    if let Some(schema) = &args.schema {
        request = request.schema(schema.clone());
    }
    if let Some(dir) = &args.config_dir {
        request = request.config_dir(dir.clone());
    }
    if let Some(name) = &args.config_name {
        request = request.config_name(name.clone());
    }
    for binding in parse_env_bindings(&args.env)? {
        request = request.env_binding(binding);
    }
    if let Some(dir) = &output_dir {
        request = request.output_dir(dir.clone());
    }

    if args.multirun {
        return run_multirun(&registry, &request, args.format, output_dir.as_deref());
    }

    let config = resolve(&registry, &request)?;
    print!("{}", render(&config, args.format)?);
    if let Some(dir) = &output_dir {
        let snapshot = write_run_snapshot(dir, &config)?;
        eprintln!("Snapshot written to {}", snapshot.display());
    }
    Ok(())
}

fn run_multirun(
    registry: &SchemaRegistry,
    request: &ResolveRequest,
    format: OutputFormat,
    output_dir: Option<&Path>,
) -> Result<()> {
    let runs = resolve_sweep(registry, request);
    let total = runs.len();
    let mut failed = 0;

    for run in runs {
        println!("# job {}: {}", run.index, run.overrides.join(" "));
        match run.result {
            Ok(config) => {
                print!("{}", render(&config, format)?);
                if let Some(dir) = output_dir {
                    write_run_snapshot(&dir.join(run.index.to_string()), &config)?;
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("job {} failed: {}", run.index, e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} job(s) failed", failed, total);
    }
    Ok(())
}

fn render(config: &ResolvedConfig, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => to_yaml(config),
        OutputFormat::Json => to_json(config).map(|json| json + "\n"),
    }
}
