//! Command-line interface for confstack
//!
//! Provides `resolve` and `schemas` subcommands.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod resolve;
mod schemas;
mod utils;

/// Compose layered configuration into one validated config
#[derive(Parser)]
#[command(name = "confstack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a configuration and print it
    Resolve(Box<resolve::ResolveArgs>),

    /// List registered schemas and their fields
    Schemas(schemas::SchemasArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG in the environment always takes precedence; --verbose falls back to DEBUG.
    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    match cli.command {
        Commands::Resolve(args) => resolve::run(*args),
        Commands::Schemas(args) => schemas::run(args),
    }
}
