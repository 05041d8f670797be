//! confstack: compose layered configuration into one validated config
//!
//! Loads schema defaults, config files, config groups, environment bindings,
//! and command-line overrides, then prints the resolved configuration.

use anyhow::Result;

fn main() -> Result<()> {
    confstack::cli::run()
}
