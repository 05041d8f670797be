//! Schemas command implementation

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::utils::load_registry;
use crate::domain::Schema;
use crate::registry::describe_field;

#[derive(Args)]
pub struct SchemasArgs {
    /// Only show this schema (`name` or `group/variant`)
    #[arg(value_name = "NAME")]
    pub name: Option<String>,

    /// Load schema definitions from a YAML, TOML, or JSON file
    #[arg(long, value_name = "FILE", env = "CONFSTACK_SCHEMA_FILE")]
    pub schema_file: Option<PathBuf>,

    /// Include the bundled demo schemas
    #[arg(long)]
    pub demo: bool,
}

pub fn run(args: SchemasArgs) -> Result<()> {
    let registry = load_registry(args.schema_file.as_deref(), args.demo)?;

    if let Some(name) = &args.name {
        print_schema(name, registry.get(name)?);
        return Ok(());
    }

    if registry.is_empty() {
        println!("No schemas registered. Use --demo or --schema-file FILE.");
        return Ok(());
    }

    println!("Schemas ({}):", registry.len());
    for (key, schema) in registry.iter() {
        print_schema(key, schema);
    }
    Ok(())
}

fn print_schema(key: &str, schema: &Schema) {
    println!("{}", key);
    for field in &schema.fields {
        println!("  {}", describe_field(field));
        if let Some(description) = &field.description {
            println!("      {}", description);
        }
    }
}
