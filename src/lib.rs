//! confstack: layered configuration composition
//!
//! Resolves schema defaults, config files with group selections, environment
//! bindings, and command-line overrides into one interpolated, validated
//! configuration tree.
//!
//! ```no_run
//! use confstack::config::{resolve, ResolveRequest};
//! use confstack::registry::SchemaRegistry;
//!
//! let registry = SchemaRegistry::with_demo_schemas();
//! let request = ResolveRequest::new().schema("config").overrides(["+db=postgresql"]);
//! let config = resolve(&registry, &request)?;
//! assert_eq!(config.get_i64("db.timeout")?, 10);
//! # Ok::<(), confstack::error::ConfigError>(())
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod registry;
pub mod render;
pub mod utils;

pub use config::{resolve, ResolveRequest, ResolvedConfig};
pub use error::{ConfigError, Result};
pub use registry::SchemaRegistry;
