//! Core data model: config trees, fragments, and schemas

pub mod fragment;
pub mod node;
pub mod schema;

pub use fragment::{Fragment, Origin, OriginKind};
pub use node::{join_path, split_path, ConfigNode, Mapping, Scalar, MISSING_TOKEN};
pub use schema::{Constraint, FieldDefault, FieldType, ScalarKind, Schema, SchemaField};
