//! Small shared helpers

pub mod literals;

pub use literals::{is_valid_key_segment, parse_bool, parse_float, parse_int};
