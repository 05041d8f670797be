//! Literal grammars shared by override parsing and schema coercion.

use once_cell::sync::Lazy;
use regex::Regex;

static KEY_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").expect("valid regex"));

static INDEX_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));

static INT_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+|\d{1,3}(_\d{3})+)$").expect("valid regex"));

static FLOAT_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?((\d+\.\d*|\.\d+|\d+)([eE][+-]?\d+)?|inf|nan)$").expect("valid regex")
});

/// A config key segment: identifier-like name or a sequence index.
pub fn is_valid_key_segment(segment: &str) -> bool {
    KEY_SEGMENT.is_match(segment) || INDEX_SEGMENT.is_match(segment)
}

/// Parse a string that is entirely an integer literal (`_` digit grouping allowed).
pub fn parse_int(raw: &str) -> Option<i64> {
    if !INT_LITERAL.is_match(raw) {
        return None;
    }
    raw.replace('_', "").parse().ok()
}

/// Parse a string that is entirely a float literal, including `inf` and `nan`.
pub fn parse_float(raw: &str) -> Option<f64> {
    if !FLOAT_LITERAL.is_match(&raw.to_ascii_lowercase()) {
        return None;
    }
    raw.parse().ok()
}

/// Canonical boolean spellings accepted when coercing to `bool`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "y" | "t" | "1" => Some(true),
        "false" | "no" | "off" | "n" | "f" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_segments() {
        assert!(is_valid_key_segment("learning_rate"));
        assert!(is_valid_key_segment("data-dir"));
        assert!(is_valid_key_segment("0"));
        assert!(!is_valid_key_segment("9lives"));
        assert!(!is_valid_key_segment(""));
        assert!(!is_valid_key_segment("a b"));
    }

    #[test]
    fn test_int_requires_full_match() {
        assert_eq!(parse_int("20"), Some(20));
        assert_eq!(parse_int("-7"), Some(-7));
        assert_eq!(parse_int("1_000"), Some(1000));
        assert_eq!(parse_int("20x"), None);
        assert_eq!(parse_int("2.0"), None);
        assert_eq!(parse_int(" 20"), None);
    }

    #[test]
    fn test_float_literals() {
        assert_eq!(parse_float("0.01"), Some(0.01));
        assert_eq!(parse_float("1e-3"), Some(0.001));
        assert_eq!(parse_float("3"), Some(3.0));
        assert!(parse_float("inf").map(f64::is_infinite).unwrap_or(false));
        assert_eq!(parse_float("t299.99"), None);
    }

    #[test]
    fn test_bool_forms() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
