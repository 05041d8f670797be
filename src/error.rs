//! Error types for config resolution
//!
//! Structural problems (bad overrides, unknown schemas, interpolation errors)
//! abort resolution immediately. Field-level validation problems are collected
//! into a single `ValidationError` so every failure is reported in one run.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown schema '{0}'")]
    UnknownSchema(String),

    #[error("malformed override '{token}': {reason}")]
    MalformedOverride { token: String, reason: String },

    #[error("could not add '{path}': key already exists (use '++{path}=...' to force)")]
    FieldAlreadyExists { path: String },

    #[error("could not override '{path}': key not found (use '+{path}=...' to add it)")]
    FieldNotFound { path: String },

    #[error("missing mandatory value: {path}")]
    RequiredValueMissing { path: String },

    #[error("interpolation cycle: {}", chain.join(" -> "))]
    InterpolationCycle { chain: Vec<String> },

    #[error("interpolation target '{target}' not found (referenced from '{path}')")]
    InterpolationTargetMissing { path: String, target: String },

    #[error("invalid interpolation '{expr}' at '{path}': {reason}")]
    InterpolationSyntax { path: String, expr: String, reason: String },

    #[error("resolver '{resolver}' failed at '{path}': {reason}")]
    ResolverFailed { path: String, resolver: String, reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("config '{name}' not found in {}", dir.display())]
    ConfigNotFound { name: String, dir: PathBuf },

    #[error("unsupported config extension '.{ext}' for file {}", path.display())]
    UnsupportedFormat { ext: String, path: PathBuf },

    #[error("failed reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed parsing {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("cannot deserialize resolved config: {0}")]
    Deserialize(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    MissingRequiredField,
    TypeCoercionError,
    ConstraintViolation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::MissingRequiredField => "missing required field",
            FailureKind::TypeCoercionError => "type coercion error",
            FailureKind::ConstraintViolation => "constraint violation",
        };
        write!(f, "{}", label)
    }
}

/// A single field that failed binding.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFailure {
    pub path: String,
    pub kind: FailureKind,
    /// Declared type or violated bound.
    pub expected: String,
    /// Rendered received value, absent for missing fields.
    pub received: Option<String>,
}

impl fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.received {
            Some(received) => write!(
                f,
                "{}: {} (expected {}, received {})",
                self.path, self.kind, self.expected, received
            ),
            None => write!(f, "{}: {} (expected {})", self.path, self.kind, self.expected),
        }
    }
}

/// Every field failure found in one binding pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    failures: Vec<FieldFailure>,
}

impl ValidationError {
    pub fn new(failures: Vec<FieldFailure>) -> Self {
        Self { failures }
    }

    pub fn single(failure: FieldFailure) -> Self {
        Self { failures: vec![failure] }
    }

    pub fn failures(&self) -> &[FieldFailure] {
        &self.failures
    }

    pub fn paths(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.path.as_str()).collect()
    }

    pub fn find(&self, path: &str) -> Option<&FieldFailure> {
        self.failures.iter().find(|f| f.path == path)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  - {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}
