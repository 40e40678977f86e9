//! Error types for chain construction, version resolution, and validation.

use std::path::PathBuf;

use thiserror::Error;

use crate::version::VersionId;

/// Errors in version or constraint syntax.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("invalid version \"{input}\": {reason}")]
    InvalidVersionFormat { input: String, reason: String },

    #[error("invalid constraint \"{input}\": {reason}")]
    InvalidConstraintFormat { input: String, reason: String },
}

/// Structural errors in chain construction or delegation.
///
/// These indicate a misconfigured handler registry, never a bad input
/// document.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("unknown schema version {version}: supported versions are {}", supported.join(", "))]
    UnknownVersion {
        version: String,
        supported: Vec<String>,
    },

    #[error("handler for version {version} does not implement operation \"{operation}\"")]
    UnsupportedOperation {
        version: VersionId,
        operation: &'static str,
    },

    #[error("no {family} handlers registered")]
    EmptyRegistry { family: &'static str },
}

/// Errors while resolving packages and versions against a registry.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no version satisfying \"{constraint}\" among [{}]", candidates.join(", "))]
    NoCompatibleVersion {
        constraint: String,
        candidates: Vec<String>,
    },

    #[error("package \"{name}\" not found in registry")]
    PackageNotFound { name: String },

    #[error("package \"{name}\" has no version {version}")]
    VersionNotFound { name: String, version: String },
}

/// Errors during dependency-graph traversal.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("circular dependency: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("dependency graph exceeds maximum depth {max_depth}")]
    DependencyGraphTooDeep { max_depth: usize },
}

/// A schema document could not be supplied by the provider.
///
/// Propagated from the `SchemaProvider` capability untouched; the core
/// never retries.
#[derive(Debug, Error)]
#[error("schema for {kind} v{version} unavailable: {reason}")]
pub struct SchemaUnavailable {
    pub kind: &'static str,
    pub version: String,
    pub reason: String,
}

/// Errors that abort a validation call.
///
/// Data-quality findings never appear here; those are reported through
/// [`Outcome`](crate::Outcome) error lists.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Schema(#[from] SchemaUnavailable),
}

/// Errors that abort dependency assembly or closure traversal.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Errors while loading documents from disk or over HTTP.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("expected a top-level JSON object, got {actual}")]
    NotAnObject { actual: &'static str },
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::Schema(_) => 3,
            _ => 2,
        }
    }
}

impl AssembleError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_version_display() {
        let err = ChainError::UnknownVersion {
            version: "9.0.0".into(),
            supported: vec!["1.2.1".into(), "1.2.0".into(), "1.1.0".into()],
        };
        assert_eq!(
            err.to_string(),
            "unknown schema version 9.0.0: supported versions are 1.2.1, 1.2.0, 1.1.0"
        );
    }

    #[test]
    fn unsupported_operation_display() {
        let err = ChainError::UnsupportedOperation {
            version: VersionId::new(1, 1, 0),
            operation: "entry-points",
        };
        assert_eq!(
            err.to_string(),
            "handler for version 1.1.0 does not implement operation \"entry-points\""
        );
    }

    #[test]
    fn circular_dependency_display() {
        let err = GraphError::CircularDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "circular dependency: a -> b -> a");
    }

    #[test]
    fn load_error_exit_codes() {
        let err = LoadError::FileNotFound {
            path: PathBuf::from("manifest.json"),
        };
        assert_eq!(err.exit_code(), 3);

        let err = LoadError::NotAnObject { actual: "array" };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn validate_error_exit_codes() {
        let err = ValidateError::Schema(SchemaUnavailable {
            kind: "package",
            version: "1.1.0".into(),
            reason: "offline".into(),
        });
        assert_eq!(err.exit_code(), 3);

        let err = ValidateError::Chain(ChainError::EmptyRegistry {
            family: "validator",
        });
        assert_eq!(err.exit_code(), 2);
    }
}
