//! Error types for the matrix model
//!
//! - Path parsing failures ([`PathError`], re-exported from `path`)
//! - Override traversal failures
//! - Matrix configuration and scenario loading failures

use crate::path::PathError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Errors while reading or writing values inside a document
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OverrideError {
    /// Path text is malformed
    #[error(transparent)]
    InvalidPath(#[from] PathError),

    /// An object key along the path is absent
    #[error("path '{path}' not found: missing key '{segment}'")]
    PathNotFound { path: String, segment: String },

    /// The container at a segment has the wrong type
    #[error("type mismatch at '{segment}' in '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        segment: String,
        expected: &'static str,
        found: &'static str,
    },

    /// An array index along the path is out of range
    #[error("index {index} out of bounds in '{path}' (length {len})")]
    IndexOutOfBounds { path: String, index: usize, len: usize },

    /// One override of a batch failed
    #[error("override #{index} for '{path}' failed: {source}")]
    OverrideFailed {
        index: usize,
        path: String,
        #[source]
        source: Box<OverrideError>,
    },
}

/// A matrix axis path that does not resolve against the base scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidParameterPath {
    /// Offending path
    pub path: String,
    /// Why it failed
    pub reason: String,
}

/// Configuration errors
///
/// All of these are fatal and abort before any run starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading a config or scenario file
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document could not be parsed
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Document parsed but violates matrix rules
    #[error("invalid matrix configuration: {}", .problems.join("; "))]
    Invalid { problems: Vec<String> },

    /// Axis paths that do not resolve against the base scenario
    #[error("invalid parameter paths: {}", format_invalid_paths(.paths))]
    InvalidParameterPaths { paths: Vec<InvalidParameterPath> },

    /// Combination filter removed every combination
    #[error("combination filter matched none of {total} combinations")]
    EmptySelection { total: usize },
}

impl ConfigError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create parse error for path
    pub fn parse_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

fn format_invalid_paths(paths: &[InvalidParameterPath]) -> String {
    paths
        .iter()
        .map(|p| format!("{} ({})", p.path, p.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_paths_display_lists_every_path() {
        let err = ConfigError::InvalidParameterPaths {
            paths: vec![
                InvalidParameterPath {
                    path: "a.b".into(),
                    reason: "missing".into(),
                },
                InvalidParameterPath {
                    path: "c".into(),
                    reason: "missing".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("a.b (missing)"));
        assert!(text.contains("c (missing)"));
    }

    #[test]
    fn override_failed_display_includes_cause() {
        let err = OverrideError::OverrideFailed {
            index: 0,
            path: "x".into(),
            source: Box::new(OverrideError::PathNotFound {
                path: "x".into(),
                segment: "x".into(),
            }),
        };
        assert!(err.to_string().contains("missing key 'x'"));
    }
}
