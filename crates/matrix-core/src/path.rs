//! Parameter paths for addressing values inside scenario documents
//!
//! Provides [`ParameterPath`] for dot/bracket addressing of elements within a
//! document tree.
//!
//! # Grammar
//! - segments are separated by `.`
//! - each segment is an identifier (`[A-Za-z_][A-Za-z0-9_]*`)
//! - an identifier may carry one array index: `name[3]`
//!
//! # Examples
//! - `character.llm.model` → `["character", "llm", "model"]`
//! - `run[0].input` → `["run", 0, "input"]`

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// One step of a parameter path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
    /// Object property name
    Key(String),
    /// Array index
    Index(usize),
}

impl PathSegment {
    /// Get key name (if this is a key segment)
    #[inline]
    #[must_use]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(k) => Some(k),
            Self::Index(_) => None,
        }
    }

    /// Get array index (if this is an index segment)
    #[inline]
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Key(_) => None,
            Self::Index(i) => Some(*i),
        }
    }
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k}"),
            Self::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Parsed parameter path
///
/// Keeps the original text for diagnostics alongside the parsed segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl ParameterPath {
    /// Parse a path (same as [`FromStr`])
    ///
    /// # Errors
    /// Returns [`PathError::InvalidPath`] when the text violates the grammar.
    #[inline]
    pub fn parse(path: &str) -> Result<Self, PathError> {
        path.parse()
    }

    /// Get parsed segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Original path text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of segments (bracket indices count as their own segment)
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false for a parsed path; the grammar rejects empty input
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Split into parent segments and the final segment
    #[inline]
    #[must_use]
    pub fn split_last(&self) -> Option<(&PathSegment, &[PathSegment])> {
        self.segments.split_last()
    }
}

impl Display for ParameterPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ParameterPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| PathError::InvalidPath {
            path: s.to_string(),
            reason: reason.to_string(),
        };

        if s.is_empty() {
            return Err(invalid("path is empty"));
        }
        if s.starts_with('.') || s.ends_with('.') {
            return Err(invalid("path cannot start or end with '.'"));
        }

        let mut segments = Vec::new();
        for part in s.split('.') {
            if part.is_empty() {
                return Err(invalid("path contains an empty segment"));
            }

            match part.find('[') {
                Some(open) => {
                    let name = &part[..open];
                    let Some(inner) = part[open + 1..].strip_suffix(']') else {
                        return Err(invalid(&format!("unterminated index in segment '{part}'")));
                    };
                    if !is_identifier(name) {
                        return Err(invalid(&format!("invalid segment '{name}'")));
                    }
                    if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(invalid(&format!(
                            "array index '{inner}' must be a non-negative integer"
                        )));
                    }
                    let index = inner
                        .parse::<usize>()
                        .map_err(|_| invalid(&format!("array index '{inner}' is out of range")))?;
                    segments.push(PathSegment::Key(name.to_string()));
                    segments.push(PathSegment::Index(index));
                }
                None => {
                    if !is_identifier(part) {
                        return Err(invalid(&format!("invalid segment '{part}'")));
                    }
                    segments.push(PathSegment::Key(part.to_string()));
                }
            }
        }

        Ok(Self {
            raw: s.to_string(),
            segments,
        })
    }
}

impl Serialize for ParameterPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ParameterPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a path into its segments
///
/// # Errors
/// Returns [`PathError::InvalidPath`] when the text violates the grammar.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, PathError> {
    ParameterPath::parse(path).map(|p| p.segments)
}

/// Errors related to parameter paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Path text violates the grammar
    #[error("invalid parameter path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}
