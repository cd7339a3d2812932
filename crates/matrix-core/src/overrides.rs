//! Parameter override engine
//!
//! Produces an overridden copy of a scenario document for one combination.
//! The base document is never mutated; every variant is a deep clone.

use crate::error::{ConfigError, InvalidParameterPath, OverrideError};
use crate::path::{ParameterPath, PathSegment};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single value replacement inside a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterOverride {
    /// Dot/bracket path of the value to replace
    pub path: String,
    /// Replacement value
    pub value: Value,
}

impl ParameterOverride {
    /// Create new override
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// Check whether `path` resolves inside `doc`
///
/// Never fails: malformed paths, container type mismatches, out-of-range
/// indices and absent keys all yield `false`.
#[must_use]
pub fn validate_path(doc: &Value, path: &str) -> bool {
    ParameterPath::parse(path).is_ok_and(|parsed| resolve(doc, &parsed).is_ok())
}

/// Read the value at `path`
///
/// # Errors
/// - [`OverrideError::InvalidPath`] for malformed paths
/// - [`OverrideError::PathNotFound`] / [`OverrideError::TypeMismatch`] /
///   [`OverrideError::IndexOutOfBounds`] when traversal fails
pub fn get_value_at_path<'a>(doc: &'a Value, path: &str) -> Result<&'a Value, OverrideError> {
    let parsed = ParameterPath::parse(path)?;
    resolve(doc, &parsed)
}

/// Replace the value at `path` in place
///
/// Navigates to the parent of the final segment and overwrites the existing
/// entry there. The final key or index must already exist.
///
/// # Errors
/// Same conditions as [`get_value_at_path`].
pub fn set_value_at_path(doc: &mut Value, path: &str, value: Value) -> Result<(), OverrideError> {
    let parsed = ParameterPath::parse(path)?;
    let Some((last, parents)) = parsed.split_last() else {
        return Err(OverrideError::PathNotFound {
            path: path.to_string(),
            segment: String::new(),
        });
    };

    let mut current = doc;
    for segment in parents {
        current = step_mut(current, segment, path)?;
    }

    let slot = step_mut(current, last, path)?;
    *slot = value;
    Ok(())
}

/// Apply overrides to a deep clone of `base`
///
/// Overrides are applied in order, so later overrides on the same path win.
///
/// # Errors
/// Returns [`OverrideError::OverrideFailed`] naming the first override whose
/// path does not resolve. The partially built clone is dropped.
pub fn apply_overrides(
    base: &Value,
    overrides: &[ParameterOverride],
) -> Result<Value, OverrideError> {
    let mut doc = base.clone();

    for (index, item) in overrides.iter().enumerate() {
        let parsed = ParameterPath::parse(&item.path).map_err(|e| OverrideError::OverrideFailed {
            index,
            path: item.path.clone(),
            source: Box::new(e.into()),
        })?;

        resolve(&doc, &parsed).map_err(|e| OverrideError::OverrideFailed {
            index,
            path: item.path.clone(),
            source: Box::new(e),
        })?;

        set_value_at_path(&mut doc, &item.path, item.value.clone()).map_err(|e| {
            OverrideError::OverrideFailed {
                index,
                path: item.path.clone(),
                source: Box::new(e),
            }
        })?;
    }

    tracing::trace!(count = overrides.len(), "applied parameter overrides");
    Ok(doc)
}

/// Convert a parameter assignment into an override list
///
/// Overrides keep the iteration order of `parameters`; pass an axis-ordered
/// map when one axis path is nested inside another.
#[must_use]
pub fn combination_to_overrides<'a, I>(parameters: I) -> Vec<ParameterOverride>
where
    I: IntoIterator<Item = (&'a String, &'a Value)>,
{
    parameters
        .into_iter()
        .map(|(path, value)| ParameterOverride::new(path.clone(), value.clone()))
        .collect()
}

/// Pre-flight check that every axis path resolves against `base`
///
/// # Errors
/// Returns [`ConfigError::InvalidParameterPaths`] listing every failing path,
/// not just the first.
pub fn validate_matrix_parameter_paths<'a, I>(base: &Value, paths: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = &'a str>,
{
    let invalid: Vec<InvalidParameterPath> = paths
        .into_iter()
        .filter_map(|path| {
            let reason = match ParameterPath::parse(path) {
                Err(e) => e.to_string(),
                Ok(parsed) => match resolve(base, &parsed) {
                    Ok(_) => return None,
                    Err(e) => e.to_string(),
                },
            };
            Some(InvalidParameterPath {
                path: path.to_string(),
                reason,
            })
        })
        .collect();

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameterPaths { paths: invalid })
    }
}

fn resolve<'a>(doc: &'a Value, path: &ParameterPath) -> Result<&'a Value, OverrideError> {
    let mut current = doc;
    for segment in path.segments() {
        current = step(current, segment, path.as_str())?;
    }
    Ok(current)
}

fn step<'a>(
    current: &'a Value,
    segment: &PathSegment,
    path: &str,
) -> Result<&'a Value, OverrideError> {
    match (segment, current) {
        (PathSegment::Key(key), Value::Object(map)) => {
            map.get(key).ok_or_else(|| OverrideError::PathNotFound {
                path: path.to_string(),
                segment: key.clone(),
            })
        }
        (PathSegment::Index(index), Value::Array(items)) => {
            items.get(*index).ok_or(OverrideError::IndexOutOfBounds {
                path: path.to_string(),
                index: *index,
                len: items.len(),
            })
        }
        (segment, other) => Err(type_mismatch(segment, other, path)),
    }
}

fn step_mut<'a>(
    current: &'a mut Value,
    segment: &PathSegment,
    path: &str,
) -> Result<&'a mut Value, OverrideError> {
    match (segment, current) {
        (PathSegment::Key(key), Value::Object(map)) => {
            map.get_mut(key).ok_or_else(|| OverrideError::PathNotFound {
                path: path.to_string(),
                segment: key.clone(),
            })
        }
        (PathSegment::Index(index), Value::Array(items)) => {
            let len = items.len();
            items.get_mut(*index).ok_or(OverrideError::IndexOutOfBounds {
                path: path.to_string(),
                index: *index,
                len,
            })
        }
        (segment, other) => Err(type_mismatch(segment, other, path)),
    }
}

fn type_mismatch(segment: &PathSegment, found: &Value, path: &str) -> OverrideError {
    let expected = match segment {
        PathSegment::Key(_) => "object",
        PathSegment::Index(_) => "array",
    };
    OverrideError::TypeMismatch {
        path: path.to_string(),
        segment: segment.to_string(),
        expected,
        found: value_kind(found),
    }
}

/// Short type name of a JSON value, used in diagnostics
#[must_use]
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
