//! Evaluator contract
//!
//! Provides the [`Evaluator`] trait: a pure grading function of an evaluation
//! spec and one execution outcome.

use crate::error::EvaluationError;
use matrix_core::ExecutionOutcome;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declarative evaluation entry from a scenario
///
/// `type` selects the evaluator; all other keys are evaluator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSpec {
    /// Evaluator type
    #[serde(rename = "type")]
    pub kind: String,
    /// Evaluator parameters
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl EvaluationSpec {
    /// Create spec with no parameters
    #[inline]
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Map::new(),
        }
    }

    /// Add a parameter
    #[inline]
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Required string parameter
    ///
    /// # Errors
    /// Missing or non-string field.
    pub fn require_str(&self, field: &str) -> Result<&str, EvaluationError> {
        match self.params.get(field) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(EvaluationError::InvalidField {
                kind: self.kind.clone(),
                field: field.to_string(),
                expected: "a string",
            }),
            None => Err(EvaluationError::MissingField {
                kind: self.kind.clone(),
                field: field.to_string(),
            }),
        }
    }

    /// Optional boolean parameter
    ///
    /// # Errors
    /// Field present but not a boolean.
    pub fn optional_bool(&self, field: &str) -> Result<Option<bool>, EvaluationError> {
        match self.params.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(EvaluationError::InvalidField {
                kind: self.kind.clone(),
                field: field.to_string(),
                expected: "a boolean",
            }),
        }
    }

    /// Optional non-negative integer parameter
    ///
    /// # Errors
    /// Field present but not a non-negative integer.
    pub fn optional_u64(&self, field: &str) -> Result<Option<u64>, EvaluationError> {
        match self.params.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v.as_u64().map(Some).ok_or_else(|| EvaluationError::InvalidField {
                kind: self.kind.clone(),
                field: field.to_string(),
                expected: "a non-negative integer",
            }),
        }
    }
}

/// Outcome of a single evaluator invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Whether the check passed
    pub success: bool,
    /// One-line explanation
    pub message: String,
    /// Optional structured detail
    pub details: Value,
}

impl Verdict {
    /// Passing verdict
    #[inline]
    #[must_use]
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details: Value::Null,
        }
    }

    /// Failing verdict
    #[inline]
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: Value::Null,
        }
    }

    /// Verdict from a condition
    #[inline]
    #[must_use]
    pub fn from_condition(
        success: bool,
        pass_message: impl Into<String>,
        fail_message: impl Into<String>,
    ) -> Self {
        if success {
            Self::pass(pass_message)
        } else {
            Self::fail(fail_message)
        }
    }

    /// Attach details
    #[inline]
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Grading function for one evaluation type
///
/// Implementations must be pure with respect to `(spec, outcome)`.
pub trait Evaluator: Send + Sync + std::fmt::Debug {
    /// Evaluator type string this implementation handles
    fn name(&self) -> &'static str;

    /// Grade `outcome` against `spec`
    ///
    /// # Errors
    /// Malformed specs or evaluator-internal failures. The engine converts
    /// these into failed results.
    fn evaluate(
        &self,
        spec: &EvaluationSpec,
        outcome: &ExecutionOutcome,
    ) -> Result<Verdict, EvaluationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn spec_deserializes_type_and_params() {
        let spec: EvaluationSpec =
            serde_json::from_value(json!({ "type": "string_contains", "value": "hi" })).unwrap();
        assert_eq!(spec.kind, "string_contains");
        assert_eq!(spec.require_str("value").unwrap(), "hi");
    }

    #[test]
    fn spec_field_accessors_report_problems() {
        let spec = EvaluationSpec::new("x")
            .with_param("flag", json!("yes"))
            .with_param("limit", json!(-1));
        assert!(matches!(
            spec.require_str("missing"),
            Err(EvaluationError::MissingField { .. })
        ));
        assert!(matches!(
            spec.optional_bool("flag"),
            Err(EvaluationError::InvalidField { .. })
        ));
        assert!(spec.optional_u64("limit").is_err());
        assert_eq!(spec.optional_u64("other").unwrap(), None);
    }

    #[test]
    fn verdict_from_condition() {
        assert!(Verdict::from_condition(true, "ok", "bad").success);
        assert_eq!(Verdict::from_condition(false, "ok", "bad").message, "bad");
    }
}
