//! Error types for evaluation
//!
//! Evaluator errors never escape the engine: each one is converted into a
//! failed `EvaluationResult` for the evaluation that raised it.

/// Errors raised by evaluators
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    /// Spec lacks a required field
    #[error("evaluation '{kind}' is missing required field '{field}'")]
    MissingField { kind: String, field: String },

    /// Field present but of the wrong type
    #[error("evaluation '{kind}' field '{field}' must be {expected}")]
    InvalidField {
        kind: String,
        field: String,
        expected: &'static str,
    },

    /// Regex pattern failed to compile
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Scenario declares evaluations or a strategy that cannot be read
    #[error("invalid evaluation plan at '{location}': {message}")]
    InvalidPlan { location: String, message: String },

    /// Evaluator-specific failure
    #[error("evaluator failed: {0}")]
    Failed(String),
}
