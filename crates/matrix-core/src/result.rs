//! Per-run results
//!
//! A [`MatrixRunResult`] is created exactly once per (combination ×
//! repetition) and persisted as soon as the run settles.

use crate::outcome::ExecutionOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use ulid::Ulid;

/// Unique run identifier
///
/// Embeds the combination id and repetition for readability plus a ULID so
/// ids never collide across process restarts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate id for repetition `repetition` (0-based) of a combination
    #[must_use]
    pub fn generate(combination_id: &str, repetition: u32) -> Self {
        let suffix = Ulid::new().to_string().to_lowercase();
        Self(format!("{combination_id}-r{}-{suffix}", repetition + 1))
    }

    /// Wrap an existing id
    #[inline]
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id as text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one evaluation check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Evaluator type that produced this result
    pub evaluator_type: String,
    /// Whether the check passed
    pub success: bool,
    /// One-line human summary
    pub summary: String,
    /// Evaluator-specific detail
    #[serde(default)]
    pub details: Value,
}

impl EvaluationResult {
    /// Passing result
    #[must_use]
    pub fn pass(evaluator_type: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            evaluator_type: evaluator_type.into(),
            success: true,
            summary: summary.into(),
            details: Value::Null,
        }
    }

    /// Failing result
    #[must_use]
    pub fn fail(evaluator_type: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            evaluator_type: evaluator_type.into(),
            success: false,
            summary: summary.into(),
            details: Value::Null,
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

/// What the executor produced plus how it was graded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Raw executor outcome
    pub outcome: ExecutionOutcome,
    /// One entry per configured evaluation
    pub evaluations: Vec<EvaluationResult>,
    /// Judgment strategy used to reduce the evaluations
    pub judgment: String,
}

/// Resource usage attributed to one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// System memory in use after minus before (bytes)
    pub memory_delta_bytes: i64,
    /// Disk space in use after minus before (bytes)
    pub disk_delta_bytes: i64,
    /// CPU utilization sampled at run end (percent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    /// Tokens reported by the executor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
}

/// Result of one (combination × repetition)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRunResult {
    /// Run identifier
    pub run_id: RunId,
    /// Owning combination
    pub combination_id: String,
    /// Repetition number (1-based)
    pub repetition: u32,
    /// Parameter assignment of the combination
    pub parameters: BTreeMap<String, Value>,
    /// Run start
    pub start_time: DateTime<Utc>,
    /// Run end
    pub end_time: DateTime<Utc>,
    /// End minus start in milliseconds
    pub duration_ms: u64,
    /// Final verdict
    pub success: bool,
    /// Executor outcome and grading, absent when the executor never returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_result: Option<ScenarioResult>,
    /// Failure description; always non-empty when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Resource usage
    pub metrics: RunMetrics,
}

impl MatrixRunResult {
    /// Lightweight view used by combination summaries
    #[must_use]
    pub fn digest(&self) -> RunDigest {
        RunDigest {
            run_id: self.run_id.clone(),
            success: self.success,
            duration_ms: self.duration_ms,
            error: self.error.clone(),
        }
    }
}

/// Minimal per-run record kept by summaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDigest {
    /// Run identifier
    pub run_id: RunId,
    /// Final verdict
    pub success: bool,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
