//! What an external scenario executor hands back for one run

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Outcome of executing one materialized scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Captured standard output (or the agent's final response)
    #[serde(default)]
    pub stdout: String,
    /// Captured standard error
    #[serde(default)]
    pub stderr: String,
    /// Files produced by the run, keyed by relative path
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    /// Wall-clock execution time reported by the executor
    #[serde(default)]
    pub duration_ms: u64,
    /// Ordered agent steps (opaque to the engine)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trajectory: Vec<Value>,
    /// LLM tokens consumed, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
}

impl ExecutionOutcome {
    /// Outcome with only stdout set
    #[must_use]
    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Add a produced file
    #[inline]
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Add a trajectory step
    #[inline]
    #[must_use]
    pub fn with_step(mut self, step: Value) -> Self {
        self.trajectory.push(step);
        self
    }

    /// With reported duration
    #[inline]
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// With token count
    #[inline]
    #[must_use]
    pub fn with_token_count(mut self, tokens: u64) -> Self {
        self.token_count = Some(tokens);
        self
    }
}
