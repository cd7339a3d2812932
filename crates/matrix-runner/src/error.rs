//! Error types for the matrix runner
//!
//! Provides error handling for:
//! - Pre-flight configuration and scenario problems (fatal before any run)
//! - Sandbox creation and removal
//! - External executor failures and timeouts
//! - Result persistence
//! - Resource sampling
//! - Run state transitions

use crate::progress::RunState;
use matrix_core::{ConfigError, MatrixExecutionSummary, OverrideError, RunId};
use std::path::PathBuf;

/// Main runner error type
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    /// Matrix configuration or runner options are invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Base scenario cannot be used
    #[error("invalid scenario: {0}")]
    Scenario(String),

    /// Output directory could not be written
    #[error("result store error: {0}")]
    Store(#[from] StoreError),

    /// A run failed with `continue_on_failure` disabled
    #[error("matrix aborted after run {run_id} failed: {reason}")]
    Aborted {
        /// First failing run
        run_id: RunId,
        /// Its error
        reason: String,
        /// Summary of everything that settled before the abort
        summary: Box<MatrixExecutionSummary>,
    },
}

impl MatrixError {
    /// Check if error was raised before any run started
    #[inline]
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Scenario(_))
    }

    /// Summary written before the error, if any
    #[must_use]
    pub fn summary(&self) -> Option<&MatrixExecutionSummary> {
        match self {
            Self::Aborted { summary, .. } => Some(summary),
            _ => None,
        }
    }
}

/// Sandbox errors; fatal for the affected run only
#[derive(Debug, thiserror::Error)]
pub enum IsolationError {
    /// Directory tree could not be created
    #[error("failed to create isolated environment at {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Overrides could not be applied to the base scenario
    #[error("failed to materialize scenario: {0}")]
    Materialize(#[from] OverrideError),

    /// Variant could not be serialized
    #[error("failed to serialize scenario: {0}")]
    Serialize(String),

    /// Other filesystem failure inside the sandbox
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure reported by, or imposed on, an external executor
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Executor reported failure
    #[error("execution failed: {0}")]
    Failed(String),

    /// Executor did not settle within the run timeout
    #[error("Run timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Executor observed cancellation
    #[error("execution cancelled")]
    Cancelled,

    /// Anything else the executor propagated
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExecutorError {
    /// Check if the run hit its timeout
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Create failure from message
    #[inline]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Write or read failed
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Value could not be encoded
    #[error("failed to serialize {path}: {message}")]
    Serialize { path: PathBuf, message: String },

    /// Stored document could not be decoded
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Resource sampling errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    /// Probe could not read system counters
    #[error("resource probe failed: {0}")]
    ProbeFailed(String),
}

/// Mock table construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MockError {
    /// `setup.mocks` entry is malformed
    #[error("invalid mock at setup.mocks[{index}]: {message}")]
    InvalidRule { index: usize, message: String },
}

/// Run lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgressError {
    /// Run id was never queued or started
    #[error("unknown run {0}")]
    UnknownRun(RunId),

    /// Transition not permitted by the run state machine
    #[error("illegal transition for run {run_id}: {from:?} -> {to:?}")]
    IllegalTransition {
        run_id: RunId,
        from: RunState,
        to: RunState,
    },
}
