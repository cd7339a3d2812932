//! External scenario executor contract
//!
//! The engine never decides what running a scenario means. It hands the
//! materialized document and an immutable [`RunEnvironment`] to a
//! [`ScenarioExecutor`] and grades whatever comes back.

use crate::error::ExecutorError;
use crate::isolation::IsolationContext;
use crate::mocks::MockTable;
use matrix_core::{ExecutionOutcome, MatrixCombination, RunId};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything an executor may know about its run
///
/// Passed explicitly instead of through process-wide state so concurrent
/// runs never observe each other's paths.
#[derive(Debug, Clone)]
pub struct RunEnvironment {
    /// Run identifier
    pub run_id: RunId,
    /// Owning combination
    pub combination_id: String,
    /// Scratch directory, removed after the run
    pub temp_dir: PathBuf,
    /// State-store location
    pub state_path: PathBuf,
    /// Per-run log file
    pub log_path: PathBuf,
    /// Materialized scenario document on disk
    pub scenario_path: PathBuf,
    /// Parameter assignment of the combination
    pub parameters: BTreeMap<String, Value>,
    /// Mocked dependency responses
    pub mocks: Arc<MockTable>,
}

impl RunEnvironment {
    /// Build from a sandbox and its combination
    #[must_use]
    pub fn new(context: &IsolationContext, combination: &MatrixCombination, mocks: MockTable) -> Self {
        Self {
            run_id: context.run_id().clone(),
            combination_id: combination.id.clone(),
            temp_dir: context.temp_dir().to_path_buf(),
            state_path: context.state_path().to_path_buf(),
            log_path: context.log_path().to_path_buf(),
            scenario_path: context.scenario_path().to_path_buf(),
            parameters: combination.parameters.clone(),
            mocks: Arc::new(mocks),
        }
    }
}

/// Executes one materialized scenario
///
/// Implementations should honor cancellation: the orchestrator drops the
/// returned future when the run timeout elapses.
#[async_trait::async_trait]
pub trait ScenarioExecutor: Send + Sync {
    /// Execute `scenario` inside `env`
    ///
    /// # Errors
    /// Any failure; it is recorded on the run result and never aborts the
    /// matrix unless `continue_on_failure` is disabled.
    async fn execute(
        &self,
        scenario: &Value,
        env: &RunEnvironment,
    ) -> Result<ExecutionOutcome, ExecutorError>;
}

#[async_trait::async_trait]
impl<T: ScenarioExecutor + ?Sized> ScenarioExecutor for Arc<T> {
    async fn execute(
        &self,
        scenario: &Value,
        env: &RunEnvironment,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        (**self).execute(scenario, env).await
    }
}
