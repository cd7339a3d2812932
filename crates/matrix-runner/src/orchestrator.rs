//! Matrix orchestrator
//!
//! Drives a whole matrix execution:
//! - Pre-flight: options, config, base scenario, parameter paths, filter
//! - Admission: a semaphore bounds in-flight runs to `max_parallel`
//! - Per run: sandbox, materialize, invoke with timeout, evaluate, persist
//! - Failure policy: continue, or abort remaining and clean in-flight runs
//! - Finish: summary plus execution log written next to the run results
//!
//! # Admission
//!
//! A run task hands its permit back with its result. The control loop
//! drops the permit only after recording the result, so every result is
//! persisted and observed before the slot it occupied can be reused.

use crate::error::{ExecutorError, MatrixError};
use crate::executor::{RunEnvironment, ScenarioExecutor};
use crate::isolation::{IsolationContext, IsolationManager};
use crate::mocks::MockTable;
use crate::observer::{ExecutionObserver, TracingObserver};
use crate::options::RunnerOptions;
use crate::progress::{ProgressEventKind, ProgressTracker};
use crate::report::render_execution_log;
use crate::resources::{ResourceMonitor, ResourceProbe, ResourceSnapshot, SystemProbe};
use crate::store::ResultStore;
use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use matrix_core::{
    filter_combinations, generate_combinations, load_scenario, validate_matrix_parameter_paths,
    MatrixCombination, MatrixConfig, MatrixExecutionSummary, MatrixRunResult, RunId, RunMetrics,
    ScenarioResult,
};
use matrix_eval::{panic_message, EvaluationEngine, EvaluationPlan};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// What `execute` would do, computed without running anything
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub config_name: String,
    pub combinations: Vec<MatrixCombination>,
    pub runs_per_combination: u32,
    pub total_runs: usize,
    pub max_parallel: usize,
}

/// Top-level driver of a matrix execution
pub struct MatrixOrchestrator {
    config: MatrixConfig,
    options: RunnerOptions,
    executor: Arc<dyn ScenarioExecutor>,
    engine: EvaluationEngine,
    observer: Arc<dyn ExecutionObserver>,
    probe: Arc<dyn ResourceProbe>,
}

impl std::fmt::Debug for MatrixOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixOrchestrator")
            .field("config", &self.config.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl MatrixOrchestrator {
    /// Create orchestrator with built-in evaluators, a `tracing` observer
    /// and a system resource probe
    #[must_use]
    pub fn new(config: MatrixConfig, options: RunnerOptions, executor: Arc<dyn ScenarioExecutor>) -> Self {
        Self {
            config,
            options,
            executor,
            engine: EvaluationEngine::default(),
            observer: Arc::new(TracingObserver),
            probe: Arc::new(SystemProbe::new()),
        }
    }

    /// With host observer
    #[inline]
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// With resource probe
    #[inline]
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// With evaluation engine
    #[inline]
    #[must_use]
    pub fn with_engine(mut self, engine: EvaluationEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Matrix configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MatrixConfig {
        &self.config
    }

    /// Runner options
    #[inline]
    #[must_use]
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    fn prepare(&self) -> Result<(Value, Vec<MatrixCombination>), MatrixError> {
        self.options.validate()?;
        self.config.validate()?;

        let base = load_scenario(&self.config.base_scenario)?;
        validate_matrix_parameter_paths(&base, self.config.parameter_paths())?;
        MockTable::from_scenario(&base).map_err(|e| MatrixError::Scenario(e.to_string()))?;

        let combinations =
            filter_combinations(generate_combinations(&self.config.matrix), &self.options.filter)?;
        Ok((base, combinations))
    }

    /// Validate everything `execute` validates and report the schedule
    ///
    /// # Errors
    /// Any configuration error `execute` would raise before its first run.
    pub fn plan(&self) -> Result<ExecutionPlan, MatrixError> {
        let (_, combinations) = self.prepare()?;
        let runs = self.config.runs_per_combination;
        Ok(ExecutionPlan {
            config_name: self.config.name.clone(),
            total_runs: combinations.len() * runs as usize,
            combinations,
            runs_per_combination: runs,
            max_parallel: self.options.max_parallel,
        })
    }

    /// Execute every (combination × repetition)
    ///
    /// # Errors
    /// - Configuration errors before any run starts
    /// - Store errors if the output directory cannot be written
    /// - [`MatrixError::Aborted`] when a run fails with
    ///   `continue_on_failure` disabled; the summary is still persisted
    pub async fn execute(&self) -> Result<MatrixExecutionSummary, MatrixError> {
        let (base, combinations) = self.prepare()?;
        let runs = self.config.runs_per_combination;
        let max_parallel = self.options.max_parallel;
        let total_runs = combinations.len() * runs as usize;

        info!(
            matrix = %self.config.name,
            combinations = combinations.len(),
            total_runs,
            max_parallel,
            "starting matrix execution"
        );

        let store = ResultStore::new(&self.options.output_dir);
        store.initialize(&self.config).await?;

        let shared = Arc::new(RunShared {
            base,
            executor: Arc::clone(&self.executor),
            engine: self.engine.clone(),
            isolation: IsolationManager::new(&self.options.isolation_root),
            store: store.clone(),
            tracker: ProgressTracker::new(total_runs, max_parallel, Arc::clone(&self.observer)),
            monitor: ResourceMonitor::new(
                Arc::clone(&self.probe),
                self.options.thresholds,
                self.options.monitor_interval,
                Arc::clone(&self.observer),
            ),
            inflight: Mutex::new(HashMap::new()),
            run_timeout: self.options.run_timeout,
        });

        for combination in &combinations {
            shared.tracker.register_combination(combination, runs as usize);
        }
        shared.tracker.announce(
            ProgressEventKind::MatrixStarted,
            format!("executing matrix '{}'", self.config.name),
            json!({ "combinations": combinations.len(), "total_runs": total_runs }),
        );

        let started_at = Utc::now();
        shared.monitor.start();

        let semaphore = Arc::new(Semaphore::new(max_parallel));
        let mut tasks: JoinSet<RunOutcome> = JoinSet::new();
        let mut ledger = Ledger::new(total_runs, self.options.continue_on_failure);

        'schedule: for combination in &combinations {
            let combination = Arc::new(combination.clone());
            for repetition in 0..runs {
                while let Some(joined) = tasks.try_join_next() {
                    ledger.settle(joined);
                }
                if ledger.should_stop() {
                    break 'schedule;
                }

                let permit = loop {
                    tokio::select! {
                        biased;
                        Some(joined) = tasks.join_next() => {
                            ledger.settle(joined);
                            if ledger.should_stop() {
                                break 'schedule;
                            }
                        }
                        permit = Arc::clone(&semaphore).acquire_owned() => break permit,
                    }
                };
                let Ok(permit) = permit else {
                    break 'schedule;
                };

                let run_id = RunId::generate(&combination.id, repetition);
                shared.tracker.queue_run(&run_id, &combination.id);
                tasks.spawn(run_task(
                    Arc::clone(&shared),
                    Arc::clone(&combination),
                    repetition,
                    run_id,
                    permit,
                ));
            }
        }

        if ledger.should_stop() {
            warn!(in_flight = tasks.len(), "aborting remaining runs");
            tasks.abort_all();
        }
        while let Some(joined) = tasks.join_next().await {
            ledger.settle(joined);
        }
        shared.release_abandoned().await;

        shared.monitor.stop();
        let finished_at = Utc::now();
        let Ledger { results, failure, .. } = ledger;

        let summary = MatrixExecutionSummary::from_results(
            self.config.name.clone(),
            &combinations,
            runs,
            &results,
            shared.monitor.get_statistics(),
            started_at,
            finished_at,
            failure.is_some(),
        );
        store.save_summary(&summary).await?;
        store
            .save_execution_log(&render_execution_log(&summary, &results))
            .await?;

        shared.tracker.announce(
            ProgressEventKind::MatrixCompleted,
            format!(
                "matrix '{}' finished: {}/{} successful",
                summary.matrix_name, summary.successful_runs, summary.total_runs
            ),
            json!({ "success_rate": summary.success_rate, "aborted": summary.aborted }),
        );
        info!(
            matrix = %summary.matrix_name,
            total = summary.total_runs,
            successful = summary.successful_runs,
            failed = summary.failed_runs,
            duration_ms = summary.total_duration_ms,
            "matrix execution finished"
        );

        match failure {
            Some((run_id, reason)) => Err(MatrixError::Aborted {
                run_id,
                reason,
                summary: Box::new(summary),
            }),
            None => Ok(summary),
        }
    }
}

/// Results gathered by the control loop
struct Ledger {
    results: Vec<MatrixRunResult>,
    failure: Option<(RunId, String)>,
    continue_on_failure: bool,
}

impl Ledger {
    fn new(capacity: usize, continue_on_failure: bool) -> Self {
        Self {
            results: Vec::with_capacity(capacity),
            failure: None,
            continue_on_failure,
        }
    }

    fn should_stop(&self) -> bool {
        self.failure.is_some()
    }

    fn settle(&mut self, joined: Result<RunOutcome, JoinError>) {
        match joined {
            Ok(RunOutcome { result, permit }) => {
                if !result.success && !self.continue_on_failure && self.failure.is_none() {
                    let reason = result.error.clone().unwrap_or_default();
                    self.failure = Some((result.run_id.clone(), reason));
                }
                self.results.push(result);
                drop(permit);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => error!(error = %e, "run task panicked"),
        }
    }
}

/// Finished run plus the admission slot it held
struct RunOutcome {
    result: MatrixRunResult,
    permit: OwnedSemaphorePermit,
}

/// Everything a run task needs, shared across tasks
struct RunShared {
    base: Value,
    executor: Arc<dyn ScenarioExecutor>,
    engine: EvaluationEngine,
    isolation: IsolationManager,
    store: ResultStore,
    tracker: ProgressTracker,
    monitor: ResourceMonitor,
    inflight: Mutex<HashMap<RunId, IsolationContext>>,
    run_timeout: Duration,
}

struct Attempt {
    success: bool,
    scenario_result: Option<ScenarioResult>,
    error: Option<String>,
}

impl Attempt {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            scenario_result: None,
            error: Some(error.into()),
        }
    }
}

impl RunShared {
    async fn attempt(&self, run_id: &RunId, combination: &MatrixCombination) -> Attempt {
        // Registered before any directory exists so an abort can still find it.
        let context = self.isolation.layout(run_id);
        self.inflight.lock().insert(run_id.clone(), context.clone());
        if let Err(e) = IsolationManager::allocate(&context).await {
            warn!(run_id = %run_id, error = %e, "isolated environment unavailable");
            self.inflight.lock().remove(run_id);
            return Attempt::failed(e.to_string());
        }

        let attempt = match AssertUnwindSafe(self.invoke(&context, combination)).catch_unwind().await {
            Ok(attempt) => attempt,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(run_id = %run_id, panic = %message, "run panicked");
                Attempt::failed(format!("run panicked: {message}"))
            }
        };

        if let Err(e) = context.cleanup().await {
            warn!(run_id = %run_id, error = %e, "failed to clean up isolated environment");
        }
        self.inflight.lock().remove(run_id);
        attempt
    }

    async fn invoke(&self, context: &IsolationContext, combination: &MatrixCombination) -> Attempt {
        let run_id = context.run_id();

        let scenario = match context.write_scenario(&self.base, &combination.overrides()).await {
            Ok(scenario) => scenario,
            Err(e) => return Attempt::failed(e.to_string()),
        };
        let plan = match EvaluationPlan::from_scenario(&scenario) {
            Ok(plan) => plan,
            Err(e) => return Attempt::failed(e.to_string()),
        };
        let mocks = match MockTable::from_scenario(&scenario) {
            Ok(mocks) => mocks,
            Err(e) => return Attempt::failed(e.to_string()),
        };
        let env = RunEnvironment::new(context, combination, mocks);
        self.report(run_id, 0.2, "scenario materialized");

        let outcome = match tokio::time::timeout(self.run_timeout, self.executor.execute(&scenario, &env)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                debug!(run_id = %run_id, error = %e, "executor failed");
                return Attempt::failed(e.to_string());
            }
            Err(_) => {
                let e = ExecutorError::Timeout {
                    timeout_ms: u64::try_from(self.run_timeout.as_millis()).unwrap_or(u64::MAX),
                };
                warn!(run_id = %run_id, "{e}");
                return Attempt::failed(e.to_string());
            }
        };

        self.report(run_id, 0.8, "evaluating outcome");
        let (evaluations, judgment) = self.engine.evaluate(&plan, &outcome);
        Attempt {
            success: judgment.success,
            error: judgment.failure,
            scenario_result: Some(ScenarioResult {
                outcome,
                evaluations,
                judgment: judgment.strategy.to_string(),
            }),
        }
    }

    fn report(&self, run_id: &RunId, fraction: f64, status: &str) {
        if let Err(e) = self.tracker.update_run_progress(run_id, fraction, status) {
            debug!(run_id = %run_id, error = %e, "progress update rejected");
        }
    }

    /// Clean sandboxes of runs that never reached their own cleanup
    async fn release_abandoned(&self) {
        let abandoned: Vec<IsolationContext> = self.inflight.lock().drain().map(|(_, c)| c).collect();
        let outcomes = join_all(abandoned.iter().map(|c| c.cleanup())).await;
        for (context, outcome) in abandoned.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!(run_id = %context.run_id(), error = %e, "failed to clean up abandoned run");
            }
            if let Err(e) = self
                .tracker
                .complete_run(context.run_id(), false, 0, Some("aborted"))
            {
                debug!(run_id = %context.run_id(), error = %e, "abandoned run already settled");
            }
        }
    }
}

async fn run_task(
    shared: Arc<RunShared>,
    combination: Arc<MatrixCombination>,
    repetition: u32,
    run_id: RunId,
    permit: OwnedSemaphorePermit,
) -> RunOutcome {
    let start_time = Utc::now();
    let clock = Instant::now();
    let before = shared.monitor.snapshot().await;
    if let Err(e) = shared
        .tracker
        .start_run(&run_id, &combination.id, &combination.parameters)
    {
        warn!(run_id = %run_id, error = %e, "run state out of sync");
    }

    let attempt = shared.attempt(&run_id, &combination).await;

    let after = shared.monitor.snapshot().await;
    let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
    let token_count = attempt
        .scenario_result
        .as_ref()
        .and_then(|r| r.outcome.token_count);

    let result = MatrixRunResult {
        run_id,
        combination_id: combination.id.clone(),
        repetition: repetition + 1,
        parameters: combination.parameters.clone(),
        start_time,
        end_time: Utc::now(),
        duration_ms,
        success: attempt.success,
        scenario_result: attempt.scenario_result,
        error: attempt
            .error
            .or_else(|| (!attempt.success).then(|| "run failed".to_string())),
        metrics: run_metrics(before.as_ref(), after.as_ref(), token_count),
    };

    if let Err(e) = shared.store.save_result(&result).await {
        error!(run_id = %result.run_id, error = %e, "failed to persist run result");
    }

    match shared.tracker.complete_run(
        &result.run_id,
        result.success,
        result.duration_ms,
        result.error.as_deref(),
    ) {
        Ok(true) => {
            shared.tracker.complete_combination(&result.combination_id);
        }
        Ok(false) => {}
        Err(e) => warn!(run_id = %result.run_id, error = %e, "run state out of sync"),
    }

    RunOutcome { result, permit }
}

/// Resource usage attributed to a run; missing snapshots give zero deltas
fn run_metrics(
    before: Option<&ResourceSnapshot>,
    after: Option<&ResourceSnapshot>,
    token_count: Option<u64>,
) -> RunMetrics {
    let (memory_delta_bytes, disk_delta_bytes) = match (before, after) {
        (Some(b), Some(a)) => (
            signed_delta(a.memory_used_bytes, b.memory_used_bytes),
            signed_delta(a.disk_used_bytes, b.disk_used_bytes),
        ),
        _ => (0, 0),
    };
    RunMetrics {
        memory_delta_bytes,
        disk_delta_bytes,
        cpu_percent: after.map(|a| a.cpu_percent),
        token_count,
    }
}

fn signed_delta(after: u64, before: u64) -> i64 {
    if after >= before {
        i64::try_from(after - before).unwrap_or(i64::MAX)
    } else {
        i64::try_from(before - after).map_or(i64::MIN, |d| -d)
    }
}
