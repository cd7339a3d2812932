//! Testing utilities for the scenario matrix workspace
//!
//! Shared test helpers, fixtures, and assertions.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::Utc;
use matrix_core::{CombinationSummary, ExecutionOutcome, MatrixConfig, RunId};
use matrix_runner::{
    ExecutionObserver, ExecutorError, ProgressEvent, ProgressEventKind, ResourceAlert,
    ResourceError, ResourceProbe, ResourceSnapshot, RunEnvironment, RunnerOptions,
    ScenarioExecutor,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ============================================================================
// Executor
// ============================================================================

/// Wall-clock span of one executor call
#[derive(Debug, Clone)]
pub struct RunInterval {
    pub run_id: RunId,
    pub start: Instant,
    pub end: Instant,
}

/// What the executor saw for one call
#[derive(Debug, Clone)]
pub struct SeenRun {
    pub run_id: RunId,
    pub combination_id: String,
    pub scenario: Value,
    pub temp_dir: PathBuf,
    pub scenario_path: PathBuf,
    pub scenario_on_disk: bool,
}

/// Deterministic executor with configurable delay, failures, hangs and panics
///
/// Tracks concurrent calls so tests can assert on admission limits.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    delay: Duration,
    stdout: String,
    files: BTreeMap<String, String>,
    tokens: Option<u64>,
    fail_when: Option<(String, Value)>,
    hang_when: Option<(String, Value)>,
    panic_when: Option<(String, Value)>,
    active: AtomicUsize,
    high_water: AtomicUsize,
    intervals: Mutex<Vec<RunInterval>>,
    seen: Mutex<Vec<SeenRun>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            stdout: "hello from the agent".to_string(),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Return an error for runs whose `parameter` equals `value`
    pub fn failing_when(mut self, parameter: impl Into<String>, value: Value) -> Self {
        self.fail_when = Some((parameter.into(), value));
        self
    }

    /// Never return for runs whose `parameter` equals `value`
    pub fn hanging_when(mut self, parameter: impl Into<String>, value: Value) -> Self {
        self.hang_when = Some((parameter.into(), value));
        self
    }

    /// Panic for runs whose `parameter` equals `value`
    pub fn panicking_when(mut self, parameter: impl Into<String>, value: Value) -> Self {
        self.panic_when = Some((parameter.into(), value));
        self
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    pub fn intervals(&self) -> Vec<RunInterval> {
        self.intervals.lock().clone()
    }

    pub fn seen(&self) -> Vec<SeenRun> {
        self.seen.lock().clone()
    }

    /// Whether any two finished calls overlapped in time
    pub fn any_overlap(&self) -> bool {
        let mut spans = self.intervals();
        spans.sort_by_key(|s| s.start);
        spans.windows(2).any(|w| w[1].start < w[0].end)
    }

    fn matches(rule: Option<&(String, Value)>, env: &RunEnvironment) -> bool {
        rule.is_some_and(|(parameter, value)| env.parameters.get(parameter) == Some(value))
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScenarioExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        scenario: &Value,
        env: &RunEnvironment,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.high_water.fetch_max(now, Ordering::SeqCst);

        self.seen.lock().push(SeenRun {
            run_id: env.run_id.clone(),
            combination_id: env.combination_id.clone(),
            scenario: scenario.clone(),
            temp_dir: env.temp_dir.clone(),
            scenario_path: env.scenario_path.clone(),
            scenario_on_disk: env.scenario_path.exists(),
        });

        assert!(
            !Self::matches(self.panic_when.as_ref(), env),
            "scripted panic in {}",
            env.run_id
        );
        let start = Instant::now();
        if Self::matches(self.hang_when.as_ref(), env) {
            futures::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        tokio::fs::write(env.temp_dir.join("scratch.txt"), b"work")
            .await
            .map_err(|e| ExecutorError::failed(format!("sandbox not writable: {e}")))?;
        let end = Instant::now();
        self.intervals.lock().push(RunInterval {
            run_id: env.run_id.clone(),
            start,
            end,
        });

        if Self::matches(self.fail_when.as_ref(), env) {
            return Err(ExecutorError::failed("scripted failure"));
        }

        let mut outcome = ExecutionOutcome::with_stdout(self.stdout.clone())
            .with_duration_ms(u64::try_from(end.duration_since(start).as_millis()).unwrap_or(u64::MAX))
            .with_step(json!({ "action": "respond" }));
        for (path, content) in &self.files {
            outcome = outcome.with_file(path.clone(), content.clone());
        }
        if let Some(tokens) = self.tokens {
            outcome = outcome.with_token_count(tokens);
        }
        Ok(outcome)
    }
}

// ============================================================================
// Observer
// ============================================================================

/// Observer that keeps every callback it receives
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ProgressEvent>>,
    combinations: Mutex<Vec<CombinationSummary>>,
    alerts: Mutex<Vec<ResourceAlert>>,
    updates: AtomicUsize,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    pub fn events_of(&self, kind: ProgressEventKind) -> Vec<ProgressEvent> {
        self.events.lock().iter().filter(|e| e.kind == kind).cloned().collect()
    }

    pub fn combinations(&self) -> Vec<CombinationSummary> {
        self.combinations.lock().clone()
    }

    pub fn alerts(&self) -> Vec<ResourceAlert> {
        self.alerts.lock().clone()
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl ExecutionObserver for RecordingObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().push(event.clone());
    }

    fn on_combination_complete(&self, summary: &CombinationSummary) {
        self.combinations.lock().push(summary.clone());
    }

    fn on_resource_warning(&self, alert: &ResourceAlert) {
        self.alerts.lock().push(*alert);
    }

    fn on_resource_update(&self, _snapshot: &ResourceSnapshot) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Resource probe
// ============================================================================

/// Probe reporting constant utilization
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe {
    pub memory_percent: u64,
    pub disk_percent: u64,
    pub cpu_percent: f64,
}

impl FixedProbe {
    pub fn new(memory_percent: u64, disk_percent: u64, cpu_percent: f64) -> Self {
        Self {
            memory_percent,
            disk_percent,
            cpu_percent,
        }
    }

    /// Comfortably below every default threshold
    pub fn idle() -> Self {
        Self::new(20, 30, 5.0)
    }
}

impl ResourceProbe for FixedProbe {
    fn sample(&self) -> Result<ResourceSnapshot, ResourceError> {
        Ok(ResourceSnapshot {
            timestamp: Utc::now(),
            memory_used_bytes: self.memory_percent,
            memory_total_bytes: 100,
            disk_used_bytes: self.disk_percent,
            disk_total_bytes: 100,
            cpu_percent: self.cpu_percent,
        })
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Base scenario with a model and temperature to vary
pub fn base_scenario() -> Value {
    json!({
        "name": "greeting",
        "agent": { "model": "placeholder", "temperature": 0.0 },
        "run": [
            {
                "prompt": "say hello",
                "evaluations": [
                    { "type": "string_contains", "value": "hello" }
                ]
            }
        ]
    })
}

/// Scenario file, sandbox root and output directory in one temp dir
pub struct MatrixFixture {
    pub dir: TempDir,
    pub scenario_path: PathBuf,
}

impl MatrixFixture {
    pub fn new() -> Self {
        Self::with_scenario(&base_scenario())
    }

    pub fn with_scenario(scenario: &Value) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let scenario_path = dir.path().join("scenario.yaml");
        std::fs::write(&scenario_path, serde_yaml::to_string(scenario).unwrap()).unwrap();
        Self { dir, scenario_path }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    pub fn isolation_root(&self) -> PathBuf {
        self.dir.path().join("sandboxes")
    }

    /// Fast monitor, generous timeout, paths inside the fixture
    pub fn options(&self) -> RunnerOptions {
        RunnerOptions::new(self.output_dir())
            .with_isolation_root(self.isolation_root())
            .with_monitor_interval(Duration::from_millis(20))
            .with_run_timeout(Duration::from_secs(10))
    }

    /// 2 models × 3 temperatures
    pub fn two_by_three_config(&self, runs: u32) -> MatrixConfig {
        MatrixConfig::new("two-by-three", &self.scenario_path)
            .with_runs_per_combination(runs)
            .with_axis("agent.model", vec![json!("small"), json!("large")])
            .with_axis("agent.temperature", vec![json!(0.0), json!(0.5), json!(1.0)])
    }

    /// One axis over `agent.model`
    pub fn single_axis_config(&self, models: &[&str], runs: u32) -> MatrixConfig {
        MatrixConfig::new("single-axis", &self.scenario_path)
            .with_runs_per_combination(runs)
            .with_axis("agent.model", models.iter().map(|m| json!(m)).collect())
    }
}

impl Default for MatrixFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Entries directly under `dir`, or zero when it does not exist
pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map_or(0, |entries| entries.count())
}
