//! Progress tracking
//!
//! Per-run state machine `queued -> running -> {completed | failed}` plus
//! per-combination bookkeeping. Every transition emits a [`ProgressEvent`]
//! to the observer; a rolling average of run durations feeds the ETA.

use crate::error::ProgressError;
use crate::observer::ExecutionObserver;
use matrix_core::{CombinationSummary, MatrixCombination, RunDigest, RunId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// Completed runs considered by the ETA average
const ROLLING_WINDOW: usize = 20;

/// Lifecycle state of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl RunState {
    /// Whether no further transition is allowed
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: RunState) -> &'static [RunState] {
    use RunState::{Completed, Failed, Queued, Running};
    match from {
        // A run that never starts (setup crash) may fail straight from the queue.
        Queued => &[Running, Failed],
        Running => &[Completed, Failed],
        Completed | Failed => &[],
    }
}

/// Check a transition
///
/// # Errors
/// [`ProgressError::IllegalTransition`] if `to` is not reachable from `from`.
pub fn validate_transition(run_id: &RunId, from: RunState, to: RunState) -> Result<(), ProgressError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(ProgressError::IllegalTransition {
            run_id: run_id.clone(),
            from,
            to,
        })
    }
}

/// Event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    MatrixStarted,
    RunQueued,
    RunStarted,
    RunProgress,
    RunCompleted,
    RunFailed,
    CombinationCompleted,
    MatrixCompleted,
}

/// One progress notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: ProgressEventKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combination_id: Option<String>,
    /// Run progress in `[0, 1]` for `RunProgress` events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraction: Option<f64>,
    pub completed_runs: usize,
    pub total_runs: usize,
    /// Projected time to finish the remaining runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

#[derive(Debug)]
struct RunRecord {
    combination_id: String,
    state: RunState,
}

#[derive(Debug, Default)]
struct CombinationRecord {
    parameters: BTreeMap<String, Value>,
    expected_runs: usize,
    runs: Vec<RunDigest>,
    completed: bool,
}

#[derive(Debug, Default)]
struct TrackerState {
    runs: HashMap<RunId, RunRecord>,
    combinations: HashMap<String, CombinationRecord>,
    settled: usize,
    recent_durations: VecDeque<u64>,
}

impl TrackerState {
    fn transition(&mut self, run_id: &RunId, to: RunState) -> Result<String, ProgressError> {
        let record = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| ProgressError::UnknownRun(run_id.clone()))?;
        validate_transition(run_id, record.state, to)?;
        record.state = to;
        Ok(record.combination_id.clone())
    }
}

/// Tracks run states and emits progress events
pub struct ProgressTracker {
    total_runs: usize,
    parallelism: usize,
    observer: Arc<dyn ExecutionObserver>,
    state: Mutex<TrackerState>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("total_runs", &self.total_runs)
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    /// Create tracker for `total_runs` runs executed `parallelism` at a time
    #[must_use]
    pub fn new(total_runs: usize, parallelism: usize, observer: Arc<dyn ExecutionObserver>) -> Self {
        Self {
            total_runs,
            parallelism: parallelism.max(1),
            observer,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Declare a combination and its repetition count
    pub fn register_combination(&self, combination: &MatrixCombination, runs: usize) {
        self.state.lock().combinations.insert(
            combination.id.clone(),
            CombinationRecord {
                parameters: combination.parameters.clone(),
                expected_runs: runs,
                ..CombinationRecord::default()
            },
        );
    }

    /// Emit a matrix-level event
    pub fn announce(&self, kind: ProgressEventKind, message: impl Into<String>, data: Value) {
        let event = {
            let state = self.state.lock();
            self.event(&state, kind, message.into(), None, None)
        }
        .with_data(data);
        self.observer.on_progress(&event);
    }

    /// Record a run as queued
    pub fn queue_run(&self, run_id: &RunId, combination_id: &str) {
        let event = {
            let mut state = self.state.lock();
            state.runs.insert(
                run_id.clone(),
                RunRecord {
                    combination_id: combination_id.to_string(),
                    state: RunState::Queued,
                },
            );
            self.event(
                &state,
                ProgressEventKind::RunQueued,
                format!("queued run {run_id}"),
                Some(run_id),
                Some(combination_id),
            )
        };
        self.observer.on_progress(&event);
    }

    /// Transition a run to `running`
    ///
    /// Runs not queued beforehand are queued implicitly.
    ///
    /// # Errors
    /// Run already started or settled.
    pub fn start_run(
        &self,
        run_id: &RunId,
        combination_id: &str,
        parameters: &BTreeMap<String, Value>,
    ) -> Result<(), ProgressError> {
        let event = {
            let mut state = self.state.lock();
            state.runs.entry(run_id.clone()).or_insert_with(|| RunRecord {
                combination_id: combination_id.to_string(),
                state: RunState::Queued,
            });
            state.transition(run_id, RunState::Running)?;
            self.event(
                &state,
                ProgressEventKind::RunStarted,
                format!("started run {run_id}"),
                Some(run_id),
                Some(combination_id),
            )
            .with_data(json!({ "parameters": parameters }))
        };
        self.observer.on_progress(&event);
        Ok(())
    }

    /// Report intermediate progress without changing state
    ///
    /// # Errors
    /// Run is not currently running.
    pub fn update_run_progress(
        &self,
        run_id: &RunId,
        fraction: f64,
        status: &str,
    ) -> Result<(), ProgressError> {
        let event = {
            let state = self.state.lock();
            let record = state
                .runs
                .get(run_id)
                .ok_or_else(|| ProgressError::UnknownRun(run_id.clone()))?;
            if record.state != RunState::Running {
                return Err(ProgressError::IllegalTransition {
                    run_id: run_id.clone(),
                    from: record.state,
                    to: RunState::Running,
                });
            }
            let mut event = self.event(
                &state,
                ProgressEventKind::RunProgress,
                status.to_string(),
                Some(run_id),
                Some(&record.combination_id),
            );
            event.fraction = Some(fraction.clamp(0.0, 1.0));
            event
        };
        self.observer.on_progress(&event);
        Ok(())
    }

    /// Settle a run
    ///
    /// Returns `true` when this was the last outstanding repetition of its
    /// combination; the caller should then call
    /// [`ProgressTracker::complete_combination`].
    ///
    /// # Errors
    /// Unknown run or run already settled.
    pub fn complete_run(
        &self,
        run_id: &RunId,
        success: bool,
        duration_ms: u64,
        error: Option<&str>,
    ) -> Result<bool, ProgressError> {
        let (event, settled) = {
            let mut state = self.state.lock();
            let to = if success {
                RunState::Completed
            } else {
                RunState::Failed
            };
            let combination_id = state.transition(run_id, to)?;

            state.settled += 1;
            state.recent_durations.push_back(duration_ms);
            if state.recent_durations.len() > ROLLING_WINDOW {
                state.recent_durations.pop_front();
            }

            let settled = match state.combinations.get_mut(&combination_id) {
                Some(combo) => {
                    combo.runs.push(RunDigest {
                        run_id: run_id.clone(),
                        success,
                        duration_ms,
                        error: error.map(str::to_string),
                    });
                    !combo.completed && combo.runs.len() >= combo.expected_runs
                }
                None => false,
            };

            let (kind, message) = if success {
                (ProgressEventKind::RunCompleted, format!("run {run_id} completed in {duration_ms}ms"))
            } else {
                (
                    ProgressEventKind::RunFailed,
                    format!("run {run_id} failed: {}", error.unwrap_or("unknown error")),
                )
            };
            let event = self
                .event(&state, kind, message, Some(run_id), Some(&combination_id))
                .with_data(json!({ "success": success, "duration_ms": duration_ms, "error": error }));
            (event, settled)
        };
        self.observer.on_progress(&event);
        Ok(settled)
    }

    /// Summarize a combination from every run settled so far
    ///
    /// Invokes the combination-complete callback. Returns `None` for an
    /// unknown combination.
    pub fn complete_combination(&self, combination_id: &str) -> Option<CombinationSummary> {
        let (summary, event) = {
            let mut state = self.state.lock();
            let combo = state.combinations.get_mut(combination_id)?;
            combo.completed = true;
            let summary = CombinationSummary::from_digests(
                combination_id,
                combo.parameters.clone(),
                combo.runs.clone(),
            );
            let event = self
                .event(
                    &state,
                    ProgressEventKind::CombinationCompleted,
                    format!(
                        "combination {combination_id} complete: {}/{} successful",
                        summary.successful_runs, summary.total_runs
                    ),
                    None,
                    Some(combination_id),
                )
                .with_data(json!({ "success_rate": summary.success_rate }));
            (summary, event)
        };
        self.observer.on_progress(&event);
        self.observer.on_combination_complete(&summary);
        Some(summary)
    }

    /// Current state of a run
    #[must_use]
    pub fn run_state(&self, run_id: &RunId) -> Option<RunState> {
        self.state.lock().runs.get(run_id).map(|r| r.state)
    }

    /// Runs settled so far
    #[must_use]
    pub fn settled_runs(&self) -> usize {
        self.state.lock().settled
    }

    /// Projected time for the remaining runs
    #[must_use]
    pub fn estimated_remaining_ms(&self) -> Option<u64> {
        let state = self.state.lock();
        self.eta(&state)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn eta(&self, state: &TrackerState) -> Option<u64> {
        if state.recent_durations.is_empty() {
            return None;
        }
        let average = state.recent_durations.iter().sum::<u64>() as f64
            / state.recent_durations.len() as f64;
        let remaining = self.total_runs.saturating_sub(state.settled) as f64;
        Some((average * remaining / self.parallelism as f64).round() as u64)
    }

    fn event(
        &self,
        state: &TrackerState,
        kind: ProgressEventKind,
        message: String,
        run_id: Option<&RunId>,
        combination_id: Option<&str>,
    ) -> ProgressEvent {
        ProgressEvent {
            kind,
            message,
            run_id: run_id.cloned(),
            combination_id: combination_id.map(str::to_string),
            fraction: None,
            completed_runs: state.settled,
            total_runs: self.total_runs,
            eta_ms: self.eta(state),
            data: Value::Null,
        }
    }
}

impl ProgressEvent {
    fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_core::{generate_combinations, MatrixAxis};
    use parking_lot::Mutex as PlMutex;

    #[derive(Default)]
    struct Recorder {
        events: PlMutex<Vec<ProgressEvent>>,
        summaries: PlMutex<Vec<CombinationSummary>>,
    }

    impl ExecutionObserver for Recorder {
        fn on_progress(&self, event: &ProgressEvent) {
            self.events.lock().push(event.clone());
        }

        fn on_combination_complete(&self, summary: &CombinationSummary) {
            self.summaries.lock().push(summary.clone());
        }
    }

    fn tracker(total: usize) -> (ProgressTracker, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (ProgressTracker::new(total, 1, recorder.clone()), recorder)
    }

    #[test]
    fn transition_table() {
        let id = RunId::from_string("r");
        assert!(validate_transition(&id, RunState::Queued, RunState::Running).is_ok());
        assert!(validate_transition(&id, RunState::Running, RunState::Failed).is_ok());
        assert!(validate_transition(&id, RunState::Completed, RunState::Running).is_err());
        assert!(validate_transition(&id, RunState::Queued, RunState::Completed).is_err());
        assert!(allowed_transitions(RunState::Failed).is_empty());
    }

    #[test]
    fn run_lifecycle_emits_events() {
        let (tracker, recorder) = tracker(1);
        let id = RunId::from_string("combo-0-r1-x");
        tracker.queue_run(&id, "combo-0");
        tracker.start_run(&id, "combo-0", &BTreeMap::new()).unwrap();
        tracker.update_run_progress(&id, 1.7, "halfway").unwrap();
        tracker.complete_run(&id, true, 40, None).unwrap();

        let kinds: Vec<_> = recorder.events.lock().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ProgressEventKind::RunQueued,
                ProgressEventKind::RunStarted,
                ProgressEventKind::RunProgress,
                ProgressEventKind::RunCompleted,
            ]
        );
        assert_eq!(recorder.events.lock()[2].fraction, Some(1.0));
        assert_eq!(tracker.run_state(&id), Some(RunState::Completed));
    }

    #[test]
    fn settled_runs_cannot_be_completed_twice() {
        let (tracker, _) = tracker(1);
        let id = RunId::from_string("r");
        tracker.start_run(&id, "combo-0", &BTreeMap::new()).unwrap();
        tracker.complete_run(&id, false, 1, Some("boom")).unwrap();
        assert!(tracker.complete_run(&id, true, 1, None).is_err());
        assert!(tracker.update_run_progress(&id, 0.5, "late").is_err());
        assert!(matches!(
            tracker.complete_run(&RunId::from_string("ghost"), true, 1, None),
            Err(ProgressError::UnknownRun(_))
        ));
    }

    #[test]
    fn combination_settles_after_last_repetition() {
        let combos = generate_combinations(&[MatrixAxis::new("a", vec![1.into()])]);
        let (tracker, recorder) = tracker(2);
        tracker.register_combination(&combos[0], 2);

        let first = RunId::from_string("combo-0-r1");
        let second = RunId::from_string("combo-0-r2");
        for id in [&first, &second] {
            tracker.start_run(id, "combo-0", &combos[0].parameters).unwrap();
        }
        assert!(!tracker.complete_run(&first, true, 100, None).unwrap());
        assert!(tracker.complete_run(&second, false, 300, Some("bad")).unwrap());

        let summary = tracker.complete_combination("combo-0").unwrap();
        assert_eq!(summary.total_runs, 2);
        assert_eq!(summary.failed_runs, 1);
        assert!((summary.average_duration_ms - 200.0).abs() < f64::EPSILON);
        assert_eq!(recorder.summaries.lock().len(), 1);
        assert!(tracker.complete_combination("combo-9").is_none());
    }

    #[test]
    fn eta_uses_rolling_average() {
        let recorder = Arc::new(Recorder::default());
        let tracker = ProgressTracker::new(5, 2, recorder);
        assert_eq!(tracker.estimated_remaining_ms(), None);

        for (i, ms) in [100, 300].into_iter().enumerate() {
            let id = RunId::from_string(format!("r{i}"));
            tracker.start_run(&id, "c", &BTreeMap::new()).unwrap();
            tracker.complete_run(&id, true, ms, None).unwrap();
        }
        // average 200ms, 3 remaining, 2 at a time
        assert_eq!(tracker.estimated_remaining_ms(), Some(300));
    }
}
