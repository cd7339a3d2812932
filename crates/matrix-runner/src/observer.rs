//! Host integration callbacks
//!
//! A host CLI or UI implements [`ExecutionObserver`]; every method defaults
//! to a no-op. [`TracingObserver`] forwards everything to `tracing`.

use crate::progress::{ProgressEvent, ProgressEventKind};
use crate::resources::{AlertSeverity, ResourceAlert, ResourceSnapshot};
use matrix_core::CombinationSummary;
use tracing::{debug, info, warn};

/// Receives progress and resource notifications
///
/// Callbacks run on the orchestrator's tasks and must not block.
pub trait ExecutionObserver: Send + Sync {
    /// Run or matrix progress
    fn on_progress(&self, _event: &ProgressEvent) {}

    /// All repetitions of a combination settled
    fn on_combination_complete(&self, _summary: &CombinationSummary) {}

    /// A resource crossed a threshold on this tick
    fn on_resource_warning(&self, _alert: &ResourceAlert) {}

    /// Fresh resource sample
    fn on_resource_update(&self, _snapshot: &ResourceSnapshot) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}

/// Observer that emits structured `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        let run_id = event.run_id.as_ref().map(ToString::to_string);
        match event.kind {
            ProgressEventKind::RunProgress => debug!(
                run_id = run_id.as_deref(),
                fraction = event.fraction,
                "{}",
                event.message
            ),
            _ => info!(
                kind = ?event.kind,
                run_id = run_id.as_deref(),
                combination_id = event.combination_id.as_deref(),
                completed = event.completed_runs,
                total = event.total_runs,
                eta_ms = event.eta_ms,
                "{}",
                event.message
            ),
        }
    }

    fn on_combination_complete(&self, summary: &CombinationSummary) {
        info!(
            combination_id = %summary.combination_id,
            successful = summary.successful_runs,
            failed = summary.failed_runs,
            success_rate = summary.success_rate,
            "combination complete"
        );
    }

    fn on_resource_warning(&self, alert: &ResourceAlert) {
        match alert.severity {
            AlertSeverity::Warning => warn!(
                resource = %alert.kind,
                value = alert.value_percent,
                threshold = alert.threshold_percent,
                "resource usage above warning threshold"
            ),
            AlertSeverity::Critical => warn!(
                resource = %alert.kind,
                value = alert.value_percent,
                threshold = alert.threshold_percent,
                "resource usage above critical threshold"
            ),
        }
    }

    fn on_resource_update(&self, snapshot: &ResourceSnapshot) {
        debug!(
            memory = snapshot.memory_percent(),
            disk = snapshot.disk_percent(),
            cpu = snapshot.cpu_percent,
            "resource sample"
        );
    }
}
