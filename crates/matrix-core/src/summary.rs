//! Derived summaries
//!
//! Both summaries are pure functions of persisted run results (plus resource
//! statistics), so they can be recomputed at any time, including from the
//! `runs/` directory after a crash.

use crate::combination::MatrixCombination;
use crate::result::{MatrixRunResult, RunDigest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Min/max/average of one sampled resource (percent)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStat {
    pub min: f64,
    pub max: f64,
    pub average: f64,
}

/// Statistics accumulated by the resource monitor over a whole execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatistics {
    pub memory: ResourceStat,
    pub disk: ResourceStat,
    pub cpu: ResourceStat,
    /// Number of samples the figures are computed from
    pub samples: u64,
}

/// Aggregate of all runs sharing a combination id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationSummary {
    pub combination_id: String,
    pub parameters: BTreeMap<String, Value>,
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    /// Successful / total, 0.0 when there are no runs
    pub success_rate: f64,
    /// Mean run duration in milliseconds
    pub average_duration_ms: f64,
    pub runs: Vec<RunDigest>,
}

impl CombinationSummary {
    /// Compute from run digests
    #[must_use]
    pub fn from_digests(
        combination_id: impl Into<String>,
        parameters: BTreeMap<String, Value>,
        runs: Vec<RunDigest>,
    ) -> Self {
        let total_runs = runs.len();
        let successful_runs = runs.iter().filter(|r| r.success).count();
        let total_duration: u64 = runs.iter().map(|r| r.duration_ms).sum();

        Self {
            combination_id: combination_id.into(),
            parameters,
            total_runs,
            successful_runs,
            failed_runs: total_runs - successful_runs,
            success_rate: ratio(successful_runs, total_runs),
            average_duration_ms: if total_runs == 0 {
                0.0
            } else {
                total_duration as f64 / total_runs as f64
            },
            runs,
        }
    }

    /// Compute from the results of one combination
    #[must_use]
    pub fn from_results<'a, I>(combination_id: &str, results: I) -> Self
    where
        I: IntoIterator<Item = &'a MatrixRunResult>,
    {
        let mut parameters = BTreeMap::new();
        let runs = results
            .into_iter()
            .filter(|r| r.combination_id == combination_id)
            .map(|r| {
                if parameters.is_empty() {
                    parameters = r.parameters.clone();
                }
                r.digest()
            })
            .collect();
        Self::from_digests(combination_id, parameters, runs)
    }
}

/// Peak and average resource usage for the whole execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsageSummary {
    pub peak_memory_percent: f64,
    pub average_memory_percent: f64,
    pub peak_disk_percent: f64,
    pub average_disk_percent: f64,
    pub peak_cpu_percent: f64,
    pub average_cpu_percent: f64,
}

impl From<ResourceStatistics> for ResourceUsageSummary {
    fn from(stats: ResourceStatistics) -> Self {
        Self {
            peak_memory_percent: stats.memory.max,
            average_memory_percent: stats.memory.average,
            peak_disk_percent: stats.disk.max,
            average_disk_percent: stats.disk.average,
            peak_cpu_percent: stats.cpu.max,
            average_cpu_percent: stats.cpu.average,
        }
    }
}

/// Final report of a matrix execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixExecutionSummary {
    pub matrix_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_duration_ms: u64,
    pub total_combinations: usize,
    /// Runs scheduled by the configuration (combinations × repetitions)
    pub planned_runs: usize,
    /// Runs that produced a result
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub success_rate: f64,
    /// True when the schedule stopped early on a failure
    pub aborted: bool,
    pub combinations: Vec<CombinationSummary>,
    pub resources: ResourceUsageSummary,
}

impl MatrixExecutionSummary {
    /// Aggregate results for the given combinations
    ///
    /// Combination summaries follow the order of `combinations`.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_results(
        matrix_name: impl Into<String>,
        combinations: &[MatrixCombination],
        runs_per_combination: u32,
        results: &[MatrixRunResult],
        resources: ResourceStatistics,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        aborted: bool,
    ) -> Self {
        let combination_summaries: Vec<_> = combinations
            .iter()
            .map(|combo| {
                let mut summary = CombinationSummary::from_results(&combo.id, results);
                if summary.parameters.is_empty() {
                    summary.parameters = combo.parameters.clone();
                }
                summary
            })
            .collect();

        let total_runs = results.len();
        let successful_runs = results.iter().filter(|r| r.success).count();
        let total_duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        Self {
            matrix_name: matrix_name.into(),
            started_at,
            finished_at,
            total_duration_ms,
            total_combinations: combinations.len(),
            planned_runs: combinations.len() * runs_per_combination as usize,
            total_runs,
            successful_runs,
            failed_runs: total_runs - successful_runs,
            success_rate: ratio(successful_runs, total_runs),
            aborted,
            combinations: combination_summaries,
            resources: resources.into(),
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
