//! Human-readable execution log

use matrix_core::{MatrixExecutionSummary, MatrixRunResult};
use std::fmt::Write;

/// Render the `logs/matrix-execution.log` text
#[must_use]
pub fn render_execution_log(summary: &MatrixExecutionSummary, results: &[MatrixRunResult]) -> String {
    let mut out = String::new();
    let status = if summary.aborted { "ABORTED" } else { "COMPLETED" };

    // Writing to a String cannot fail.
    let _ = writeln!(out, "Matrix execution: {} [{status}]", summary.matrix_name);
    let _ = writeln!(out, "Started:  {}", summary.started_at.to_rfc3339());
    let _ = writeln!(out, "Finished: {}", summary.finished_at.to_rfc3339());
    let _ = writeln!(out, "Duration: {}ms", summary.total_duration_ms);
    let _ = writeln!(
        out,
        "Runs: {}/{} executed, {} successful, {} failed ({:.1}% success)",
        summary.total_runs,
        summary.planned_runs,
        summary.successful_runs,
        summary.failed_runs,
        summary.success_rate * 100.0
    );
    let _ = writeln!(
        out,
        "Resources: memory peak {:.1}% avg {:.1}%, disk peak {:.1}% avg {:.1}%, cpu peak {:.1}% avg {:.1}%",
        summary.resources.peak_memory_percent,
        summary.resources.average_memory_percent,
        summary.resources.peak_disk_percent,
        summary.resources.average_disk_percent,
        summary.resources.peak_cpu_percent,
        summary.resources.average_cpu_percent
    );

    let _ = writeln!(out, "\nCombinations:");
    for combo in &summary.combinations {
        let params = combo
            .parameters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            out,
            "  {} ({params}): {}/{} successful, avg {:.0}ms",
            combo.combination_id, combo.successful_runs, combo.total_runs, combo.average_duration_ms
        );
    }

    let failures: Vec<_> = results.iter().filter(|r| !r.success).collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "\nFailures:");
        for run in failures {
            let _ = writeln!(
                out,
                "  {} ({}): {}",
                run.run_id,
                run.combination_id,
                run.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use matrix_core::{generate_combinations, MatrixAxis, ResourceStatistics, RunId, RunMetrics};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn log_lists_combinations_and_failures() {
        let combos = generate_combinations(&[MatrixAxis::new("model", vec![json!("a")])]);
        let now = Utc::now();
        let failed = MatrixRunResult {
            run_id: RunId::from_string("combo-0-r1-x"),
            combination_id: "combo-0".into(),
            repetition: 1,
            parameters: BTreeMap::from([("model".to_string(), json!("a"))]),
            start_time: now,
            end_time: now,
            duration_ms: 12,
            success: false,
            scenario_result: None,
            error: Some("Run timed out after 10ms".into()),
            metrics: RunMetrics::default(),
        };
        let results = vec![failed];
        let summary = MatrixExecutionSummary::from_results(
            "demo",
            &combos,
            1,
            &results,
            ResourceStatistics::default(),
            now,
            now,
            true,
        );

        let log = render_execution_log(&summary, &results);
        assert!(log.starts_with("Matrix execution: demo [ABORTED]"));
        assert!(log.contains("combo-0 (model=\"a\"): 0/1 successful"));
        assert!(log.contains("combo-0-r1-x (combo-0): Run timed out after 10ms"));
    }
}
