//! Evaluation engine
//!
//! Dispatches declarative evaluation entries against one execution outcome:
//! - Unknown evaluator types produce a failed result, never an error
//! - Evaluator errors and panics are converted into failed results for that
//!   entry only
//! - [`EvaluationPlan`] extracts entries and the judgment strategy from a
//!   materialized scenario document

use crate::error::EvaluationError;
use crate::evaluator::EvaluationSpec;
use crate::judgment::JudgmentStrategy;
use crate::registry::EvaluatorRegistry;
use matrix_core::{EvaluationResult, ExecutionOutcome};
use serde_json::{json, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Evaluation entries plus the strategy reducing them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationPlan {
    /// Entries in document order
    pub specs: Vec<EvaluationSpec>,
    /// Reduction rule
    pub strategy: JudgmentStrategy,
}

impl EvaluationPlan {
    /// Create plan from parts
    #[inline]
    #[must_use]
    pub fn new(specs: Vec<EvaluationSpec>, strategy: JudgmentStrategy) -> Self {
        Self { specs, strategy }
    }

    /// Read the plan declared by a scenario
    ///
    /// Collects every `run[*].evaluations[*]` followed by any top-level
    /// `evaluations[*]`; the strategy comes from `judgment.strategy`.
    ///
    /// # Errors
    /// An entry that is not a mapping with a string `type`, or an unknown
    /// strategy name.
    pub fn from_scenario(scenario: &Value) -> Result<Self, EvaluationError> {
        let mut specs = Vec::new();

        if let Some(steps) = scenario.get("run").and_then(Value::as_array) {
            for (i, step) in steps.iter().enumerate() {
                if let Some(list) = step.get("evaluations") {
                    collect_specs(list, &format!("run[{i}].evaluations"), &mut specs)?;
                }
            }
        }
        if let Some(list) = scenario.get("evaluations") {
            collect_specs(list, "evaluations", &mut specs)?;
        }

        let strategy = match scenario.get("judgment").and_then(|j| j.get("strategy")) {
            None | Some(Value::Null) => JudgmentStrategy::Default,
            Some(Value::String(name)) => {
                name.parse()
                    .map_err(|message| EvaluationError::InvalidPlan {
                        location: "judgment.strategy".to_string(),
                        message,
                    })?
            }
            Some(_) => {
                return Err(EvaluationError::InvalidPlan {
                    location: "judgment.strategy".to_string(),
                    message: "must be a string".to_string(),
                })
            }
        };

        Ok(Self { specs, strategy })
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the plan has no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn collect_specs(
    list: &Value,
    location: &str,
    out: &mut Vec<EvaluationSpec>,
) -> Result<(), EvaluationError> {
    let entries = list.as_array().ok_or_else(|| EvaluationError::InvalidPlan {
        location: location.to_string(),
        message: "must be a list".to_string(),
    })?;

    for (i, entry) in entries.iter().enumerate() {
        let spec: EvaluationSpec =
            serde_json::from_value(entry.clone()).map_err(|e| EvaluationError::InvalidPlan {
                location: format!("{location}[{i}]"),
                message: e.to_string(),
            })?;
        out.push(spec);
    }
    Ok(())
}

/// Reduced outcome of a plan
#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
    /// Final verdict
    pub success: bool,
    /// Strategy that produced it
    pub strategy: JudgmentStrategy,
    /// Why the verdict is negative
    pub failure: Option<String>,
}

/// Registry-backed dispatcher
#[derive(Debug, Clone)]
pub struct EvaluationEngine {
    registry: Arc<EvaluatorRegistry>,
}

impl Default for EvaluationEngine {
    fn default() -> Self {
        Self::new(EvaluatorRegistry::with_defaults())
    }
}

impl EvaluationEngine {
    /// Create engine over a registry
    #[inline]
    #[must_use]
    pub fn new(registry: EvaluatorRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Registry in use
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &EvaluatorRegistry {
        &self.registry
    }

    /// Run every spec against `outcome`, one result per spec
    #[must_use]
    pub fn run_evaluations(
        &self,
        specs: &[EvaluationSpec],
        outcome: &ExecutionOutcome,
    ) -> Vec<EvaluationResult> {
        specs
            .iter()
            .map(|spec| self.run_one(spec, outcome))
            .collect()
    }

    fn run_one(&self, spec: &EvaluationSpec, outcome: &ExecutionOutcome) -> EvaluationResult {
        let Some(evaluator) = self.registry.get(&spec.kind) else {
            debug!(evaluator = %spec.kind, "unknown evaluator type");
            return EvaluationResult::fail(
                spec.kind.clone(),
                format!("unknown evaluator type '{}'", spec.kind),
            );
        };

        let evaluated = panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(spec, outcome)));
        let evaluated = match evaluated {
            Ok(evaluated) => evaluated,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(evaluator = %spec.kind, panic = %message, "evaluator panicked");
                return EvaluationResult::fail(spec.kind.clone(), format!("evaluator panicked: {message}"))
                    .with_details(json!({ "panic": message }));
            }
        };

        match evaluated {
            Ok(verdict) => {
                debug!(evaluator = %spec.kind, success = verdict.success, "evaluation finished");
                EvaluationResult {
                    evaluator_type: spec.kind.clone(),
                    success: verdict.success,
                    summary: verdict.message,
                    details: verdict.details,
                }
            }
            Err(err) => {
                debug!(evaluator = %spec.kind, error = %err, "evaluator raised an error");
                EvaluationResult::fail(spec.kind.clone(), err.to_string())
                    .with_details(json!({ "error": err.to_string() }))
            }
        }
    }

    /// Run a plan and reduce it
    #[must_use]
    pub fn evaluate(
        &self,
        plan: &EvaluationPlan,
        outcome: &ExecutionOutcome,
    ) -> (Vec<EvaluationResult>, Judgment) {
        let results = self.run_evaluations(&plan.specs, outcome);
        let judgment = judge(plan.strategy, &results);
        (results, judgment)
    }
}

/// Reduce results under `strategy`, describing any failure
#[must_use]
pub fn judge(strategy: JudgmentStrategy, results: &[EvaluationResult]) -> Judgment {
    let success = strategy.judge(results);
    let failure = if success {
        None
    } else if results.is_empty() {
        Some("no evaluations configured".to_string())
    } else {
        let failed: Vec<_> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| format!("{}: {}", r.evaluator_type, r.summary))
            .collect();
        Some(format!(
            "{} of {} evaluations failed under {strategy}: {}",
            failed.len(),
            results.len(),
            failed.join("; ")
        ))
    };

    Judgment {
        success,
        strategy,
        failure,
    }
}

/// Text of a panic payload (`&str` or `String`), or a placeholder
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
