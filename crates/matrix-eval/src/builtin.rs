//! Built-in evaluators

use crate::error::EvaluationError;
use crate::evaluator::{EvaluationSpec, Evaluator, Verdict};
use matrix_core::ExecutionOutcome;
use regex::RegexBuilder;
use serde_json::json;

/// `string_contains`: stdout contains `value`
///
/// Case-sensitive unless `case_sensitive: false`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringContainsEvaluator;

impl Evaluator for StringContainsEvaluator {
    fn name(&self) -> &'static str {
        "string_contains"
    }

    fn evaluate(
        &self,
        spec: &EvaluationSpec,
        outcome: &ExecutionOutcome,
    ) -> Result<Verdict, EvaluationError> {
        let needle = spec.require_str("value")?;
        let case_sensitive = spec.optional_bool("case_sensitive")?.unwrap_or(true);

        let found = if case_sensitive {
            outcome.stdout.contains(needle)
        } else {
            outcome
                .stdout
                .to_lowercase()
                .contains(&needle.to_lowercase())
        };

        Ok(Verdict::from_condition(
            found,
            format!("output contains '{needle}'"),
            format!("output does not contain '{needle}'"),
        )
        .with_details(json!({ "value": needle, "case_sensitive": case_sensitive })))
    }
}

/// `regex_match`: case-insensitive `pattern` matches stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexMatchEvaluator;

impl Evaluator for RegexMatchEvaluator {
    fn name(&self) -> &'static str {
        "regex_match"
    }

    fn evaluate(
        &self,
        spec: &EvaluationSpec,
        outcome: &ExecutionOutcome,
    ) -> Result<Verdict, EvaluationError> {
        let pattern = spec.require_str("pattern")?;
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| EvaluationError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;

        let matched = regex.find(&outcome.stdout).map(|m| m.as_str().to_string());
        Ok(Verdict::from_condition(
            matched.is_some(),
            format!("output matches /{pattern}/i"),
            format!("output does not match /{pattern}/i"),
        )
        .with_details(json!({ "pattern": pattern, "matched": matched })))
    }
}

/// `file_exists`: `path` is among the produced files
#[derive(Debug, Default, Clone, Copy)]
pub struct FileExistsEvaluator;

fn normalize(path: &str) -> &str {
    let mut p = path;
    while let Some(rest) = p.strip_prefix("./") {
        p = rest;
    }
    p
}

impl Evaluator for FileExistsEvaluator {
    fn name(&self) -> &'static str {
        "file_exists"
    }

    fn evaluate(
        &self,
        spec: &EvaluationSpec,
        outcome: &ExecutionOutcome,
    ) -> Result<Verdict, EvaluationError> {
        let path = spec.require_str("path")?;
        let wanted = normalize(path);
        let exists = outcome.files.keys().any(|k| normalize(k) == wanted);

        Ok(Verdict::from_condition(
            exists,
            format!("file '{wanted}' exists"),
            format!("file '{wanted}' was not produced"),
        ))
    }
}

/// `trajectory_contains_action`: some trajectory step ran `action`
///
/// A step matches when its `action` field (or `action.name`) equals the
/// requested name.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrajectoryActionEvaluator;

impl Evaluator for TrajectoryActionEvaluator {
    fn name(&self) -> &'static str {
        "trajectory_contains_action"
    }

    fn evaluate(
        &self,
        spec: &EvaluationSpec,
        outcome: &ExecutionOutcome,
    ) -> Result<Verdict, EvaluationError> {
        let action = spec.require_str("action")?;
        let position = outcome.trajectory.iter().position(|step| {
            let named = step.get("action");
            named.and_then(|a| a.as_str()) == Some(action)
                || named.and_then(|a| a.get("name")).and_then(|n| n.as_str()) == Some(action)
        });

        Ok(Verdict::from_condition(
            position.is_some(),
            format!("action '{action}' was executed"),
            format!(
                "action '{action}' not found in {} trajectory steps",
                outcome.trajectory.len()
            ),
        )
        .with_details(json!({ "action": action, "step": position })))
    }
}

/// `execution_time`: duration within optional `min_ms` / `max_ms` bounds
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutionTimeEvaluator;

impl Evaluator for ExecutionTimeEvaluator {
    fn name(&self) -> &'static str {
        "execution_time"
    }

    fn evaluate(
        &self,
        spec: &EvaluationSpec,
        outcome: &ExecutionOutcome,
    ) -> Result<Verdict, EvaluationError> {
        let min = spec.optional_u64("min_ms")?;
        let max = spec.optional_u64("max_ms")?;
        if min.is_none() && max.is_none() {
            return Err(EvaluationError::MissingField {
                kind: spec.kind.clone(),
                field: "max_ms".to_string(),
            });
        }

        let took = outcome.duration_ms;
        let within = min.map_or(true, |m| took >= m) && max.map_or(true, |m| took <= m);

        Ok(Verdict::from_condition(
            within,
            format!("completed in {took}ms"),
            format!("took {took}ms, outside bounds [{min:?}, {max:?}]"),
        )
        .with_details(json!({ "duration_ms": took, "min_ms": min, "max_ms": max })))
    }
}
