//! Scenario Matrix Evaluation
//!
//! Grades one execution outcome against the checks a scenario declares.
//!
//! # Core Concepts
//!
//! - [`Evaluator`]: pure grading function of `(spec, outcome)`
//! - [`EvaluatorRegistry`]: type string to evaluator, built from [`BUILTIN_EVALUATORS`]
//! - [`EvaluationEngine`]: dispatches specs, never propagates evaluator errors
//! - [`JudgmentStrategy`]: reduces results to one verdict
//! - [`EvaluationPlan`]: evaluations and strategy read from a scenario
//!
//! # Example
//!
//! ```rust,ignore
//! use matrix_eval::{EvaluationEngine, EvaluationPlan};
//!
//! let engine = EvaluationEngine::default();
//! let plan = EvaluationPlan::from_scenario(&scenario)?;
//! let (results, judgment) = engine.evaluate(&plan, &outcome);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod builtin;
mod engine;
mod error;
mod evaluator;
mod judgment;
mod registry;

// Re-exports
pub use builtin::{
    ExecutionTimeEvaluator, FileExistsEvaluator, RegexMatchEvaluator, StringContainsEvaluator,
    TrajectoryActionEvaluator,
};
pub use engine::{judge, panic_message, EvaluationEngine, EvaluationPlan, Judgment};
pub use error::EvaluationError;
pub use evaluator::{EvaluationSpec, Evaluator, Verdict};
pub use judgment::JudgmentStrategy;
pub use registry::{EvaluatorFactory, EvaluatorRegistry, BUILTIN_EVALUATORS};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
