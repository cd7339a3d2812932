//! Scenario Matrix Runner
//!
//! Executes every parameterized variant of a base scenario a fixed number
//! of times under isolation, bounded concurrency and resource monitoring,
//! persisting each result as soon as it settles.
//!
//! # Components
//!
//! - [`MatrixOrchestrator`]: admission, timeout, failure policy, summary
//! - [`IsolationManager`]: per-run filesystem sandboxes
//! - [`ResourceMonitor`]: background sampling with threshold alerts
//! - [`ProgressTracker`]: run state machine and progress events
//! - [`ResultStore`]: atomic persistence of results and summaries
//! - [`ScenarioExecutor`]: contract for the external executor
//!
//! # Example
//!
//! ```rust,ignore
//! use matrix_runner::{MatrixOrchestrator, RunnerOptions};
//!
//! let config = matrix_core::MatrixConfig::from_path("matrix.yaml")?;
//! let options = RunnerOptions::new("results").with_max_parallel(4);
//! let summary = MatrixOrchestrator::new(config, options, executor).execute().await?;
//! println!("{}/{} runs passed", summary.successful_runs, summary.total_runs);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod error;
mod executor;
mod isolation;
mod mocks;
mod observer;
mod options;
mod orchestrator;
mod progress;
mod report;
mod resources;
mod store;
pub mod telemetry;

// Re-exports
pub use error::{
    ExecutorError, IsolationError, MatrixError, MockError, ProgressError, ResourceError,
    StoreError,
};
pub use executor::{RunEnvironment, ScenarioExecutor};
pub use isolation::{IsolationContext, IsolationManager};
pub use mocks::{ArgMatcher, ArgPredicate, MockRule, MockTable};
pub use observer::{ExecutionObserver, NoopObserver, TracingObserver};
pub use options::RunnerOptions;
pub use orchestrator::{ExecutionPlan, MatrixOrchestrator};
pub use progress::{
    allowed_transitions, validate_transition, ProgressEvent, ProgressEventKind, ProgressTracker,
    RunState,
};
pub use report::render_execution_log;
pub use resources::{
    AlertSeverity, ResourceAlert, ResourceKind, ResourceMonitor, ResourceProbe, ResourceSnapshot,
    ResourceThresholds, SystemProbe,
};
pub use store::ResultStore;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
