//! Scenario Matrix Core
//!
//! The data model of a matrix execution:
//! - [`ParameterPath`]: dot/bracket addressing inside scenario documents
//! - Override engine: [`apply_overrides`] builds one variant per combination
//! - [`MatrixConfig`]: axes, repetitions and the base scenario
//! - [`generate_combinations`]: cartesian product of the axes
//! - [`MatrixRunResult`] and the derived summaries
//!
//! # Example
//!
//! ```rust,ignore
//! use matrix_core::{apply_overrides, generate_combinations, MatrixConfig};
//!
//! let config = MatrixConfig::from_path("matrix.yaml")?;
//! let base = matrix_core::load_scenario(&config.base_scenario)?;
//!
//! for combo in generate_combinations(&config.matrix) {
//!     let variant = apply_overrides(&base, &combo.overrides())?;
//!     println!("{} -> {}", combo.id, variant);
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod combination;
pub mod config;
pub mod error;
pub mod outcome;
pub mod overrides;
pub mod path;
pub mod result;
pub mod summary;

// Re-exports for convenience
pub use combination::{
    combination_id, filter_combinations, generate_combinations, CombinationMetadata,
    MatrixCombination,
};
pub use config::{load_scenario, CombinationFilter, MatrixAxis, MatrixConfig};
pub use error::{ConfigError, InvalidParameterPath, OverrideError};
pub use outcome::ExecutionOutcome;
pub use overrides::{
    apply_overrides, combination_to_overrides, get_value_at_path, set_value_at_path,
    validate_matrix_parameter_paths, validate_path, value_kind, ParameterOverride,
};
pub use path::{parse_path, ParameterPath, PathError, PathSegment};
pub use result::{
    EvaluationResult, MatrixRunResult, RunDigest, RunId, RunMetrics, ScenarioResult,
};
pub use summary::{
    CombinationSummary, MatrixExecutionSummary, ResourceStat, ResourceStatistics,
    ResourceUsageSummary,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
