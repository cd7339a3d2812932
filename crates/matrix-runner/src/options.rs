//! Runner options

use crate::resources::ResourceThresholds;
use matrix_core::{CombinationFilter, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How a matrix is executed
///
/// Durations serialize as milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerOptions {
    /// Where results are written
    pub output_dir: PathBuf,
    /// Where per-run sandboxes are created
    pub isolation_root: PathBuf,
    /// Runs in flight at once
    pub max_parallel: usize,
    /// Per-run executor timeout
    #[serde(with = "millis")]
    pub run_timeout: Duration,
    /// Keep scheduling after a failed run
    pub continue_on_failure: bool,
    /// Resource sampling period
    #[serde(with = "millis")]
    pub monitor_interval: Duration,
    /// Resource alert thresholds
    pub thresholds: ResourceThresholds,
    /// Only run combinations matching every entry
    pub filter: Vec<CombinationFilter>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("matrix-results"),
            isolation_root: std::env::temp_dir().join("scenario-matrix"),
            max_parallel: 1,
            run_timeout: Duration::from_secs(300),
            continue_on_failure: true,
            monitor_interval: Duration::from_secs(5),
            thresholds: ResourceThresholds::default(),
            filter: Vec::new(),
        }
    }
}

impl RunnerOptions {
    /// Options writing to `output_dir`
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// With sandbox root
    #[inline]
    #[must_use]
    pub fn with_isolation_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.isolation_root = root.into();
        self
    }

    /// With concurrency limit
    #[inline]
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// With per-run timeout
    #[inline]
    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// With failure policy
    #[inline]
    #[must_use]
    pub fn with_continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.continue_on_failure = continue_on_failure;
        self
    }

    /// With sampling period
    #[inline]
    #[must_use]
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// With alert thresholds
    #[inline]
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: ResourceThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Add a combination filter entry
    #[inline]
    #[must_use]
    pub fn with_filter(mut self, filter: CombinationFilter) -> Self {
        self.filter.push(filter);
        self
    }

    /// Check option values
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] listing every problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.max_parallel == 0 {
            problems.push("max_parallel must be at least 1".to_string());
        }
        if self.run_timeout.is_zero() {
            problems.push("run_timeout must be greater than zero".to_string());
        }
        if self.monitor_interval.is_zero() {
            problems.push("monitor_interval must be greater than zero".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let options = RunnerOptions::default();
        assert_eq!(options.max_parallel, 1);
        assert_eq!(options.run_timeout, Duration::from_secs(300));
        assert!(options.continue_on_failure);
        assert!(options.isolation_root.ends_with("scenario-matrix"));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let err = RunnerOptions::default().with_max_parallel(0).validate().unwrap_err();
        assert!(err.to_string().contains("max_parallel"));
    }

    #[test]
    fn deserializes_partial_yaml_with_millisecond_durations() {
        let options: RunnerOptions =
            serde_yaml::from_str("output_dir: out\nmax_parallel: 4\nrun_timeout: 1500\n").unwrap();
        assert_eq!(options.output_dir, PathBuf::from("out"));
        assert_eq!(options.max_parallel, 4);
        assert_eq!(options.run_timeout, Duration::from_millis(1500));
        assert_eq!(options.monitor_interval, Duration::from_secs(5));
    }
}
