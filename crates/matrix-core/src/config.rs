//! Matrix configuration
//!
//! A matrix config names a base scenario, the axes to sweep and how many
//! times each combination runs. Both YAML and JSON documents are accepted.

use crate::error::ConfigError;
use crate::path::ParameterPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One parameter axis of the matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixAxis {
    /// Dot/bracket path into the base scenario
    pub parameter: String,
    /// Values swept along this axis
    pub values: Vec<Value>,
}

impl MatrixAxis {
    /// Create new axis
    #[inline]
    #[must_use]
    pub fn new(parameter: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            parameter: parameter.into(),
            values,
        }
    }
}

/// Matrix configuration (immutable once loaded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Human-readable matrix name
    pub name: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Path of the base scenario document
    pub base_scenario: PathBuf,
    /// Repetitions per combination (at least 1)
    #[serde(default = "default_runs_per_combination")]
    pub runs_per_combination: u32,
    /// Parameter axes; empty means a single unmodified run set
    #[serde(default)]
    pub matrix: Vec<MatrixAxis>,
}

fn default_runs_per_combination() -> u32 {
    1
}

impl MatrixConfig {
    /// Create config with no axes
    #[must_use]
    pub fn new(name: impl Into<String>, base_scenario: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            description: None,
            base_scenario: base_scenario.into(),
            runs_per_combination: 1,
            matrix: Vec::new(),
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// With repetitions per combination
    #[inline]
    #[must_use]
    pub fn with_runs_per_combination(mut self, runs: u32) -> Self {
        self.runs_per_combination = runs;
        self
    }

    /// With an additional axis
    #[inline]
    #[must_use]
    pub fn with_axis(mut self, parameter: impl Into<String>, values: Vec<Value>) -> Self {
        self.matrix.push(MatrixAxis::new(parameter, values));
        self
    }

    /// Parse from YAML (or JSON, which is valid YAML)
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed documents.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|e| ConfigError::parse_error("<inline>", e.to_string()))
    }

    /// Load from a file and validate
    ///
    /// A relative `base_scenario` is resolved against the config file's
    /// directory.
    ///
    /// # Errors
    /// IO, parse and validation failures.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
        let mut config: Self = parse_document(path, &text)?;

        if config.base_scenario.is_relative() {
            if let Some(dir) = path.parent() {
                config.base_scenario = dir.join(&config.base_scenario);
            }
        }

        config.validate()?;
        tracing::debug!(
            name = %config.name,
            axes = config.matrix.len(),
            combinations = config.total_combinations(),
            "loaded matrix config"
        );
        Ok(config)
    }

    /// Check structural rules, collecting every problem
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] listing all problems found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("name must not be empty".to_string());
        }
        if self.runs_per_combination < 1 {
            problems.push("runs_per_combination must be at least 1".to_string());
        }

        let mut seen = HashSet::new();
        for (i, axis) in self.matrix.iter().enumerate() {
            if let Err(e) = ParameterPath::parse(&axis.parameter) {
                problems.push(format!("matrix[{i}]: {e}"));
            }
            if axis.values.is_empty() {
                problems.push(format!(
                    "matrix[{i}] ('{}') must list at least one value",
                    axis.parameter
                ));
            }
            if !seen.insert(axis.parameter.as_str()) {
                problems.push(format!(
                    "matrix[{i}]: parameter '{}' appears more than once",
                    axis.parameter
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    /// Number of combinations in the cartesian product
    #[must_use]
    pub fn total_combinations(&self) -> usize {
        self.matrix.iter().map(|axis| axis.values.len()).product()
    }

    /// Total number of runs (combinations × repetitions)
    #[must_use]
    pub fn total_runs(&self) -> usize {
        self.total_combinations() * self.runs_per_combination as usize
    }

    /// Axis parameter paths in declaration order
    pub fn parameter_paths(&self) -> impl Iterator<Item = &str> {
        self.matrix.iter().map(|axis| axis.parameter.as_str())
    }

    /// Serialize to YAML
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::parse_error("<config>", e.to_string()))
    }
}

/// Load a scenario document (YAML or JSON) as a value tree
///
/// # Errors
/// IO and parse failures.
pub fn load_scenario(path: impl AsRef<Path>) -> Result<Value, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
    let doc: Value = parse_document(path, &text)?;

    if !doc.is_object() {
        return Err(ConfigError::parse_error(
            path,
            "scenario document must be a mapping at the top level",
        ));
    }
    Ok(doc)
}

fn parse_document<T: serde::de::DeserializeOwned>(path: &Path, text: &str) -> Result<T, ConfigError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(text).map_err(|e| ConfigError::parse_error(path, e.to_string()))
    } else {
        serde_yaml::from_str(text).map_err(|e| ConfigError::parse_error(path, e.to_string()))
    }
}

/// Restrict execution to combinations whose parameter equals a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationFilter {
    /// Axis parameter path
    pub parameter: String,
    /// Required value
    pub value: Value,
}

impl CombinationFilter {
    /// Create new filter entry
    #[inline]
    #[must_use]
    pub fn new(parameter: impl Into<String>, value: Value) -> Self {
        Self {
            parameter: parameter.into(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const SAMPLE: &str = r#"
name: model sweep
description: compare models
base_scenario: scenarios/base.yaml
runs_per_combination: 3
matrix:
  - parameter: character.llm.model
    values: [small, large]
  - parameter: run[0].input
    values: ["hi", "hello", "hey"]
"#;

    #[test]
    fn parses_yaml_config() {
        let config = MatrixConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.name, "model sweep");
        assert_eq!(config.runs_per_combination, 3);
        assert_eq!(config.matrix.len(), 2);
        assert_eq!(config.matrix[0].values, vec![json!("small"), json!("large")]);
        assert_eq!(config.total_combinations(), 6);
        assert_eq!(config.total_runs(), 18);
    }

    #[test]
    fn runs_default_to_one() {
        let config = MatrixConfig::from_yaml_str("name: x\nbase_scenario: a.yaml\n").unwrap();
        assert_eq!(config.runs_per_combination, 1);
        assert_eq!(config.total_combinations(), 1);
    }

    #[test]
    fn validate_collects_every_problem() {
        let config = MatrixConfig::new(" ", "base.yaml")
            .with_runs_per_combination(0)
            .with_axis("a..b", vec![json!(1)])
            .with_axis("c", vec![])
            .with_axis("c", vec![json!(2)]);

        match config.validate().unwrap_err() {
            ConfigError::Invalid { problems } => assert_eq!(problems.len(), 5),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn from_path_resolves_relative_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.yaml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(SAMPLE.as_bytes())
            .unwrap();

        let config = MatrixConfig::from_path(&path).unwrap();
        assert_eq!(config.base_scenario, dir.path().join("scenarios/base.yaml"));
    }

    #[test]
    fn from_path_accepts_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.json");
        std::fs::write(
            &path,
            r#"{"name":"j","base_scenario":"/abs/base.json","matrix":[{"parameter":"a","values":[1,2]}]}"#,
        )
        .unwrap();

        let config = MatrixConfig::from_path(&path).unwrap();
        assert_eq!(config.base_scenario, PathBuf::from("/abs/base.json"));
        assert_eq!(config.total_combinations(), 2);
    }

    #[test]
    fn load_scenario_rejects_non_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.yaml");
        std::fs::write(&path, "- just\n- a list\n").unwrap();
        assert!(matches!(load_scenario(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn load_scenario_missing_file_is_io_error() {
        let result = load_scenario("/definitely/not/here.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn yaml_round_trip_keeps_axes() {
        let config = MatrixConfig::from_yaml_str(SAMPLE).unwrap();
        let text = config.to_yaml().unwrap();
        assert_eq!(MatrixConfig::from_yaml_str(&text).unwrap(), config);
    }
}
