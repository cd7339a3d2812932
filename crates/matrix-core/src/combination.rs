//! Combination generator
//!
//! Expands matrix axes into their cartesian product. The first axis varies
//! slowest, so combinations come out grouped by the first axis's value.

use crate::config::{CombinationFilter, MatrixAxis};
use crate::error::ConfigError;
use crate::overrides::{combination_to_overrides, ParameterOverride};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Diagnostic metadata attached to a combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationMetadata {
    /// Position in the full (unfiltered) product
    pub combination_index: usize,
    /// Size of the full product
    pub total_combinations: usize,
    /// Axis values in declaration order, for display
    pub parameter_values: indexmap::IndexMap<String, Value>,
}

/// One point of the cartesian product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixCombination {
    /// Stable identifier derived from position (`combo-<index>`)
    pub id: String,
    /// Parameter path → value assignment
    pub parameters: BTreeMap<String, Value>,
    /// Diagnostics
    pub metadata: CombinationMetadata,
}

impl MatrixCombination {
    /// Check whether this combination satisfies every filter entry
    #[must_use]
    pub fn matches(&self, filters: &[CombinationFilter]) -> bool {
        filters
            .iter()
            .all(|f| self.parameters.get(&f.parameter) == Some(&f.value))
    }

    /// Overrides in axis declaration order
    ///
    /// A later axis wins when its path contains an earlier one.
    #[must_use]
    pub fn overrides(&self) -> Vec<ParameterOverride> {
        combination_to_overrides(&self.metadata.parameter_values)
    }

    /// Compact `path=value` description
    #[must_use]
    pub fn describe(&self) -> String {
        if self.metadata.parameter_values.is_empty() {
            return "(base scenario)".to_string();
        }
        self.metadata
            .parameter_values
            .iter()
            .map(|(k, v)| format!("{k}={}", compact_value(v)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn compact_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Stable identifier for the combination at `index`
#[inline]
#[must_use]
pub fn combination_id(index: usize) -> String {
    format!("combo-{index}")
}

/// Generate the full cartesian product of `axes`
///
/// Zero axes yield exactly one combination with empty parameters. An axis
/// with no values yields no combinations (rejected earlier by config
/// validation).
#[must_use]
pub fn generate_combinations(axes: &[MatrixAxis]) -> Vec<MatrixCombination> {
    let total: usize = axes.iter().map(|a| a.values.len()).product();
    let mut combinations = Vec::with_capacity(total);

    for index in 0..total {
        // Mixed-radix decomposition with the last axis as the fastest digit.
        let mut remainder = index;
        let mut picks = vec![0usize; axes.len()];
        for (slot, axis) in axes.iter().enumerate().rev() {
            let radix = axis.values.len();
            picks[slot] = remainder % radix;
            remainder /= radix;
        }

        let mut parameters = BTreeMap::new();
        let mut parameter_values = indexmap::IndexMap::new();
        for (axis, pick) in axes.iter().zip(&picks) {
            let value = axis.values[*pick].clone();
            parameters.insert(axis.parameter.clone(), value.clone());
            parameter_values.insert(axis.parameter.clone(), value);
        }

        combinations.push(MatrixCombination {
            id: combination_id(index),
            parameters,
            metadata: CombinationMetadata {
                combination_index: index,
                total_combinations: total,
                parameter_values,
            },
        });
    }

    combinations
}

/// Keep only combinations matching every filter entry
///
/// Ids and indices keep their unfiltered positions.
///
/// # Errors
/// Returns [`ConfigError::EmptySelection`] if nothing matches.
pub fn filter_combinations(
    combinations: Vec<MatrixCombination>,
    filters: &[CombinationFilter],
) -> Result<Vec<MatrixCombination>, ConfigError> {
    if filters.is_empty() {
        return Ok(combinations);
    }

    let total = combinations.len();
    let kept: Vec<_> = combinations
        .into_iter()
        .filter(|c| c.matches(filters))
        .collect();

    if kept.is_empty() {
        return Err(ConfigError::EmptySelection { total });
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn axes() -> Vec<MatrixAxis> {
        vec![
            MatrixAxis::new("model", vec![json!("a"), json!("b")]),
            MatrixAxis::new("temp", vec![json!(0.1), json!(0.5), json!(0.9)]),
        ]
    }

    #[test]
    fn zero_axes_yield_single_default() {
        let combos = generate_combinations(&[]);
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].id, "combo-0");
        assert!(combos[0].parameters.is_empty());
        assert_eq!(combos[0].describe(), "(base scenario)");
    }

    #[test]
    fn first_axis_varies_slowest() {
        let combos = generate_combinations(&axes());
        assert_eq!(combos.len(), 6);

        let models: Vec<_> = combos.iter().map(|c| c.parameters["model"].clone()).collect();
        assert_eq!(
            models,
            vec![json!("a"), json!("a"), json!("a"), json!("b"), json!("b"), json!("b")]
        );
        let temps: Vec<_> = combos.iter().map(|c| c.parameters["temp"].clone()).collect();
        assert_eq!(temps[0..3], [json!(0.1), json!(0.5), json!(0.9)]);
    }

    #[test]
    fn ids_and_metadata_are_positional() {
        let combos = generate_combinations(&axes());
        for (i, combo) in combos.iter().enumerate() {
            assert_eq!(combo.id, format!("combo-{i}"));
            assert_eq!(combo.metadata.combination_index, i);
            assert_eq!(combo.metadata.total_combinations, 6);
        }
        assert_eq!(combos[4].describe(), "model=b, temp=0.5");
    }

    #[test]
    fn generation_is_deterministic() {
        assert_eq!(generate_combinations(&axes()), generate_combinations(&axes()));
    }

    #[test]
    fn filter_keeps_positions() {
        let combos = generate_combinations(&axes());
        let kept =
            filter_combinations(combos, &[CombinationFilter::new("model", json!("b"))]).unwrap();
        let ids: Vec<_> = kept.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["combo-3", "combo-4", "combo-5"]);
    }

    #[test]
    fn filter_matching_nothing_is_error() {
        let combos = generate_combinations(&axes());
        let result = filter_combinations(combos, &[CombinationFilter::new("model", json!("z"))]);
        assert!(matches!(result, Err(ConfigError::EmptySelection { total: 6 })));
    }

    #[test]
    fn later_axis_wins_over_nested_earlier_axis() {
        let combos = generate_combinations(&[
            MatrixAxis::new("a.b", vec![json!(2)]),
            MatrixAxis::new("a", vec![json!({ "b": 5 })]),
        ]);
        let variant = crate::apply_overrides(&json!({ "a": { "b": 1 } }), &combos[0].overrides()).unwrap();
        assert_eq!(variant, json!({ "a": { "b": 5 } }));

        let reversed = generate_combinations(&[
            MatrixAxis::new("a", vec![json!({ "b": 5 })]),
            MatrixAxis::new("a.b", vec![json!(2)]),
        ]);
        let variant = crate::apply_overrides(&json!({ "a": { "b": 1 } }), &reversed[0].overrides()).unwrap();
        assert_eq!(variant, json!({ "a": { "b": 2 } }));
    }

    proptest! {
        #[test]
        fn prop_product_size_and_uniqueness(sizes in prop::collection::vec(1usize..5, 0..4)) {
            let axes: Vec<_> = sizes
                .iter()
                .enumerate()
                .map(|(i, n)| MatrixAxis::new(format!("p{i}"), (0..*n).map(|v| json!(v)).collect()))
                .collect();
            let combos = generate_combinations(&axes);
            let expected: usize = sizes.iter().product();
            prop_assert_eq!(combos.len(), expected);

            let unique: std::collections::HashSet<_> =
                combos.iter().map(|c| serde_json::to_string(&c.parameters).unwrap()).collect();
            prop_assert_eq!(unique.len(), expected);
        }
    }
}
