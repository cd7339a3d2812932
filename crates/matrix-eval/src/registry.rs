//! Evaluator registry
//!
//! Provides [`EvaluatorRegistry`], a static table from evaluator type to
//! implementation, populated at startup from registered factories.

use crate::builtin::{
    ExecutionTimeEvaluator, FileExistsEvaluator, RegexMatchEvaluator, StringContainsEvaluator,
    TrajectoryActionEvaluator,
};
use crate::evaluator::Evaluator;
use std::collections::HashMap;
use std::sync::Arc;

/// Constructor for an evaluator implementation
pub type EvaluatorFactory = fn() -> Arc<dyn Evaluator>;

/// Factories for the built-in evaluator types
pub const BUILTIN_EVALUATORS: &[(&str, EvaluatorFactory)] = &[
    ("string_contains", || Arc::new(StringContainsEvaluator)),
    ("regex_match", || Arc::new(RegexMatchEvaluator)),
    ("file_exists", || Arc::new(FileExistsEvaluator)),
    ("trajectory_contains_action", || Arc::new(TrajectoryActionEvaluator)),
    ("execution_time", || Arc::new(ExecutionTimeEvaluator)),
];

/// Registry of available evaluators keyed by type string
#[derive(Debug, Default, Clone)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, Arc<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            evaluators: HashMap::new(),
        }
    }

    /// Create registry with built-in evaluators
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (name, factory) in BUILTIN_EVALUATORS {
            registry.register_factory(name, *factory);
        }
        registry
    }

    /// Register an evaluator under its own name
    ///
    /// Replaces any evaluator previously registered under that name.
    pub fn register(&mut self, evaluator: Arc<dyn Evaluator>) {
        self.evaluators
            .insert(evaluator.name().to_string(), evaluator);
    }

    /// Register an evaluator under an explicit type string
    pub fn register_factory(&mut self, name: &str, factory: EvaluatorFactory) {
        self.evaluators.insert(name.to_string(), factory());
    }

    /// Look up evaluator by type
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Evaluator>> {
        self.evaluators.get(name)
    }

    /// Check if evaluator exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.evaluators.contains_key(name)
    }

    /// Remove evaluator
    #[inline]
    pub fn remove(&mut self, name: &str) -> bool {
        self.evaluators.remove(name).is_some()
    }

    /// List registered type strings (sorted)
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.evaluators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Get number of registered evaluators
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;
    use crate::evaluator::{EvaluationSpec, Verdict};
    use matrix_core::ExecutionOutcome;

    #[derive(Debug)]
    struct AlwaysPass;

    impl Evaluator for AlwaysPass {
        fn name(&self) -> &'static str {
            "always_pass"
        }

        fn evaluate(
            &self,
            _spec: &EvaluationSpec,
            _outcome: &ExecutionOutcome,
        ) -> Result<Verdict, EvaluationError> {
            Ok(Verdict::pass("ok"))
        }
    }

    #[test]
    fn registry_new_empty() {
        let registry = EvaluatorRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn registry_with_defaults() {
        let registry = EvaluatorRegistry::with_defaults();
        assert_eq!(registry.len(), BUILTIN_EVALUATORS.len());
        for name in ["string_contains", "regex_match", "file_exists"] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn builtin_factories_match_their_names() {
        for (name, factory) in BUILTIN_EVALUATORS {
            assert_eq!(factory().name(), *name);
        }
    }

    #[test]
    fn registry_register_and_remove() {
        let mut registry = EvaluatorRegistry::new();
        registry.register(Arc::new(AlwaysPass));
        assert!(registry.contains("always_pass"));
        assert_eq!(registry.names(), vec!["always_pass"]);

        assert!(registry.remove("always_pass"));
        assert!(!registry.remove("always_pass"));
    }
}
