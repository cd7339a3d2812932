//! Declarative mock table for executor dependencies
//!
//! Rules are keyed by `(service, method)`. Resolution picks the most
//! specific matching rule: `Exact` > `Predicate` > `Partial` > `Any`, with
//! ties going to the rule registered first.

use crate::error::MockError;
use serde_json::Value;
use std::collections::HashMap;

/// Argument predicate for programmatic rules
pub type ArgPredicate = fn(&Value) -> bool;

/// How a rule matches call arguments
#[derive(Debug, Clone)]
pub enum ArgMatcher {
    /// Matches every call
    Any,
    /// Every key in the pattern is present in the arguments with an equal value
    Partial(Value),
    /// Custom predicate
    Predicate(ArgPredicate),
    /// Arguments equal the value
    Exact(Value),
}

impl ArgMatcher {
    /// Rank used to pick between matching rules
    #[inline]
    #[must_use]
    pub fn specificity(&self) -> u8 {
        match self {
            Self::Any => 0,
            Self::Partial(_) => 1,
            Self::Predicate(_) => 2,
            Self::Exact(_) => 3,
        }
    }

    /// Check arguments against this matcher
    #[must_use]
    pub fn matches(&self, args: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Partial(pattern) => partial_match(pattern, args),
            Self::Predicate(predicate) => predicate(args),
            Self::Exact(expected) => expected == args,
        }
    }
}

fn partial_match(pattern: &Value, args: &Value) -> bool {
    match (pattern, args) {
        (Value::Object(wanted), Value::Object(actual)) => wanted
            .iter()
            .all(|(k, v)| actual.get(k).is_some_and(|a| partial_match(v, a))),
        _ => pattern == args,
    }
}

/// One mock rule
#[derive(Debug, Clone)]
pub struct MockRule {
    /// Service name
    pub service: String,
    /// Method name
    pub method: String,
    /// Argument matcher
    pub matcher: ArgMatcher,
    /// Canned response
    pub response: Value,
}

impl MockRule {
    /// Create rule
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        matcher: ArgMatcher,
        response: Value,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            matcher,
            response,
        }
    }
}

/// Mock rules grouped by `(service, method)`
#[derive(Debug, Clone, Default)]
pub struct MockTable {
    rules: HashMap<(String, String), Vec<MockRule>>,
}

impl MockTable {
    /// Create empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a scenario's `setup.mocks` list
    ///
    /// Each entry has `service`, `method`, `response` and an optional
    /// `when` with either `args` (exact) or `partial_args` (partial).
    ///
    /// # Errors
    /// Entries that are not mappings or lack `service` / `method`.
    pub fn from_scenario(scenario: &Value) -> Result<Self, MockError> {
        let mut table = Self::new();
        let Some(entries) = scenario.get("setup").and_then(|s| s.get("mocks")) else {
            return Ok(table);
        };
        let entries = entries.as_array().ok_or_else(|| MockError::InvalidRule {
            index: 0,
            message: "setup.mocks must be a list".to_string(),
        })?;

        for (index, entry) in entries.iter().enumerate() {
            let field = |name: &str| {
                entry
                    .get(name)
                    .and_then(Value::as_str)
                    .ok_or_else(|| MockError::InvalidRule {
                        index,
                        message: format!("missing string field '{name}'"),
                    })
            };
            let service = field("service")?;
            let method = field("method")?;

            let matcher = match entry.get("when") {
                None | Some(Value::Null) => ArgMatcher::Any,
                Some(when) => {
                    if let Some(args) = when.get("args") {
                        ArgMatcher::Exact(args.clone())
                    } else if let Some(args) = when.get("partial_args") {
                        ArgMatcher::Partial(args.clone())
                    } else {
                        return Err(MockError::InvalidRule {
                            index,
                            message: "'when' needs 'args' or 'partial_args'".to_string(),
                        });
                    }
                }
            };

            let response = entry.get("response").cloned().unwrap_or(Value::Null);
            table.register(MockRule::new(service, method, matcher, response));
        }
        Ok(table)
    }

    /// Add a rule
    pub fn register(&mut self, rule: MockRule) {
        self.rules
            .entry((rule.service.clone(), rule.method.clone()))
            .or_default()
            .push(rule);
    }

    /// Find the response for a call
    #[must_use]
    pub fn resolve(&self, service: &str, method: &str, args: &Value) -> Option<&Value> {
        let candidates = self.rules.get(&(service.to_string(), method.to_string()))?;
        let mut best: Option<&MockRule> = None;
        for rule in candidates.iter().filter(|r| r.matcher.matches(args)) {
            if best.map_or(true, |b| rule.matcher.specificity() > b.matcher.specificity()) {
                best = Some(rule);
            }
        }
        best.map(|r| &r.response)
    }

    /// Total number of rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Whether the table has no rules
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn is_admin(args: &Value) -> bool {
        args.get("role").and_then(Value::as_str) == Some("admin")
    }

    fn table() -> MockTable {
        let mut table = MockTable::new();
        table.register(MockRule::new("db", "get", ArgMatcher::Any, json!("any")));
        table.register(MockRule::new(
            "db",
            "get",
            ArgMatcher::Partial(json!({ "id": 1 })),
            json!("partial"),
        ));
        table.register(MockRule::new(
            "db",
            "get",
            ArgMatcher::Predicate(is_admin),
            json!("predicate"),
        ));
        table.register(MockRule::new(
            "db",
            "get",
            ArgMatcher::Exact(json!({ "id": 1, "role": "admin" })),
            json!("exact"),
        ));
        table
    }

    #[test]
    fn most_specific_rule_wins() {
        let table = table();
        let resolve = |args: Value| table.resolve("db", "get", &args).cloned();

        assert_eq!(resolve(json!({ "id": 1, "role": "admin" })), Some(json!("exact")));
        assert_eq!(resolve(json!({ "id": 2, "role": "admin" })), Some(json!("predicate")));
        assert_eq!(resolve(json!({ "id": 1, "role": "user" })), Some(json!("partial")));
        assert_eq!(resolve(json!({ "id": 9 })), Some(json!("any")));
        assert_eq!(table.resolve("db", "put", &json!({})), None);
    }

    #[test]
    fn ties_go_to_first_registered() {
        let mut table = MockTable::new();
        table.register(MockRule::new("s", "m", ArgMatcher::Any, json!(1)));
        table.register(MockRule::new("s", "m", ArgMatcher::Any, json!(2)));
        assert_eq!(table.resolve("s", "m", &json!(null)), Some(&json!(1)));
    }

    #[test]
    fn builds_from_scenario_setup() {
        let scenario = json!({
            "setup": { "mocks": [
                { "service": "weather", "method": "forecast", "response": "sunny" },
                { "service": "weather", "method": "forecast",
                  "when": { "partial_args": { "city": "Oslo" } }, "response": "rain" },
                { "service": "weather", "method": "forecast",
                  "when": { "args": { "city": "Oslo", "days": 1 } }, "response": "snow" }
            ]}
        });
        let table = MockTable::from_scenario(&scenario).unwrap();
        assert_eq!(table.len(), 3);
        let get = |args: Value| table.resolve("weather", "forecast", &args).cloned();
        assert_eq!(get(json!({ "city": "Rome" })), Some(json!("sunny")));
        assert_eq!(get(json!({ "city": "Oslo", "days": 3 })), Some(json!("rain")));
        assert_eq!(get(json!({ "city": "Oslo", "days": 1 })), Some(json!("snow")));
    }

    #[test]
    fn rejects_malformed_entries() {
        let scenario = json!({ "setup": { "mocks": [{ "method": "x" }] } });
        assert_eq!(
            MockTable::from_scenario(&scenario).unwrap_err(),
            MockError::InvalidRule {
                index: 0,
                message: "missing string field 'service'".to_string()
            }
        );
        assert!(MockTable::from_scenario(&json!({})).unwrap().is_empty());
    }
}
