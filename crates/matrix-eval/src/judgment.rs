//! Judgment strategies
//!
//! Reduce a list of evaluation results to a single success flag.
//!
//! Zero evaluations fail under every strategy: a run with nothing to check
//! is never reported as successful.

use matrix_core::EvaluationResult;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Reduction rule over evaluation results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentStrategy {
    /// Every evaluation must pass
    AllPass,
    /// At least one evaluation must pass
    AnyPass,
    /// No strategy configured; behaves like `AllPass`
    #[default]
    Default,
}

impl JudgmentStrategy {
    /// Apply the strategy
    #[must_use]
    pub fn judge(self, results: &[EvaluationResult]) -> bool {
        if results.is_empty() {
            return false;
        }
        match self {
            Self::AllPass | Self::Default => results.iter().all(|r| r.success),
            Self::AnyPass => results.iter().any(|r| r.success),
        }
    }

    /// Strategy name as written in scenarios
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllPass => "all_pass",
            Self::AnyPass => "any_pass",
            Self::Default => "default",
        }
    }
}

impl Display for JudgmentStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JudgmentStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all_pass" => Ok(Self::AllPass),
            "any_pass" => Ok(Self::AnyPass),
            "default" | "" => Ok(Self::Default),
            other => Err(format!("unknown judgment strategy '{other}'")),
        }
    }
}
