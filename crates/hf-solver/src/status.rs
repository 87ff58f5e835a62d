//! Solver verdicts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a solve attempt ended.
///
/// Exactly one variant applies to every attempt. Only `Optimal` may be used
/// as a feasible result; `TimeLimit` and `Other` are indeterminate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum TerminationStatus {
    Optimal,
    Infeasible,
    /// The wall-clock cap expired first.
    TimeLimit,
    Other(String),
}

impl TerminationStatus {
    pub fn is_optimal(&self) -> bool {
        matches!(self, TerminationStatus::Optimal)
    }

    pub fn is_infeasible(&self) -> bool {
        matches!(self, TerminationStatus::Infeasible)
    }

    /// Neither optimal nor infeasible.
    pub fn is_indeterminate(&self) -> bool {
        !(self.is_optimal() || self.is_infeasible())
    }

    /// Short tag for tables and manifests.
    pub fn label(&self) -> &str {
        match self {
            TerminationStatus::Optimal => "optimal",
            TerminationStatus::Infeasible => "infeasible",
            TerminationStatus::TimeLimit => "time_limit",
            TerminationStatus::Other(_) => "other",
        }
    }
}

impl fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationStatus::Other(reason) => write!(f, "other ({reason})"),
            _ => f.write_str(self.label()),
        }
    }
}
