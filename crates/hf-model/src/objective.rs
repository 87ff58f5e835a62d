//! Objectives and the objective variants offered by the hammering builders.

use crate::expr::Expr;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveSense {
    Minimize,
    Maximize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ObjectiveTerm {
    /// Evaluated at the last node.
    Terminal(Expr),
    /// Accumulated over the horizon with the trapezoidal rule.
    Integral(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Objective {
    sense: ObjectiveSense,
    terms: Vec<ObjectiveTerm>,
}

impl Objective {
    pub fn new(sense: ObjectiveSense, terms: Vec<ObjectiveTerm>) -> Self {
        Self { sense, terms }
    }

    pub fn maximize_terminal(expr: Expr) -> Self {
        Self::new(ObjectiveSense::Maximize, vec![ObjectiveTerm::Terminal(expr)])
    }

    pub fn minimize_integral(expr: Expr) -> Self {
        Self::new(ObjectiveSense::Minimize, vec![ObjectiveTerm::Integral(expr)])
    }

    pub fn with_term(mut self, term: ObjectiveTerm) -> Self {
        self.terms.push(term);
        self
    }

    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    pub fn terms(&self) -> &[ObjectiveTerm] {
        &self.terms
    }
}

/// Objective selection passed to every hammering builder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    /// Maximize `hv(tf)`.
    #[default]
    TerminalHammerVelocity,
    /// Maximize `hammer·hv(tf) + base·bv(tf)`.
    WeightedTerminalVelocity { hammer: f64, base: f64 },
    /// Minimize `∫ base_accel·ba² + gap_rate·(gap term)² dt`.
    QuadraticEffort { base_accel: f64, gap_rate: f64 },
}

impl ObjectiveKind {
    /// Whether a larger objective value is better.
    pub fn sense(&self) -> ObjectiveSense {
        match self {
            ObjectiveKind::QuadraticEffort { .. } => ObjectiveSense::Minimize,
            _ => ObjectiveSense::Maximize,
        }
    }
}
