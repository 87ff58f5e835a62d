//! Stiffness regimes and the hammering formulations.

use crate::error::{ModelError, ModelResult};
use crate::model::DynamicModel;
use crate::objective::ObjectiveKind;
use crate::params::HammerParams;
use crate::variable::Bounds;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Magnet gap regime of the variable-stiffness coupling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stiffness {
    /// Gap pinned at `w_max`.
    #[serde(alias = "low_stiffness")]
    Low,
    /// Gap pinned at `w_min`.
    #[serde(alias = "high_stiffness")]
    High,
    /// Gap free in `[w_min, w_max]` with a bounded rate.
    #[serde(alias = "variable_stiffness")]
    Variable,
}

impl Stiffness {
    pub const ALL: [Stiffness; 3] = [Stiffness::Low, Stiffness::High, Stiffness::Variable];

    pub fn tag(self) -> &'static str {
        match self {
            Stiffness::Low => "low",
            Stiffness::High => "high",
            Stiffness::Variable => "variable",
        }
    }

    pub fn gap_bounds(self, params: &HammerParams) -> Bounds {
        match self {
            Stiffness::Low => Bounds::fixed(params.w_max),
            Stiffness::High => Bounds::fixed(params.w_min),
            Stiffness::Variable => Bounds::between(params.w_min, params.w_max),
        }
    }

    /// Gap rate bounds; fixed regimes cannot move the magnet.
    pub fn gap_rate_bounds(self, limit: f64) -> Bounds {
        match self {
            Stiffness::Variable => Bounds::symmetric(limit),
            Stiffness::Low | Stiffness::High => Bounds::fixed(0.0),
        }
    }

    /// Upper end of the regime's gap bounds.
    pub fn upper_gap(self, params: &HammerParams) -> f64 {
        match self {
            Stiffness::High => params.w_min,
            Stiffness::Low | Stiffness::Variable => params.w_max,
        }
    }

    pub fn midpoint_gap(self, params: &HammerParams) -> f64 {
        match self {
            Stiffness::Low => params.w_max,
            Stiffness::High => params.w_min,
            Stiffness::Variable => 0.5 * (params.w_min + params.w_max),
        }
    }
}

impl FromStr for Stiffness {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "low_stiffness" => Ok(Stiffness::Low),
            "high" | "high_stiffness" => Ok(Stiffness::High),
            "variable" | "variable_stiffness" => Ok(Stiffness::Variable),
            _ => Err(ModelError::UnknownStiffness { tag: s.to_string() }),
        }
    }
}

impl fmt::Display for Stiffness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Which hammering model to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formulation {
    Direct,
    Tracking,
    Flat,
}

impl Formulation {
    pub fn tag(self) -> &'static str {
        match self {
            Formulation::Direct => "direct",
            Formulation::Tracking => "tracking",
            Formulation::Flat => "flat",
        }
    }

    pub fn default_objective(self) -> ObjectiveKind {
        match self {
            Formulation::Direct | Formulation::Tracking => ObjectiveKind::TerminalHammerVelocity,
            Formulation::Flat => ObjectiveKind::WeightedTerminalVelocity {
                hammer: 1.0,
                base: 1.0,
            },
        }
    }

    /// Build this formulation's model.
    pub fn build(
        self,
        tf: f64,
        stiffness: Stiffness,
        params: &HammerParams,
        objective: ObjectiveKind,
    ) -> ModelResult<DynamicModel> {
        match self {
            Formulation::Direct => crate::direct::direct_model(tf, stiffness, params, objective),
            Formulation::Tracking => {
                crate::tracking::tracking_model(tf, stiffness, params, objective)
            }
            Formulation::Flat => crate::flat::flat_model(tf, stiffness, params, objective),
        }
    }
}

impl FromStr for Formulation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Formulation::Direct),
            "tracking" | "trajectory" => Ok(Formulation::Tracking),
            "flat" | "differential_flat" => Ok(Formulation::Flat),
            _ => Err(ModelError::UnknownFormulation { tag: s.to_string() }),
        }
    }
}

impl fmt::Display for Formulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
