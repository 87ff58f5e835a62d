//! Physical parameters of the hammering study.
//!
//! All quantities are plain SI `f64` so they can be read straight from YAML.

use crate::error::{ModelError, ModelResult};
use crate::variable::Bounds;
use serde::{Deserialize, Serialize};

/// Calibrated per-formulation coefficients.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormulationTuning {
    /// Viscous damping on the hammer velocity, N·s/m.
    pub damping: f64,
    /// Symmetric bound on the gap rate in the variable-stiffness regime, m/s.
    pub gap_rate_limit: f64,
}

/// Skew-normal reference trajectory for the tracking formulation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkewNormalParams {
    /// Amplitude `A`, m.
    pub amplitude: f64,
    pub t1: f64,
    pub t2: f64,
    /// Skewness `α`.
    pub alpha: f64,
}

impl Default for SkewNormalParams {
    fn default() -> Self {
        Self {
            amplitude: 0.5,
            t1: -2.0,
            t2: 3.0,
            alpha: 4.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HammerParams {
    /// Hammer mass, kg.
    pub h_mass: f64,
    /// Smallest magnet gap (high stiffness), m.
    pub w_min: f64,
    /// Largest magnet gap (low stiffness), m.
    pub w_max: f64,
    pub bd_min: f64,
    pub bd_max: f64,
    pub bv_min: f64,
    pub bv_max: f64,
    pub ba_min: f64,
    pub ba_max: f64,
    /// Base travel required at the end of the maneuver, m.
    pub path_length: f64,
    pub skew_normal: SkewNormalParams,
    pub direct: FormulationTuning,
    pub tracking: FormulationTuning,
    /// Damping used by the differentially-flat formulation.
    pub flat_damping: f64,
}

impl Default for HammerParams {
    fn default() -> Self {
        Self {
            h_mass: 0.5,
            w_min: 0.035,
            w_max: 0.06,
            bd_min: -0.1,
            bd_max: 0.5,
            bv_min: -1.0,
            bv_max: 1.0,
            ba_min: -5.0,
            ba_max: 5.0,
            path_length: 0.2,
            skew_normal: SkewNormalParams::default(),
            direct: FormulationTuning {
                damping: 1.0,
                gap_rate_limit: 0.15,
            },
            tracking: FormulationTuning {
                damping: 0.5,
                gap_rate_limit: 0.08,
            },
            flat_damping: 1.0,
        }
    }
}

impl HammerParams {
    pub fn bd_bounds(&self) -> Bounds {
        Bounds::between(self.bd_min, self.bd_max)
    }

    pub fn bv_bounds(&self) -> Bounds {
        Bounds::between(self.bv_min, self.bv_max)
    }

    pub fn ba_bounds(&self) -> Bounds {
        Bounds::between(self.ba_min, self.ba_max)
    }

    /// Check every bound pair and the mass.
    pub fn validate(&self) -> ModelResult<()> {
        let finite = [
            ("h_mass", self.h_mass),
            ("w_min", self.w_min),
            ("w_max", self.w_max),
            ("path_length", self.path_length),
            ("flat_damping", self.flat_damping),
            ("direct.damping", self.direct.damping),
            ("tracking.damping", self.tracking.damping),
            ("skew_normal.amplitude", self.skew_normal.amplitude),
            ("skew_normal.alpha", self.skew_normal.alpha),
        ];
        if let Some((name, value)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ModelError::InvalidParameter {
                what: format!("{name} = {value}"),
            });
        }
        if self.h_mass <= 0.0 {
            return Err(ModelError::InvalidParameter {
                what: format!("hammer mass must be positive, got {}", self.h_mass),
            });
        }
        Bounds::between(self.w_min, self.w_max).validate("magnet gap (w_min..w_max)")?;
        self.bd_bounds().validate("bd")?;
        self.bv_bounds().validate("bv")?;
        self.ba_bounds().validate("ba")?;
        for (name, tuning) in [("direct", &self.direct), ("tracking", &self.tracking)] {
            if !(tuning.gap_rate_limit.is_finite() && tuning.gap_rate_limit >= 0.0) {
                return Err(ModelError::InvalidBounds {
                    what: format!("{name} gap rate limit"),
                    lower: Some(-tuning.gap_rate_limit),
                    upper: Some(tuning.gap_rate_limit),
                });
            }
        }
        if self.skew_normal.t1 == self.skew_normal.t2 {
            return Err(ModelError::InvalidParameter {
                what: "skew-normal window t1 == t2".to_string(),
            });
        }
        Ok(())
    }

    /// Parameters as `(name, value)` pairs for model metadata.
    pub(crate) fn as_pairs(&self) -> Vec<(String, f64)> {
        [
            ("h_mass", self.h_mass),
            ("w_min", self.w_min),
            ("w_max", self.w_max),
            ("path_length", self.path_length),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Kinematic bicycle parameters for the car maneuver.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarParams {
    /// Wheelbase `L`, m.
    pub wheelbase: f64,
    pub steer_limit: f64,
    pub steer_rate_limit: f64,
    /// Lateral position to reach at `tf`, m.
    pub target_y: f64,
    /// Weight on `φ²` in the running cost.
    pub steer_weight: f64,
}

impl Default for CarParams {
    fn default() -> Self {
        Self {
            wheelbase: 2.0,
            steer_limit: 0.5,
            steer_rate_limit: 0.1,
            target_y: 20.0,
            steer_weight: 0.2,
        }
    }
}
