//! Continuous-time variables and their roles, bounds and guesses.

use crate::error::{ModelError, ModelResult};
use hf_core::{VarId, interp_linear, project};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a variable represents in the optimal-control problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    State,
    FirstDerivative,
    SecondDerivative,
    Control,
    /// Time-invariant polynomial coefficient (one NLP column in total).
    Coefficient,
}

impl Role {
    pub fn is_derivative(self) -> bool {
        matches!(self, Role::FirstDerivative | Role::SecondDerivative)
    }

    pub fn is_time_varying(self) -> bool {
        !matches!(self, Role::Coefficient)
    }

    pub fn tag(self) -> &'static str {
        match self {
            Role::State => "state",
            Role::FirstDerivative => "first_derivative",
            Role::SecondDerivative => "second_derivative",
            Role::Control => "control",
            Role::Coefficient => "coefficient",
        }
    }
}

impl FromStr for Role {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "state" => Ok(Role::State),
            "first_derivative" => Ok(Role::FirstDerivative),
            "second_derivative" => Ok(Role::SecondDerivative),
            "control" => Ok(Role::Control),
            "coefficient" => Ok(Role::Coefficient),
            other => Err(ModelError::UnknownRole {
                what: format!("'{other}' is not a variable role"),
            }),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Optional lower/upper box bounds. `None` is unbounded on that side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bounds {
    pub fn free() -> Self {
        Self::default()
    }

    pub fn fixed(value: f64) -> Self {
        Self::between(value, value)
    }

    pub fn between(lower: f64, upper: f64) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    pub fn at_least(lower: f64) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
        }
    }

    pub fn symmetric(limit: f64) -> Self {
        Self::between(-limit, limit)
    }

    /// Reject NaN ends and `lower > upper`.
    pub fn validate(&self, what: &str) -> ModelResult<()> {
        let nan = self.lower.is_some_and(f64::is_nan) || self.upper.is_some_and(f64::is_nan);
        let crossed = matches!((self.lower, self.upper), (Some(l), Some(u)) if l > u);
        if nan || crossed {
            return Err(ModelError::InvalidBounds {
                what: what.to_string(),
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }

    pub fn lower_or_inf(&self) -> f64 {
        self.lower.unwrap_or(f64::NEG_INFINITY)
    }

    pub fn upper_or_inf(&self) -> f64 {
        self.upper.unwrap_or(f64::INFINITY)
    }

    pub fn is_fixed(&self) -> bool {
        matches!((self.lower, self.upper), (Some(l), Some(u)) if l == u)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower_or_inf() && value <= self.upper_or_inf()
    }

    /// Clamp `value` into the box.
    pub fn project(&self, value: f64) -> f64 {
        project(value, self.lower_or_inf(), self.upper_or_inf())
    }

    pub fn midpoint(&self) -> Option<f64> {
        Some(0.5 * (self.lower? + self.upper?))
    }
}

/// Initial guess profile over normalized time `s = t / tf ∈ [0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Guess {
    Constant(f64),
    Linear { start: f64, end: f64 },
    /// Piecewise-linear samples; `times` are normalized and ascending.
    Samples { times: Vec<f64>, values: Vec<f64> },
}

impl Guess {
    /// Value at normalized time `s`.
    pub fn value_at(&self, s: f64) -> f64 {
        match self {
            Guess::Constant(v) => *v,
            Guess::Linear { start, end } => start + (end - start) * s.clamp(0.0, 1.0),
            Guess::Samples { times, values } => interp_linear(times, values, s).unwrap_or(0.0),
        }
    }

    pub(crate) fn validate(&self, what: &str) -> ModelResult<()> {
        let ok = match self {
            Guess::Constant(v) => v.is_finite(),
            Guess::Linear { start, end } => start.is_finite() && end.is_finite(),
            Guess::Samples { times, values } => {
                !times.is_empty()
                    && times.len() == values.len()
                    && times.windows(2).all(|w| w[0] <= w[1])
                    && values.iter().all(|v| v.is_finite())
            }
        };
        if ok {
            Ok(())
        } else {
            Err(ModelError::InvalidParameter {
                what: format!("initial guess for '{what}'"),
            })
        }
    }
}

/// A named scalar function of time declared in a model.
#[derive(Clone, Debug, PartialEq)]
pub struct ContinuousVariable {
    pub(crate) id: VarId,
    pub(crate) name: String,
    pub(crate) role: Role,
    pub(crate) bounds: Bounds,
    pub(crate) guess: Option<Guess>,
    pub(crate) derivative_of: Option<VarId>,
}

impl ContinuousVariable {
    pub fn id(&self) -> VarId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn guess(&self) -> Option<&Guess> {
        self.guess.as_ref()
    }

    /// Base variable this one differentiates, for derivative roles.
    pub fn derivative_of(&self) -> Option<VarId> {
        self.derivative_of
    }

    /// Guess at normalized time `s`, falling back to the projection of 0
    /// onto the bounds.
    pub fn guess_at(&self, s: f64) -> f64 {
        let raw = self.guess.as_ref().map_or(0.0, |g| g.value_at(s));
        self.bounds.project(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_tags_parse() {
        assert_eq!("state".parse::<Role>().unwrap(), Role::State);
        assert_eq!(" Control ".parse::<Role>().unwrap(), Role::Control);
        assert_eq!(
            "second_derivative".parse::<Role>().unwrap(),
            Role::SecondDerivative
        );
        let err = "integral".parse::<Role>().unwrap_err();
        assert!(matches!(err, ModelError::UnknownRole { .. }));
    }

    #[test]
    fn role_display_round_trips() {
        for role in [
            Role::State,
            Role::FirstDerivative,
            Role::SecondDerivative,
            Role::Control,
            Role::Coefficient,
        ] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn crossed_bounds_are_rejected() {
        assert!(Bounds::between(1.0, 0.0).validate("x").is_err());
        assert!(Bounds::between(0.0, 0.0).validate("x").is_ok());
        assert!(Bounds::free().validate("x").is_ok());
        assert!(
            Bounds {
                lower: Some(f64::NAN),
                upper: None
            }
            .validate("x")
            .is_err()
        );
    }

    #[test]
    fn projection_respects_open_ends() {
        let b = Bounds::at_least(2.0);
        assert_eq!(b.project(-5.0), 2.0);
        assert_eq!(b.project(1e9), 1e9);
        assert!(Bounds::fixed(0.035).is_fixed());
        assert_eq!(Bounds::between(0.035, 0.06).midpoint(), Some(0.0475));
        assert_eq!(Bounds::at_least(0.0).midpoint(), None);
    }

    #[test]
    fn guess_profiles() {
        assert_eq!(Guess::Constant(3.0).value_at(0.7), 3.0);
        let lin = Guess::Linear {
            start: 0.0,
            end: 2.0,
        };
        assert_eq!(lin.value_at(0.5), 1.0);
        assert_eq!(lin.value_at(2.0), 2.0);
        let samples = Guess::Samples {
            times: vec![0.0, 0.5, 1.0],
            values: vec![0.0, 1.0, 0.0],
        };
        assert_eq!(samples.value_at(0.25), 0.5);
        assert!(
            Guess::Samples {
                times: vec![0.0, 1.0],
                values: vec![1.0]
            }
            .validate("x")
            .is_err()
        );
    }
}
