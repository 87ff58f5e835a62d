//! Magnetic contact law and pieces shared by the hammering formulations.

use crate::constraint::Relation;
use crate::error::{ModelError, ModelResult};
use crate::expr::Expr;
use crate::model::{ModelBuilder, ModelMetadata};
use crate::objective::{Objective, ObjectiveKind};
use crate::params::HammerParams;
use crate::regime::{Formulation, Stiffness};
use crate::variable::Guess;

/// Force scale of the repulsive magnet pair, N.
pub const C1: f64 = 28.41;
/// Exponential decay rate of the magnet force, 1/m.
pub const C2: f64 = 206.35;
/// Nominal magnet half-gap `w`, m.
pub const NOMINAL_GAP: f64 = 0.03;

/// `F_s(md, hd) = 2·c1·exp(-c2·(md - w))·sinh(c2·hd)`.
pub fn spring_force(md: f64, hd: f64) -> f64 {
    2.0 * C1 * (-C2 * (md - NOMINAL_GAP)).exp() * (C2 * hd).sinh()
}

pub fn spring_force_expr(md: &Expr, hd: &Expr) -> Expr {
    2.0 * C1 * (-C2 * (md - NOMINAL_GAP)).exp() * (C2 * hd).sinh()
}

/// Hammer acceleration `-(ba·m + F_s + damping·hv) / m`.
pub fn hammer_accel(ba: f64, md: f64, hd: f64, hv: f64, h_mass: f64, damping: f64) -> f64 {
    -(ba * h_mass + spring_force(md, hd) + damping * hv) / h_mass
}

pub fn hammer_accel_expr(
    ba: &Expr,
    md: &Expr,
    hd: &Expr,
    hv: &Expr,
    h_mass: f64,
    damping: f64,
) -> Expr {
    -(ba * h_mass + spring_force_expr(md, hd) + damping * hv) / h_mass
}

/// Gap that produces spring force `force` at hammer offset `hd`.
///
/// Inverts the contact law: `md = w - ln(F / (2·c1·sinh(c2·hd))) / c2`.
/// `None` where the law has no solution (zero offset or a force of the
/// wrong sign).
pub fn flat_gap_closed_form(force: f64, hd: f64) -> Option<f64> {
    let denom = 2.0 * C1 * (C2 * hd).sinh();
    let ratio = force / denom;
    if !ratio.is_finite() || ratio <= 0.0 {
        return None;
    }
    Some(NOMINAL_GAP - ratio.ln() / C2)
}

/// Validate inputs and open a builder tagged with regime metadata.
pub(crate) fn start_hammer_model(
    formulation: Formulation,
    tf: f64,
    stiffness: Stiffness,
    params: &HammerParams,
) -> ModelResult<ModelBuilder> {
    params.validate()?;
    let mut b = ModelBuilder::new(format!("{formulation}_{stiffness}"), tf)?;
    b.set_metadata(ModelMetadata {
        formulation: Some(formulation),
        stiffness: Some(stiffness),
        parameters: params.as_pairs(),
    });
    Ok(b)
}

/// `gap_upper: hd ≤ md - w` and `gap_lower: hd ≥ -(md - w)`.
pub(crate) fn add_gap_constraints(b: &mut ModelBuilder, md: &Expr, hd: &Expr) -> ModelResult<()> {
    b.add_path("gap_upper", hd - &(md - NOMINAL_GAP), Relation::Le)?;
    b.add_path("gap_lower", hd + &(md - NOMINAL_GAP), Relation::Ge)?;
    Ok(())
}

/// Objective for `kind`; `gap_term` is the expression penalized by the
/// gap-rate weight of the quadratic effort.
pub(crate) fn hammer_objective(
    kind: ObjectiveKind,
    hv: &Expr,
    bv: &Expr,
    ba: &Expr,
    gap_term: &Expr,
) -> ModelResult<Objective> {
    match kind {
        ObjectiveKind::TerminalHammerVelocity => Ok(Objective::maximize_terminal(hv.clone())),
        ObjectiveKind::WeightedTerminalVelocity { hammer, base } => {
            check_weights(&[hammer, base])?;
            Ok(Objective::maximize_terminal(hammer * hv + base * bv))
        }
        ObjectiveKind::QuadraticEffort {
            base_accel,
            gap_rate,
        } => {
            check_weights(&[base_accel, gap_rate])?;
            Ok(Objective::minimize_integral(
                base_accel * ba.clone().square() + gap_rate * gap_term.clone().square(),
            ))
        }
    }
}

/// Hammer offset at which the spring balances base acceleration `ba`.
pub fn quasi_static_offset(ba: f64, md: f64, h_mass: f64) -> f64 {
    let scale = 2.0 * C1 * (-C2 * (md - NOMINAL_GAP)).exp();
    (-h_mass * ba / scale).asinh() / C2
}

const GUESS_SAMPLES: usize = 41;

/// Sampled starting profiles over normalized time.
#[derive(Clone, Debug)]
pub(crate) struct ProfileGuess {
    pub times: Vec<f64>,
    pub bd: Vec<f64>,
    pub bv: Vec<f64>,
    pub ba: Vec<f64>,
    pub hd: Vec<f64>,
}

impl ProfileGuess {
    /// Smoothstep base move of `length` in `tf`, starting and ending at rest,
    /// with the hammer riding at its quasi-static offset.
    pub fn rest_to_rest(length: f64, tf: f64, md: f64, params: &HammerParams) -> Self {
        let times: Vec<f64> = (0..GUESS_SAMPLES)
            .map(|k| k as f64 / (GUESS_SAMPLES - 1) as f64)
            .collect();
        let bd = times
            .iter()
            .map(|&s| length * s * s * (3.0 - 2.0 * s))
            .collect();
        let bv = times
            .iter()
            .map(|&s| 6.0 * length * s * (1.0 - s) / tf)
            .collect();
        let ba: Vec<f64> = times
            .iter()
            .map(|&s| (6.0 * length * (1.0 - 2.0 * s) / (tf * tf)).clamp(params.ba_min, params.ba_max))
            .collect();
        let hd = ba
            .iter()
            .map(|&a| quasi_static_offset(a, md, params.h_mass))
            .collect();
        Self {
            times,
            bd,
            bv,
            ba,
            hd,
        }
    }

    pub fn samples(&self, values: &[f64]) -> Guess {
        Guess::Samples {
            times: self.times.clone(),
            values: values.to_vec(),
        }
    }
}

fn check_weights(weights: &[f64]) -> ModelResult<()> {
    if weights.iter().all(|w| w.is_finite()) {
        Ok(())
    } else {
        Err(ModelError::InvalidParameter {
            what: format!("objective weights {weights:?}"),
        })
    }
}
