//! Trajectory-tracking formulation: first-order ODEs with the base pinned to
//! a skew-normal reference path.

use crate::constraint::Relation;
use crate::contact::{
    add_gap_constraints, hammer_accel_expr, hammer_objective, quasi_static_offset,
    start_hammer_model,
};
use crate::error::ModelResult;
use crate::expr::{Expr, Snapshot};
use crate::model::DynamicModel;
use crate::objective::ObjectiveKind;
use crate::params::{HammerParams, SkewNormalParams};
use crate::regime::{Formulation, Stiffness};
use crate::variable::{Bounds, Guess, Role};
use std::f64::consts::{PI, SQRT_2};

const GUESS_SAMPLES: usize = 81;

/// Reference base displacement `A·φ(τ)·Φ_s(τ)` as an expression of `t`.
///
/// `τ = t1 + (t2 - t1)·t/tf` maps the horizon onto the skew-normal window.
pub fn skew_normal_expr(sn: &SkewNormalParams, tf: f64) -> Expr {
    let tau = sn.t1 + ((sn.t2 - sn.t1) / tf) * Expr::time();
    let phi = (-0.5 * tau.clone().square()).exp() / (2.0 * PI).sqrt();
    let skew = 0.5 * (1.0 + ((sn.alpha / SQRT_2) * tau).erf());
    sn.amplitude * phi * skew
}

/// Build the tracking model over `[0, tf]`.
///
/// Variables: states `bd, bv, hd, hv`, their derivatives `dbd, dbv, dhd,
/// dhv`, controls `ba, md` and the gap rate `mv`.
pub fn tracking_model(
    tf: f64,
    stiffness: Stiffness,
    params: &HammerParams,
    objective: ObjectiveKind,
) -> ModelResult<DynamicModel> {
    let mut b = start_hammer_model(Formulation::Tracking, tf, stiffness, params)?;
    let tuning = params.tracking;

    let bd = b.declare("bd", Role::State, params.bd_bounds())?;
    let bv = b.declare("bv", Role::State, params.bv_bounds())?;
    let hd = b.declare("hd", Role::State, Bounds::free())?;
    let hv = b.declare("hv", Role::State, Bounds::free())?;
    let dbd = b.link_derivative(bd, "dbd", Bounds::free())?;
    let dbv = b.link_derivative(bv, "dbv", Bounds::free())?;
    let dhd = b.link_derivative(hd, "dhd", Bounds::free())?;
    let dhv = b.link_derivative(hv, "dhv", Bounds::free())?;
    let ba = b.declare("ba", Role::Control, params.ba_bounds())?;
    let md = b.declare("md", Role::Control, stiffness.gap_bounds(params))?;
    let mv = b.link_derivative(md, "mv", stiffness.gap_rate_bounds(tuning.gap_rate_limit))?;

    let [e_bd, e_bv, e_hd, e_hv, e_dbd, e_dbv, e_dhd, e_dhv, e_ba, e_md, e_mv] =
        [bd, bv, hd, hv, dbd, dbv, dhd, dhv, ba, md, mv].map(Expr::var);

    b.add_path("ode_bd", &e_dbd - &e_bv, Relation::Eq)?;
    b.add_path("ode_bv", &e_dbv - &e_ba, Relation::Eq)?;
    b.add_path("ode_hd", &e_dhd - &e_hv, Relation::Eq)?;
    b.add_path(
        "ode_hv",
        &e_dhv - &hammer_accel_expr(&e_ba, &e_md, &e_hd, &e_hv, params.h_mass, tuning.damping),
        Relation::Eq,
    )?;
    add_gap_constraints(&mut b, &e_md, &e_hd)?;

    let reference = skew_normal_expr(&params.skew_normal, tf);
    let bd0 = reference.eval(&Snapshot {
        time: 0.0,
        values: &[],
    });
    b.add_path("base_trajectory", &e_bd - &reference, Relation::Eq)?;

    let md0 = stiffness.midpoint_gap(params);
    b.fix_initial(bd, bd0)?;
    for id in [bv, ba, hd, hv] {
        b.fix_initial(id, 0.0)?;
    }
    b.fix_initial(md, md0)?;

    b.add_final("base_stop", e_bv.clone(), Relation::Eq)?;

    let guess = reference_guess(&reference, tf, md0, params);
    b.set_guess(bd, guess.bd)?;
    b.set_guess(bv, guess.bv.clone())?;
    b.set_guess(dbd, guess.bv)?;
    b.set_guess(ba, guess.ba.clone())?;
    b.set_guess(dbv, guess.ba)?;
    b.set_guess(hd, guess.hd)?;

    let gap_term = e_mv;
    b.set_objective(hammer_objective(objective, &e_hv, &e_bv, &e_ba, &gap_term)?);
    b.build()
}

struct ReferenceGuess {
    bd: Guess,
    bv: Guess,
    ba: Guess,
    hd: Guess,
}

/// Sample the reference and difference it for velocity and acceleration.
fn reference_guess(reference: &Expr, tf: f64, md: f64, params: &HammerParams) -> ReferenceGuess {
    let times: Vec<f64> = (0..GUESS_SAMPLES)
        .map(|k| k as f64 / (GUESS_SAMPLES - 1) as f64)
        .collect();
    let bd: Vec<f64> = times
        .iter()
        .map(|&s| {
            reference.eval(&Snapshot {
                time: s * tf,
                values: &[],
            })
        })
        .collect();
    let dt = tf / (GUESS_SAMPLES - 1) as f64;
    let bv = central_difference(&bd, dt);
    let ba: Vec<f64> = central_difference(&bv, dt)
        .into_iter()
        .map(|a| a.clamp(params.ba_min, params.ba_max))
        .collect();
    let hd = ba
        .iter()
        .map(|&a| quasi_static_offset(a, md, params.h_mass))
        .collect();
    let samples = |values: Vec<f64>| Guess::Samples {
        times: times.clone(),
        values,
    };
    ReferenceGuess {
        bd: samples(bd),
        bv: samples(bv),
        ba: samples(ba),
        hd: samples(hd),
    }
}

fn central_difference(values: &[f64], dt: f64) -> Vec<f64> {
    let n = values.len();
    (0..n)
        .map(|k| {
            let (lo, hi) = (k.saturating_sub(1), (k + 1).min(n - 1));
            (values[hi] - values[lo]) / ((hi - lo) as f64 * dt)
        })
        .collect()
}
