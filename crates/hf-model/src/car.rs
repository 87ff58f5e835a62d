//! Kinematic bicycle maneuver: a lateral lane change from rest to rest.

use crate::constraint::Relation;
use crate::error::{ModelError, ModelResult};
use crate::expr::Expr;
use crate::model::{DynamicModel, ModelBuilder, ModelMetadata};
use crate::objective::Objective;
use crate::params::CarParams;
use crate::variable::{Bounds, Guess, Role};
use std::f64::consts::{FRAC_PI_2, PI};

const GUESS_SAMPLES: usize = 41;

/// Build the car maneuver over `[0, tf]`.
///
/// States `x, y, theta, u, phi` with derivatives `dx, dy, dtheta, du, dphi`;
/// controls `accel, steer_rate`. Everything starts at zero and must return
/// to zero except `y`, which ends at `target_y`. Minimizes
/// `∫ w·φ² + accel² + steer_rate² dt`.
pub fn car_maneuver_model(tf: f64, params: &CarParams) -> ModelResult<DynamicModel> {
    if !(params.wheelbase.is_finite() && params.wheelbase > 0.0) {
        return Err(ModelError::InvalidParameter {
            what: format!("wheelbase must be positive, got {}", params.wheelbase),
        });
    }
    if !params.target_y.is_finite() || params.target_y < 0.0 {
        return Err(ModelError::InvalidParameter {
            what: format!("target_y must be a non-negative distance, got {}", params.target_y),
        });
    }
    let mut b = ModelBuilder::new("car_maneuver", tf)?;
    b.set_metadata(ModelMetadata {
        formulation: None,
        stiffness: None,
        parameters: vec![
            ("wheelbase".to_string(), params.wheelbase),
            ("target_y".to_string(), params.target_y),
        ],
    });

    let x = b.declare("x", Role::State, Bounds::at_least(0.0))?;
    let y = b.declare("y", Role::State, Bounds::at_least(0.0))?;
    let theta = b.declare("theta", Role::State, Bounds::free())?;
    let u = b.declare("u", Role::State, Bounds::free())?;
    let phi = b.declare("phi", Role::State, Bounds::symmetric(params.steer_limit))?;
    let dx = b.link_derivative(x, "dx", Bounds::free())?;
    let dy = b.link_derivative(y, "dy", Bounds::free())?;
    let dtheta = b.link_derivative(theta, "dtheta", Bounds::free())?;
    let du = b.link_derivative(u, "du", Bounds::free())?;
    let dphi = b.link_derivative(phi, "dphi", Bounds::free())?;
    let accel = b.declare("accel", Role::Control, Bounds::free())?;
    let steer_rate = b.declare(
        "steer_rate",
        Role::Control,
        Bounds::symmetric(params.steer_rate_limit),
    )?;

    let [e_theta, e_u, e_phi, e_dx, e_dy, e_dtheta, e_du, e_dphi, e_accel, e_steer] =
        [theta, u, phi, dx, dy, dtheta, du, dphi, accel, steer_rate].map(Expr::var);

    b.add_path("ode_x", &e_dx - &e_u * e_theta.clone().cos(), Relation::Eq)?;
    b.add_path("ode_y", &e_dy - &e_u * e_theta.clone().sin(), Relation::Eq)?;
    b.add_path(
        "ode_theta",
        &e_dtheta - &e_u * e_phi.clone().tan() / params.wheelbase,
        Relation::Eq,
    )?;
    b.add_path("ode_u", &e_du - &e_accel, Relation::Eq)?;
    b.add_path("ode_phi", &e_dphi - &e_steer, Relation::Eq)?;

    let targets = [
        (x, 0.0),
        (y, params.target_y),
        (theta, 0.0),
        (u, 0.0),
        (phi, 0.0),
        (accel, 0.0),
        (steer_rate, 0.0),
    ];
    for (id, _) in targets {
        b.fix_initial(id, 0.0)?;
    }
    for (id, target) in targets {
        let name = b.variable(id).map(|v| v.name().to_string()).unwrap_or_default();
        b.add_final(&format!("{name}_final"), Expr::var(id) - target, Relation::Eq)?;
    }

    // Heading swings to +y and back while the car drives a smooth
    // rest-to-rest lateral profile. An all-zero heading or speed is a
    // stationary point of `u·sin θ`.
    let times: Vec<f64> = (0..GUESS_SAMPLES)
        .map(|k| k as f64 / (GUESS_SAMPLES - 1) as f64)
        .collect();
    let profile = |f: &dyn Fn(f64) -> f64| Guess::Samples {
        times: times.clone(),
        values: times.iter().map(|&s| f(s)).collect(),
    };
    let target = params.target_y;
    b.set_guess(y, profile(&|s| target * s * s * (3.0 - 2.0 * s)))?;
    b.set_guess(u, profile(&|s| 6.0 * target * s * (1.0 - s) / tf))?;
    b.set_guess(theta, profile(&|s| FRAC_PI_2 * (PI * s).sin().powi(2)))?;

    b.set_objective(Objective::minimize_integral(
        params.steer_weight * e_phi.square() + e_accel.square() + e_steer.square(),
    ));
    b.build()
}
