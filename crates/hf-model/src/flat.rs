//! Differentially-flat formulation: base velocity and hammer velocity are
//! polynomials in `t`, everything else follows algebraically.

use crate::constraint::Relation;
use crate::contact::{
    add_gap_constraints, flat_gap_closed_form, hammer_objective, spring_force_expr,
    start_hammer_model,
};
use crate::error::ModelResult;
use crate::expr::Expr;
use crate::model::DynamicModel;
use crate::objective::ObjectiveKind;
use crate::params::HammerParams;
use crate::regime::{Formulation, Stiffness};
use crate::variable::{Bounds, Guess, Role};

const GUESS_SAMPLES: usize = 41;

/// Build the flat model over `[0, tf]`.
///
/// Node variables `bd, bv, ba, hd, hv, ha, md` are tied to the coefficient
/// polynomials by path equalities; `a0..a2` and `b0..b3` are single columns.
/// The contact law is enforced in product form so it stays smooth at
/// `hd = 0`.
pub fn flat_model(
    tf: f64,
    stiffness: Stiffness,
    params: &HammerParams,
    objective: ObjectiveKind,
) -> ModelResult<DynamicModel> {
    let mut b = start_hammer_model(Formulation::Flat, tf, stiffness, params)?;

    let bd = b.declare("bd", Role::State, params.bd_bounds())?;
    let bv = b.declare("bv", Role::State, params.bv_bounds())?;
    let ba = b.declare("ba", Role::Control, params.ba_bounds())?;
    let hd = b.declare("hd", Role::State, Bounds::free())?;
    let hv = b.declare("hv", Role::State, Bounds::free())?;
    let ha = b.declare("ha", Role::Control, Bounds::free())?;
    let md = b.declare("md", Role::Control, stiffness.gap_bounds(params))?;
    let mut a = Vec::with_capacity(3);
    for k in 0..3 {
        a.push(Expr::var(b.declare(&format!("a{k}"), Role::Coefficient, Bounds::free())?));
    }
    let mut c = Vec::with_capacity(4);
    for k in 0..4 {
        c.push(Expr::var(b.declare(&format!("b{k}"), Role::Coefficient, Bounds::free())?));
    }

    let [e_bd, e_bv, e_ba, e_hd, e_hv, e_ha, e_md] = [bd, bv, ba, hd, hv, ha, md].map(Expr::var);
    let t = Expr::time;

    let poly_bv = &a[0] + &a[1] * t() + &a[2] * t().square();
    let poly_ba = &a[1] + 2.0 * &a[2] * t();
    let poly_bd = &a[0] * t() + &a[1] * t().square() / 2.0 + &a[2] * t().powi(3) / 3.0;
    let poly_hv =
        &c[0] + &c[1] * t() + &c[2] * t().square() / 2.0 + &c[3] * t().powi(3) / 3.0;
    let poly_ha = &c[1] + &c[2] * t() + &c[3] * t().square();
    let poly_hd = &c[0] * t()
        + &c[1] * t().square() / 2.0
        + &c[2] * t().powi(3) / 6.0
        + &c[3] * t().powi(4) / 12.0;

    b.add_path("poly_bd", &e_bd - &poly_bd, Relation::Eq)?;
    b.add_path("poly_bv", &e_bv - &poly_bv, Relation::Eq)?;
    b.add_path("poly_ba", &e_ba - &poly_ba, Relation::Eq)?;
    b.add_path("poly_hd", &e_hd - &poly_hd, Relation::Eq)?;
    b.add_path("poly_hv", &e_hv - &poly_hv, Relation::Eq)?;
    b.add_path("poly_ha", &e_ha - &poly_ha, Relation::Eq)?;

    let force = -(params.h_mass * (&e_ha + &e_ba) + params.flat_damping * &e_hv);
    b.add_path(
        "contact_law",
        spring_force_expr(&e_md, &e_hd) - force,
        Relation::Eq,
    )?;
    add_gap_constraints(&mut b, &e_md, &e_hd)?;

    let md0 = stiffness.midpoint_gap(params);
    for id in [bd, bv, ba, hd, hv, ha] {
        b.fix_initial(id, 0.0)?;
    }
    b.fix_initial(md, md0)?;

    b.add_final(
        "hammer_travel",
        &e_bd + &e_hd - params.path_length,
        Relation::Eq,
    )?;

    // Cubic base travel that starts at rest: bv = a2·t², bd = a2·t³/3.
    let a2 = 3.0 * params.path_length / tf.powi(3);
    let times: Vec<f64> = (0..GUESS_SAMPLES)
        .map(|k| k as f64 / (GUESS_SAMPLES - 1) as f64)
        .collect();
    let profile = |f: &dyn Fn(f64) -> f64| Guess::Samples {
        times: times.clone(),
        values: times.iter().map(|&s| f(s * tf)).collect(),
    };
    b.set_guess(bd, profile(&|time| a2 * time.powi(3) / 3.0))?;
    b.set_guess(bv, profile(&|time| (a2 * time * time).clamp(params.bv_min, params.bv_max)))?;
    b.set_guess(ba, profile(&|time| (2.0 * a2 * time).clamp(params.ba_min, params.ba_max)))?;
    if let Some(id) = b.var("a2") {
        b.set_guess(id, Guess::Constant(a2))?;
    }

    let gap_term = &e_md - md0;
    b.set_objective(hammer_objective(objective, &e_hv, &e_bv, &e_ba, &gap_term)?);
    b.build()
}

/// Gap implied at each node by the closed-form contact law.
///
/// `None` where the law is singular (`hd = 0`) or has no solution.
pub fn closed_form_gaps(
    h_mass: f64,
    damping: f64,
    ba: &[f64],
    ha: &[f64],
    hv: &[f64],
    hd: &[f64],
) -> Vec<Option<f64>> {
    ba.iter()
        .zip(ha)
        .zip(hv)
        .zip(hd)
        .map(|(((&ba, &ha), &hv), &hd)| {
            let force = -(h_mass * (ha + ba) + damping * hv);
            flat_gap_closed_form(force, hd)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::spring_force;
    use crate::expr::Snapshot;
    use approx::assert_relative_eq;

    fn build(stiffness: Stiffness) -> DynamicModel {
        flat_model(
            5.0,
            stiffness,
            &HammerParams::default(),
            Formulation::Flat.default_objective(),
        )
        .unwrap()
    }

    #[test]
    fn coefficients_are_time_invariant() {
        let m = build(Stiffness::Variable);
        let coeffs: Vec<&str> = m
            .variables()
            .iter()
            .filter(|v| !v.role().is_time_varying())
            .map(|v| v.name())
            .collect();
        assert_eq!(coeffs, vec!["a0", "a1", "a2", "b0", "b1", "b2", "b3"]);
    }

    #[test]
    fn initial_residuals_are_zero() {
        for s in Stiffness::ALL {
            let m = build(s);
            assert_eq!(m.initial_residuals().len(), 7);
            assert!(m.initial_residuals().iter().all(|(_, r)| *r == 0.0));
        }
    }

    #[test]
    fn contact_law_holds_at_rest() {
        // hd = ha = ba = hv = 0: both sides of the product form vanish.
        let m = build(Stiffness::Variable);
        let point = m.initial_point();
        let ctx = Snapshot {
            time: 0.0,
            values: &point,
        };
        let law = m.constraint("contact_law").unwrap();
        assert_eq!(law.body().eval(&ctx), 0.0);
    }

    #[test]
    fn polynomials_are_consistent() {
        // Pick coefficients, set node values from the polynomials, check rows.
        let m = build(Stiffness::Variable);
        let (a, c) = ([0.1, -0.2, 0.05], [0.3, 0.1, -0.4, 0.2]);
        let t = 1.3;
        let mut x = vec![0.0; m.variables().len()];
        let set = |x: &mut Vec<f64>, name: &str, v: f64| x[m.var(name).unwrap().index()] = v;
        for k in 0..3 {
            set(&mut x, &format!("a{k}"), a[k]);
        }
        for k in 0..4 {
            set(&mut x, &format!("b{k}"), c[k]);
        }
        set(&mut x, "bv", a[0] + a[1] * t + a[2] * t * t);
        set(&mut x, "ba", a[1] + 2.0 * a[2] * t);
        set(&mut x, "bd", a[0] * t + a[1] * t * t / 2.0 + a[2] * t.powi(3) / 3.0);
        set(&mut x, "hv", c[0] + c[1] * t + c[2] * t * t / 2.0 + c[3] * t.powi(3) / 3.0);
        set(&mut x, "ha", c[1] + c[2] * t + c[3] * t * t);
        set(
            &mut x,
            "hd",
            c[0] * t + c[1] * t * t / 2.0 + c[2] * t.powi(3) / 6.0 + c[3] * t.powi(4) / 12.0,
        );
        let ctx = Snapshot {
            time: t,
            values: &x,
        };
        for name in ["poly_bd", "poly_bv", "poly_ba", "poly_hd", "poly_hv", "poly_ha"] {
            let r = m.constraint(name).unwrap().body().eval(&ctx);
            assert!(r.abs() < 1e-12, "{name}: {r}");
        }
    }

    #[test]
    fn closed_form_gaps_match_product_form() {
        let (h_mass, damping) = (0.5, 1.0);
        let (md, hd, hv, ba) = (0.045, 0.002, 0.1, 0.3);
        // Choose ha so that the law holds exactly at md.
        let ha = -(spring_force(md, hd) + damping * hv) / h_mass - ba;
        let gaps = closed_form_gaps(h_mass, damping, &[ba], &[ha], &[hv], &[hd]);
        assert_relative_eq!(gaps[0].unwrap(), md, epsilon = 1e-10);
        let singular = closed_form_gaps(h_mass, damping, &[0.0], &[0.0], &[0.0], &[0.0]);
        assert_eq!(singular, vec![None]);
    }

    #[test]
    fn default_objective_weights_both_velocities() {
        let m = build(Stiffness::High);
        assert_eq!(
            m.objective().sense(),
            crate::objective::ObjectiveSense::Maximize
        );
        assert!(m.constraint("hammer_travel").is_some());
    }
}
