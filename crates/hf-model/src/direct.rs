//! Direct formulation: base and hammer positions with explicit derivative
//! chains, the magnet gap as a control.

use crate::constraint::Relation;
use crate::contact::{
    ProfileGuess, add_gap_constraints, hammer_accel_expr, hammer_objective, start_hammer_model,
};
use crate::error::ModelResult;
use crate::expr::Expr;
use crate::model::DynamicModel;
use crate::objective::ObjectiveKind;
use crate::params::HammerParams;
use crate::regime::{Formulation, Stiffness};
use crate::variable::{Bounds, Role};

/// Build the direct hammering model over `[0, tf]`.
///
/// Variables (declaration order): `bd, hd, md, bv, hv, mv, ba, ha`.
/// Every variable starts at rest except the gap, which starts at the upper
/// end of the regime's gap bounds. The base must stop at `path_length`.
pub fn direct_model(
    tf: f64,
    stiffness: Stiffness,
    params: &HammerParams,
    objective: ObjectiveKind,
) -> ModelResult<DynamicModel> {
    let mut b = start_hammer_model(Formulation::Direct, tf, stiffness, params)?;
    let tuning = params.direct;

    let bd = b.declare("bd", Role::State, params.bd_bounds())?;
    let hd = b.declare("hd", Role::State, Bounds::free())?;
    let md = b.declare("md", Role::Control, stiffness.gap_bounds(params))?;
    let bv = b.link_derivative(bd, "bv", params.bv_bounds())?;
    let hv = b.link_derivative(hd, "hv", Bounds::free())?;
    let mv = b.link_derivative(md, "mv", stiffness.gap_rate_bounds(tuning.gap_rate_limit))?;
    let ba = b.link_derivative(bv, "ba", params.ba_bounds())?;
    let ha = b.link_derivative(hv, "ha", Bounds::free())?;

    let [e_bd, e_hd, e_md, e_bv, e_hv, e_mv, e_ba, e_ha] =
        [bd, hd, md, bv, hv, mv, ba, ha].map(Expr::var);

    b.add_path(
        "hammer_dynamics",
        &e_ha - &hammer_accel_expr(&e_ba, &e_md, &e_hd, &e_hv, params.h_mass, tuning.damping),
        Relation::Eq,
    )?;
    add_gap_constraints(&mut b, &e_md, &e_hd)?;

    let md0 = stiffness.upper_gap(params);
    for id in [bd, hd, bv, hv, mv, ba, ha] {
        b.fix_initial(id, 0.0)?;
    }
    b.fix_initial(md, md0)?;

    b.add_final("base_stop", e_bv.clone(), Relation::Eq)?;
    b.add_final("base_travel", &e_bd - params.path_length, Relation::Eq)?;

    let guess = ProfileGuess::rest_to_rest(params.path_length, tf, md0, params);
    b.set_guess(bd, guess.samples(&guess.bd))?;
    b.set_guess(bv, guess.samples(&guess.bv))?;
    b.set_guess(ba, guess.samples(&guess.ba))?;
    b.set_guess(hd, guess.samples(&guess.hd))?;

    let gap_term = e_mv;
    b.set_objective(hammer_objective(objective, &e_hv, &e_bv, &e_ba, &gap_term)?);
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Scope;
    use crate::error::ModelError;

    fn build(stiffness: Stiffness) -> DynamicModel {
        direct_model(
            2.0,
            stiffness,
            &HammerParams::default(),
            ObjectiveKind::TerminalHammerVelocity,
        )
        .unwrap()
    }

    #[test]
    fn declares_the_derivative_chain() {
        let m = build(Stiffness::Variable);
        assert_eq!(
            m.variable_names(),
            vec!["bd", "hd", "md", "bv", "hv", "mv", "ba", "ha"]
        );
        let ba = m.var("ba").unwrap();
        assert_eq!(m.variable(ba).unwrap().role(), Role::SecondDerivative);
        assert_eq!(m.variable(ba).unwrap().derivative_of(), m.var("bv"));
        let mv = m.var("mv").unwrap();
        assert_eq!(m.variable(mv).unwrap().bounds(), Bounds::symmetric(0.15));
    }

    #[test]
    fn gap_starts_at_regime_upper_end() {
        let p = HammerParams::default();
        for s in Stiffness::ALL {
            let m = build(s);
            let md = m.var("md").unwrap();
            assert_eq!(m.initial_value(md), Some(s.upper_gap(&p)));
        }
    }

    #[test]
    fn initial_residuals_are_zero() {
        for s in Stiffness::ALL {
            let m = build(s);
            let residuals = m.initial_residuals();
            assert_eq!(residuals.len(), 8);
            assert!(residuals.iter().all(|(_, r)| *r == 0.0), "{residuals:?}");
        }
    }

    #[test]
    fn terminal_conditions_present() {
        let m = build(Stiffness::High);
        let finals: Vec<&str> = m
            .constraints()
            .iter()
            .filter(|c| c.scope() == Scope::Final)
            .map(|c| c.name())
            .collect();
        assert_eq!(finals, vec!["base_stop", "base_travel"]);
        assert!(m.constraint("hammer_dynamics").is_some());
        assert!(m.constraint("gap_upper").is_some());
    }

    #[test]
    fn rejects_bad_inputs() {
        let p = HammerParams::default();
        let obj = ObjectiveKind::TerminalHammerVelocity;
        assert!(matches!(
            direct_model(0.0, Stiffness::Low, &p, obj),
            Err(ModelError::InvalidBounds { .. })
        ));
        assert!(matches!(
            direct_model(-1.0, Stiffness::Low, &p, obj),
            Err(ModelError::InvalidBounds { .. })
        ));
        let crossed = HammerParams {
            w_min: 0.08,
            ..HammerParams::default()
        };
        assert!(matches!(
            direct_model(1.0, Stiffness::Variable, &crossed, obj),
            Err(ModelError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn metadata_records_regime() {
        let m = build(Stiffness::Low);
        assert_eq!(m.metadata().stiffness, Some(Stiffness::Low));
        assert_eq!(m.metadata().formulation, Some(Formulation::Direct));
        assert_eq!(m.metadata().parameter("h_mass"), Some(0.5));
        assert_eq!(m.name(), "direct_low");
    }
}
