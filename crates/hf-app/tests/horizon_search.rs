//! Horizon search against the real solver.

use hf_app::{
    AppError, Bracket, IndeterminatePolicy, SearchOptions, StudyConfig,
    find_minimal_feasible_duration,
};
use hf_model::{Formulation, NOMINAL_GAP, ObjectiveKind, Stiffness};
use hf_solver::AugmentedLagrangian;

#[test]
fn variable_stiffness_direct_search() {
    let config = StudyConfig::default();
    let params = config.params.clone();
    let builder = |tf: f64| {
        Formulation::Direct.build(
            tf,
            Stiffness::Variable,
            &params,
            ObjectiveKind::TerminalHammerVelocity,
        )
    };
    let options = SearchOptions {
        policy: IndeterminatePolicy::TreatAsInfeasible,
        ..SearchOptions::default()
    };
    let bracket = Bracket::new(0.0, 3.0, 1e-2).unwrap();
    let outcome = find_minimal_feasible_duration(
        &builder,
        bracket,
        config.n_nodes,
        &AugmentedLagrangian::default(),
        &options,
    )
    .unwrap();

    assert!(outcome.iterations <= 9, "{} iterations", outcome.iterations);
    assert!(outcome.tf_max - outcome.tf_min < 1e-2);
    assert!(outcome.result.is_optimal());
    assert_eq!(outcome.result.tf, outcome.tf_star);
    assert!(outcome.tf_star > 0.0 && outcome.tf_star <= 3.0);
    assert_eq!(outcome.trials[0].tf, 3.0);

    let traj = &outcome.result.trajectory;
    let hd = traj.column("hd").unwrap();
    let md = traj.column("md").unwrap();
    for (&h, &g) in hd.iter().zip(md) {
        assert!(h.abs() <= g - NOMINAL_GAP + 1e-6);
    }
    let bd_end = traj.final_value("bd").unwrap();
    assert!((bd_end - params.path_length).abs() < 1e-5);
}

#[test]
fn invalid_bracket_is_rejected_before_solving() {
    let err = Bracket::new(3.0, 1.0, 1e-2).unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[test]
fn every_trial_of_the_variable_search_is_decided() {
    let config = StudyConfig::default();
    let params = config.params.clone();
    let builder = |tf: f64| {
        Formulation::Direct.build(
            tf,
            Stiffness::Variable,
            &params,
            ObjectiveKind::TerminalHammerVelocity,
        )
    };
    // Abort turns any undecided trial into an error.
    let options = SearchOptions {
        policy: IndeterminatePolicy::Abort,
        ..SearchOptions::default()
    };
    let bracket = Bracket::new(0.0, 3.0, 1e-2).unwrap();
    let outcome = find_minimal_feasible_duration(
        &builder,
        bracket,
        config.n_nodes,
        &AugmentedLagrangian::default(),
        &options,
    )
    .unwrap();

    assert!(outcome.trials[0].status.is_optimal());
    assert!(outcome.trials.iter().any(|t| t.status.is_infeasible()));
    for t in &outcome.trials {
        assert!(t.status.is_optimal() || t.status.is_infeasible(), "{}", t.status);
    }
    assert!(outcome.tf_star > 0.3 && outcome.tf_star < 0.6, "{}", outcome.tf_star);
    // A longer horizon never does worse on terminal velocity.
    let at = |tf: f64| {
        outcome
            .trials
            .iter()
            .find(|t| t.tf == tf)
            .and_then(|t| t.objective)
            .unwrap()
    };
    assert!(at(3.0) >= at(1.5) - 1e-6);
}
