//! Objective monotonicity against the real solver.

use hf_app::{StudyConfig, monotonicity_probe};
use hf_model::{Formulation, Stiffness};
use hf_solver::TerminationStatus;

#[test]
fn low_stiffness_direct_improves_with_longer_horizons() {
    let config = StudyConfig {
        n_nodes: 50,
        ..StudyConfig::default()
    };
    let horizons = [2.5, 1.5, 2.0];
    let report =
        monotonicity_probe(&config, Formulation::Direct, Stiffness::Low, &horizons, 1e-6).unwrap();

    let tfs: Vec<f64> = report.points.iter().map(|p| p.tf).collect();
    assert_eq!(tfs, vec![1.5, 2.0, 2.5]);
    for point in &report.points {
        assert_eq!(point.status, TerminationStatus::Optimal, "tf {}", point.tf);
    }
    assert!(report.is_monotone(), "{:?}", report.violations);

    let hv: Vec<f64> = report.points.iter().filter_map(|p| p.objective).collect();
    assert_eq!(hv.len(), 3);
    assert!(hv.windows(2).all(|w| w[1] > w[0]), "{hv:?}");
}
