//! Objective monotonicity across horizons.
//!
//! A longer maneuver can always replay a shorter one, so among optimal
//! solves the objective should never get worse as `tf` grows. Inversions
//! point at local optima or a poorly converged solve.

use crate::error::AppResult;
use hf_model::{DynamicModel, ModelResult, ObjectiveSense};
use hf_solver::{NlpSolver, TerminationStatus, solve};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbePoint {
    pub tf: f64,
    pub status: TerminationStatus,
    pub objective: Option<f64>,
}

/// `earlier` is the shorter horizon, yet has the better objective.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inversion {
    pub earlier: ProbePoint,
    pub later: ProbePoint,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonotonicityReport {
    /// Sorted by `tf`.
    pub points: Vec<ProbePoint>,
    pub violations: Vec<Inversion>,
}

impl MonotonicityReport {
    pub fn is_monotone(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Every pair `a.tf < b.tf`, both optimal, where `a` beats `b` by more
/// than `tol` under `sense`.
pub fn find_inversions(points: &[ProbePoint], sense: ObjectiveSense, tol: f64) -> Vec<Inversion> {
    let mut sorted: Vec<&ProbePoint> = points.iter().collect();
    sorted.sort_by(|a, b| a.tf.total_cmp(&b.tf));
    let mut out = Vec::new();
    for (i, a) in sorted.iter().enumerate() {
        let Some(fa) = a.objective.filter(|_| a.status.is_optimal()) else {
            continue;
        };
        for b in &sorted[i + 1..] {
            let Some(fb) = b.objective.filter(|_| b.status.is_optimal()) else {
                continue;
            };
            if a.tf == b.tf {
                continue;
            }
            let inverted = match sense {
                ObjectiveSense::Maximize => fa > fb + tol,
                ObjectiveSense::Minimize => fa < fb - tol,
            };
            if inverted {
                out.push(Inversion {
                    earlier: (*a).clone(),
                    later: (*b).clone(),
                });
            }
        }
    }
    out
}

/// Solve at each horizon (in parallel) and report inversions.
pub fn probe_monotonicity(
    builder: &(dyn Fn(f64) -> ModelResult<DynamicModel> + Sync),
    horizons: &[f64],
    n_nodes: usize,
    solver: &dyn NlpSolver,
    tol: f64,
) -> AppResult<MonotonicityReport> {
    let solved: Vec<AppResult<(ProbePoint, ObjectiveSense)>> = horizons
        .par_iter()
        .map(|&tf| -> AppResult<(ProbePoint, ObjectiveSense)> {
            let model = builder(tf)?;
            let result = solve(&model, n_nodes, solver)?;
            Ok((
                ProbePoint {
                    tf,
                    status: result.status,
                    objective: result.objective_value,
                },
                model.objective().sense(),
            ))
        })
        .collect();

    let mut points = Vec::with_capacity(solved.len());
    let mut sense = ObjectiveSense::Maximize;
    for item in solved {
        let (point, s) = item?;
        sense = s;
        points.push(point);
    }
    points.sort_by(|a, b| a.tf.total_cmp(&b.tf));
    let violations = find_inversions(&points, sense, tol);
    for v in &violations {
        warn!(
            tf_a = v.earlier.tf,
            tf_b = v.later.tf,
            objective_a = ?v.earlier.objective,
            objective_b = ?v.later.objective,
            "objective not monotone in tf"
        );
    }
    Ok(MonotonicityReport { points, violations })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(tf: f64, objective: Option<f64>) -> ProbePoint {
        ProbePoint {
            tf,
            status: if objective.is_some() {
                TerminationStatus::Optimal
            } else {
                TerminationStatus::Infeasible
            },
            objective,
        }
    }

    #[test]
    fn increasing_objective_is_clean() {
        let pts = [point(1.0, Some(0.1)), point(2.0, Some(0.2)), point(3.0, Some(0.2))];
        assert!(find_inversions(&pts, ObjectiveSense::Maximize, 1e-6).is_empty());
    }

    #[test]
    fn drop_is_flagged_regardless_of_input_order() {
        let pts = [point(3.0, Some(0.3)), point(1.0, Some(0.5)), point(2.0, Some(0.6))];
        let inv = find_inversions(&pts, ObjectiveSense::Maximize, 1e-6);
        let pairs: Vec<_> = inv.iter().map(|i| (i.earlier.tf, i.later.tf)).collect();
        assert_eq!(pairs, vec![(1.0, 3.0), (2.0, 3.0)]);
    }

    #[test]
    fn tolerance_absorbs_noise() {
        let pts = [point(1.0, Some(0.5)), point(2.0, Some(0.5 - 1e-9))];
        assert!(find_inversions(&pts, ObjectiveSense::Maximize, 1e-6).is_empty());
    }

    #[test]
    fn non_optimal_points_are_ignored() {
        let mut timed_out = point(2.0, Some(0.0));
        timed_out.status = TerminationStatus::TimeLimit;
        let pts = [point(1.0, Some(0.5)), timed_out, point(3.0, None)];
        assert!(find_inversions(&pts, ObjectiveSense::Maximize, 1e-6).is_empty());
    }

    #[test]
    fn minimization_flags_rising_cost() {
        let pts = [point(1.0, Some(2.0)), point(2.0, Some(3.0))];
        assert_eq!(find_inversions(&pts, ObjectiveSense::Minimize, 1e-6).len(), 1);
        assert!(find_inversions(&pts, ObjectiveSense::Maximize, 1e-6).is_empty());
    }
}
