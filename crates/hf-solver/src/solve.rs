//! Model-level solve: transcribe, run an [`NlpSolver`], package the result.

use crate::error::SolverResult;
use crate::nlp::NlpSolver;
use crate::status::TerminationStatus;
use crate::trajectory::Trajectory;
use crate::transcription::TranscribedNlp;
use hf_model::DynamicModel;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Outcome of one solve attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    pub status: TerminationStatus,
    /// Objective in the model's own sense; `Some` only when optimal.
    pub objective_value: Option<f64>,
    /// Largest row or bound violation of the returned trajectory.
    pub constraint_violation: f64,
    pub iterations: usize,
    pub wall_time_s: f64,
    pub solver: String,
    pub n_nodes: usize,
    pub tf: f64,
    /// Last iterate; only guaranteed feasible when `status` is optimal.
    pub trajectory: Trajectory,
}

impl SolveResult {
    pub fn is_optimal(&self) -> bool {
        self.status.is_optimal()
    }
}

/// Solve `model` on `n_nodes` uniform intervals.
pub fn solve(
    model: &DynamicModel,
    n_nodes: usize,
    solver: &dyn NlpSolver,
) -> SolverResult<SolveResult> {
    solve_with_guess(model, n_nodes, solver, None)
}

/// [`solve`] with the starting point taken from `guess` where it names the
/// same variables.
pub fn solve_with_guess(
    model: &DynamicModel,
    n_nodes: usize,
    solver: &dyn NlpSolver,
    guess: Option<&Trajectory>,
) -> SolverResult<SolveResult> {
    let mut nlp = TranscribedNlp::new(model, n_nodes)?;
    if let Some(guess) = guess {
        nlp.warm_start(guess);
    }
    debug!(
        model = model.name(),
        tf = model.tf(),
        n_nodes,
        warm = guess.is_some(),
        "transcribed model"
    );

    let outcome = solver.solve(&nlp);
    let objective_value = outcome
        .status
        .is_optimal()
        .then(|| nlp.model_objective(&outcome.x));
    let result = SolveResult {
        objective_value,
        constraint_violation: nlp.violation(&outcome.x),
        iterations: outcome.iterations,
        wall_time_s: outcome.wall_time_s,
        solver: solver.name().to_string(),
        n_nodes,
        tf: model.tf(),
        trajectory: nlp.trajectory(&outcome.x)?,
        status: outcome.status,
    };
    info!(
        model = model.name(),
        tf = result.tf,
        status = %result.status,
        objective = ?result.objective_value,
        violation = result.constraint_violation,
        iterations = result.iterations,
        "solve finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augmented_lagrangian::AugmentedLagrangian;
    use crate::nlp::{NlpOutcome, NlpProblem};
    use hf_model::{Bounds, Expr, ModelBuilder, Objective, Relation, Role};

    /// Always reports the starting point with a fixed verdict.
    struct Stub(TerminationStatus);

    impl NlpSolver for Stub {
        fn name(&self) -> &str {
            "stub"
        }

        fn solve(&self, nlp: &dyn NlpProblem) -> NlpOutcome {
            NlpOutcome {
                status: self.0.clone(),
                x: nlp.initial_point(),
                objective: 0.0,
                violation: 0.0,
                iterations: 1,
                outer_iterations: 1,
                wall_time_s: 0.0,
            }
        }
    }

    fn sprint(tf: f64) -> DynamicModel {
        let mut b = ModelBuilder::new("sprint", tf).unwrap();
        let x = b.declare("x", Role::State, Bounds::free()).unwrap();
        let v = b.link_derivative(x, "v", Bounds::symmetric(1.0)).unwrap();
        b.add_final("reach", Expr::var(x) - 0.5, Relation::Ge).unwrap();
        b.fix_initial(x, 0.0).unwrap();
        b.set_objective(Objective::minimize_integral(Expr::var(v).square()));
        b.build().unwrap()
    }

    #[test]
    fn objective_only_reported_when_optimal() {
        let m = sprint(1.0);
        let r = solve(&m, 4, &Stub(TerminationStatus::Other("stub".into()))).unwrap();
        assert_eq!(r.objective_value, None);
        assert_eq!(r.trajectory.len(), 5);
        assert_eq!(r.solver, "stub");
        let r = solve(&m, 4, &Stub(TerminationStatus::Optimal)).unwrap();
        assert_eq!(r.objective_value, Some(0.0));
    }

    #[test]
    fn minimum_effort_sprint() {
        // Reach x = 0.5 in 1 s with least trapezoidal ∫v². Node 0 carries
        // half weight, so v0 = 2a and the nine interior speeds equal a.
        let m = sprint(1.0);
        let r = solve(&m, 10, &AugmentedLagrangian::default()).unwrap();
        assert!(r.is_optimal(), "{}", r.status);
        assert!(r.constraint_violation <= 1e-6);
        let a = 0.5 / 1.1;
        let v = r.trajectory.column("v").unwrap();
        assert!((v[0] - 2.0 * a).abs() < 1e-4, "v0 = {}", v[0]);
        for &vi in &v[1..10] {
            assert!((vi - a).abs() < 1e-4, "v = {vi}");
        }
        let x_end = r.trajectory.final_value("x").unwrap();
        assert!((x_end - 0.5).abs() < 1e-5);
        let objective = r.objective_value.unwrap();
        assert!((objective - 0.25 / 1.1).abs() < 1e-5);
    }

    #[test]
    fn zero_nodes_is_an_error() {
        assert!(solve(&sprint(1.0), 0, &Stub(TerminationStatus::Optimal)).is_err());
    }
}
