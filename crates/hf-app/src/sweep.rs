//! Solve one formulation under several stiffness regimes.

use crate::error::{AppError, AppResult};
use hf_model::{Formulation, HammerParams, ObjectiveKind, ObjectiveSense, Stiffness};
use hf_solver::{NlpSolver, SolveResult, TerminationStatus, Trajectory, solve};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    #[default]
    Sequential,
    /// One rayon task per regime.
    Parallel,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SweepRequest {
    pub formulation: Formulation,
    pub regimes: Vec<Stiffness>,
    pub params: HammerParams,
    pub objective: ObjectiveKind,
    pub tf: f64,
    pub n_nodes: usize,
    pub mode: SweepMode,
}

/// Solved regime as kept in memory and persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegimeRecord {
    pub regime: Stiffness,
    pub formulation: Formulation,
    pub tf: f64,
    pub n_nodes: usize,
    pub objective_value: Option<f64>,
    pub termination_status: TerminationStatus,
    pub constraint_violation: f64,
    pub iterations: usize,
    pub wall_time_s: f64,
    pub solver: String,
    pub trajectory: Trajectory,
}

impl RegimeRecord {
    pub fn from_result(regime: Stiffness, formulation: Formulation, result: SolveResult) -> Self {
        Self {
            regime,
            formulation,
            tf: result.tf,
            n_nodes: result.n_nodes,
            objective_value: result.objective_value,
            termination_status: result.status,
            constraint_violation: result.constraint_violation,
            iterations: result.iterations,
            wall_time_s: result.wall_time_s,
            solver: result.solver,
            trajectory: result.trajectory,
        }
    }
}

#[derive(Debug)]
pub struct RegimeOutcome {
    pub regime: Stiffness,
    pub result: Result<RegimeRecord, AppError>,
}

#[derive(Debug)]
pub struct SweepReport {
    pub formulation: Formulation,
    pub objective: ObjectiveKind,
    /// One entry per requested regime, in request order.
    pub outcomes: Vec<RegimeOutcome>,
}

impl SweepReport {
    pub fn records(&self) -> impl Iterator<Item = &RegimeRecord> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (Stiffness, &AppError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.regime, e)))
    }

    /// Optimal record with the best objective.
    pub fn best(&self) -> Option<&RegimeRecord> {
        let sense = self.objective.sense();
        self.records()
            .filter(|r| r.termination_status.is_optimal())
            .filter_map(|r| r.objective_value.map(|v| (r, v)))
            .max_by(|(_, a), (_, b)| match sense {
                ObjectiveSense::Maximize => a.total_cmp(b),
                ObjectiveSense::Minimize => b.total_cmp(a),
            })
            .map(|(r, _)| r)
    }
}

fn solve_regime(
    request: &SweepRequest,
    regime: Stiffness,
    solver: &dyn NlpSolver,
) -> AppResult<RegimeRecord> {
    let model = request
        .formulation
        .build(request.tf, regime, &request.params, request.objective)?;
    let result = solve(&model, request.n_nodes, solver)?;
    Ok(RegimeRecord::from_result(regime, request.formulation, result))
}

/// Build and solve every regime independently. A failing regime is
/// reported in its own outcome and never affects the others.
pub fn sweep_regimes(request: &SweepRequest, solver: &dyn NlpSolver) -> SweepReport {
    let run = |&regime: &Stiffness| RegimeOutcome {
        regime,
        result: solve_regime(request, regime, solver),
    };
    let outcomes: Vec<RegimeOutcome> = match request.mode {
        SweepMode::Sequential => request.regimes.iter().map(run).collect(),
        SweepMode::Parallel => request.regimes.par_iter().map(run).collect(),
    };

    for outcome in &outcomes {
        match &outcome.result {
            Ok(record) => info!(
                formulation = %request.formulation,
                regime = %outcome.regime,
                status = %record.termination_status,
                objective = ?record.objective_value,
                "regime solved"
            ),
            Err(err) => warn!(
                formulation = %request.formulation,
                regime = %outcome.regime,
                error = %err,
                "regime failed"
            ),
        }
    }
    SweepReport {
        formulation: request.formulation,
        objective: request.objective,
        outcomes,
    }
}
