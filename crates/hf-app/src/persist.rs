//! Writing solves to a [`RunStore`].

use crate::error::AppResult;
use crate::sweep::RegimeRecord;
use hf_model::{Formulation, Stiffness};
use hf_results::{RunManifest, RunStore, TrajectorySample, compute_run_id, timestamp_now};
use hf_solver::{SolveResult, TerminationStatus, Trajectory};
use serde::Serialize;
use tracing::debug;

/// Mixed into every run id so a solver change never reuses old runs.
pub const SOLVER_VERSION: &str = concat!("hammerflow-", env!("CARGO_PKG_VERSION"));

/// How a run is labelled in its manifest.
#[derive(Clone, Copy, Debug)]
pub struct RunLabels<'a> {
    pub experiment: &'a str,
    pub regime: Option<Stiffness>,
    pub formulation: Option<Formulation>,
}

/// The parts of a solve that end up on disk.
struct Persisted<'a> {
    tf: f64,
    n_nodes: usize,
    status: &'a TerminationStatus,
    objective: Option<f64>,
    solver: &'a str,
    trajectory: &'a Trajectory,
}

impl<'a> From<&'a SolveResult> for Persisted<'a> {
    fn from(r: &'a SolveResult) -> Self {
        Self {
            tf: r.tf,
            n_nodes: r.n_nodes,
            status: &r.status,
            objective: r.objective_value,
            solver: &r.solver,
            trajectory: &r.trajectory,
        }
    }
}

impl<'a> From<&'a RegimeRecord> for Persisted<'a> {
    fn from(r: &'a RegimeRecord) -> Self {
        Self {
            tf: r.tf,
            n_nodes: r.n_nodes,
            status: &r.termination_status,
            objective: r.objective_value,
            solver: &r.solver,
            trajectory: &r.trajectory,
        }
    }
}

pub fn trajectory_samples(trajectory: &Trajectory) -> Vec<TrajectorySample> {
    trajectory
        .rows()
        .map(|(time, values)| TrajectorySample {
            time,
            values: values.into_iter().map(|(_, v)| v).collect(),
        })
        .collect()
}

fn save(
    store: &RunStore,
    request: &impl Serialize,
    labels: RunLabels<'_>,
    run: Persisted<'_>,
) -> AppResult<RunManifest> {
    let run_id = compute_run_id(request, labels.experiment, SOLVER_VERSION);
    if store.has_run(&run_id) {
        debug!(run_id = %run_id, "replacing stored run");
    }
    let manifest = RunManifest {
        run_id,
        experiment: labels.experiment.to_string(),
        timestamp: timestamp_now(),
        regime: labels.regime.map(|s| s.tag().to_string()),
        formulation: labels.formulation.map(|f| f.tag().to_string()),
        tf: run.tf,
        n_nodes: run.n_nodes,
        status: run.status.label().to_string(),
        objective: run.objective,
        solver: run.solver.to_string(),
        variables: run.trajectory.names().to_vec(),
    };
    store.save_run(&manifest, &trajectory_samples(run.trajectory))?;
    debug!(run_id = %manifest.run_id, experiment = labels.experiment, "saved run");
    Ok(manifest)
}

/// Persist a single solve. `request` is whatever uniquely describes it.
pub fn save_solve(
    store: &RunStore,
    request: &impl Serialize,
    labels: RunLabels<'_>,
    result: &SolveResult,
) -> AppResult<RunManifest> {
    save(store, request, labels, result.into())
}

/// Persist one regime of a sweep.
pub fn save_record(
    store: &RunStore,
    request: &impl Serialize,
    experiment: &str,
    record: &RegimeRecord,
) -> AppResult<RunManifest> {
    let labels = RunLabels {
        experiment,
        regime: Some(record.regime),
        formulation: Some(record.formulation),
    };
    save(store, request, labels, record.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_follow_columns() {
        let t = Trajectory::from_columns(
            vec!["x".into(), "v".into()],
            vec![0.0, 0.5],
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
        )
        .unwrap();
        let samples = trajectory_samples(&t);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].time, 0.5);
        assert_eq!(samples[1].values, vec![2.0, 4.0]);
    }
}
