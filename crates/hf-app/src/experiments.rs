//! The named studies, each callable on its own from the CLI.

use crate::config::StudyConfig;
use crate::error::{AppError, AppResult};
use crate::persist::{RunLabels, save_record, save_solve, trajectory_samples};
use crate::probe::{MonotonicityReport, probe_monotonicity};
use crate::progress::SearchProgressEvent;
use crate::search::{Bracket, SearchOutcome, find_minimal_feasible_duration_with_progress};
use crate::sweep::{SweepMode, SweepReport, SweepRequest, sweep_regimes};
use hf_model::{CarParams, Formulation, HammerParams, ObjectiveKind, Stiffness, car_maneuver_model};
use hf_results::{RunStore, write_csv};
use hf_solver::{AlConfig, AugmentedLagrangian, SolveResult, solve};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const OPTIMIZE: &str = "dynamic_model_optimize";
pub const BINARY_SEARCH: &str = "dynamic_model_binary_search";
pub const FLAT: &str = "flat_model_solve";
pub const CAR: &str = "car_maneuver";

#[derive(Serialize)]
struct RegimeKey<'a> {
    formulation: Formulation,
    regime: Stiffness,
    tf: f64,
    n_nodes: usize,
    objective: ObjectiveKind,
    params: &'a HammerParams,
    solver: &'a AlConfig,
}

#[derive(Serialize)]
struct SearchKey<'a> {
    formulation: Formulation,
    regime: Stiffness,
    bracket: (f64, f64, f64),
    n_nodes: usize,
    objective: ObjectiveKind,
    params: &'a HammerParams,
    solver: &'a AlConfig,
}

#[derive(Serialize)]
struct CarKey<'a> {
    tf: f64,
    n_nodes: usize,
    params: &'a CarParams,
    solver: &'a AlConfig,
}

fn solver_for(config: &StudyConfig) -> AugmentedLagrangian {
    AugmentedLagrangian::new(config.solver.clone())
}

fn sweep_and_save(
    config: &StudyConfig,
    formulation: Formulation,
    mode: SweepMode,
    experiment: &str,
    store: Option<&RunStore>,
) -> AppResult<SweepReport> {
    let request = SweepRequest {
        formulation,
        regimes: config.stiffness.clone(),
        params: config.params.clone(),
        objective: config.objective_for(formulation),
        tf: config.tf,
        n_nodes: config.n_nodes,
        mode,
    };
    let report = sweep_regimes(&request, &solver_for(config));
    if let Some(store) = store {
        for record in report.records() {
            let key = RegimeKey {
                formulation,
                regime: record.regime,
                tf: request.tf,
                n_nodes: request.n_nodes,
                objective: request.objective,
                params: &request.params,
                solver: &config.solver,
            };
            save_record(store, &key, experiment, record)?;
        }
    }
    Ok(report)
}

/// Solve `formulation` at the configured horizon for every configured
/// stiffness regime.
pub fn dynamic_model_optimize(
    config: &StudyConfig,
    formulation: Formulation,
    mode: SweepMode,
    store: Option<&RunStore>,
) -> AppResult<SweepReport> {
    sweep_and_save(config, formulation, mode, OPTIMIZE, store)
}

/// The differentially-flat formulation for every configured regime.
pub fn flat_model_solve(
    config: &StudyConfig,
    mode: SweepMode,
    store: Option<&RunStore>,
) -> AppResult<SweepReport> {
    sweep_and_save(config, Formulation::Flat, mode, FLAT, store)
}

/// Shortest feasible maneuver for one formulation and regime.
pub fn dynamic_model_binary_search(
    config: &StudyConfig,
    formulation: Formulation,
    stiffness: Stiffness,
    bracket: Bracket,
    store: Option<&RunStore>,
    progress_cb: Option<&mut dyn FnMut(SearchProgressEvent)>,
) -> AppResult<SearchOutcome<SolveResult>> {
    let objective = config.objective_for(formulation);
    let params = &config.params;
    let builder = |tf: f64| formulation.build(tf, stiffness, params, objective);
    let outcome = find_minimal_feasible_duration_with_progress(
        &builder,
        bracket,
        config.n_nodes,
        &solver_for(config),
        &config.search.options(),
        progress_cb,
    )?;
    info!(
        formulation = %formulation,
        regime = %stiffness,
        tf_star = outcome.tf_star,
        iterations = outcome.iterations,
        "minimal feasible duration"
    );

    if let Some(store) = store {
        let key = SearchKey {
            formulation,
            regime: stiffness,
            bracket: (bracket.tf_min, bracket.tf_max, bracket.tol),
            n_nodes: config.n_nodes,
            objective,
            params,
            solver: &config.solver,
        };
        let labels = RunLabels {
            experiment: BINARY_SEARCH,
            regime: Some(stiffness),
            formulation: Some(formulation),
        };
        save_solve(store, &key, labels, &outcome.result)?;
    }
    Ok(outcome)
}

/// Lane change with the kinematic bicycle model.
pub fn car_maneuver(config: &StudyConfig, store: Option<&RunStore>) -> AppResult<SolveResult> {
    let car = &config.car;
    let model = car_maneuver_model(car.tf, &car.params)?;
    let result = solve(&model, car.n_nodes, &solver_for(config))?;
    if let Some(store) = store {
        let key = CarKey {
            tf: car.tf,
            n_nodes: car.n_nodes,
            params: &car.params,
            solver: &config.solver,
        };
        let labels = RunLabels {
            experiment: CAR,
            regime: None,
            formulation: None,
        };
        save_solve(store, &key, labels, &result)?;
    }
    Ok(result)
}

/// Solve at each of `horizons` and flag objective inversions.
pub fn monotonicity_probe(
    config: &StudyConfig,
    formulation: Formulation,
    stiffness: Stiffness,
    horizons: &[f64],
    tol: f64,
) -> AppResult<MonotonicityReport> {
    if horizons.is_empty() {
        return Err(AppError::InvalidInput("no horizons to probe".into()));
    }
    let objective = config.objective_for(formulation);
    let params = &config.params;
    let builder = |tf: f64| formulation.build(tf, stiffness, params, objective);
    probe_monotonicity(&builder, horizons, config.n_nodes, &solver_for(config), tol)
}

/// Write one stored run as CSV.
pub fn export_run(store: &RunStore, run_id: &str, path: &Path) -> AppResult<()> {
    let manifest = store.load_manifest(run_id)?;
    let samples = store.load_trajectory(run_id)?;
    write_csv(path, &manifest.variables, &samples)?;
    Ok(())
}

/// CSV of every optimal run (optionally of one experiment) into `out_dir`,
/// named `<experiment>[_<formulation>][_<regime>]_<id prefix>.csv`.
pub fn export_optimal_trajectories(
    store: &RunStore,
    experiment: Option<&str>,
    out_dir: &Path,
) -> AppResult<Vec<PathBuf>> {
    let mut written = Vec::new();
    for manifest in store.list_runs(experiment)? {
        if manifest.status != "optimal" {
            continue;
        }
        let mut name = manifest.experiment.clone();
        for label in [&manifest.formulation, &manifest.regime].into_iter().flatten() {
            name.push('_');
            name.push_str(label);
        }
        let prefix: String = manifest.run_id.chars().take(8).collect();
        let path = out_dir.join(format!("{name}_{prefix}.csv"));
        export_run(store, &manifest.run_id, &path)?;
        written.push(path);
    }
    info!(count = written.len(), dir = %out_dir.display(), "exported optimal trajectories");
    Ok(written)
}

/// CSV text for an in-memory solve.
pub fn trajectory_csv(result: &SolveResult) -> AppResult<String> {
    let samples = trajectory_samples(&result.trajectory);
    Ok(hf_results::to_csv_string(result.trajectory.names(), &samples)?)
}
