//! Application service layer for hammerflow.
//!
//! Ties the model builders, the solver and the run store together into the
//! named experiments used by the CLI: regime sweeps, the horizon search,
//! the monotonicity probe and trajectory export.

pub mod config;
pub mod error;
pub mod experiments;
pub mod persist;
pub mod probe;
pub mod progress;
pub mod search;
pub mod sweep;

pub use config::{CarConfig, SearchConfig, StudyConfig};
pub use error::{AppError, AppResult};
pub use experiments::{
    car_maneuver, dynamic_model_binary_search, dynamic_model_optimize, export_optimal_trajectories,
    export_run, flat_model_solve, monotonicity_probe, trajectory_csv,
};
pub use persist::{RunLabels, save_record, save_solve, trajectory_samples};
pub use probe::{Inversion, MonotonicityReport, ProbePoint, find_inversions, probe_monotonicity};
pub use progress::{SearchProgressEvent, SearchStage};
pub use search::{
    Bracket, IndeterminatePolicy, SearchOptions, SearchOutcome, SearchTrial, Trial, bisect_with,
    bisect_with_progress, find_minimal_feasible_duration,
    find_minimal_feasible_duration_with_progress,
};
pub use sweep::{RegimeOutcome, RegimeRecord, SweepMode, SweepReport, SweepRequest, sweep_regimes};
