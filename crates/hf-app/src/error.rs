//! Error types for the hf-app service layer.

use hf_solver::TerminationStatus;
use std::path::PathBuf;

/// Application error type wrapping the backend crates, shared by every
/// experiment and the CLI.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read configuration file: {path}")]
    ConfigFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Results error: {0}")]
    Results(String),

    #[error("Upper horizon tf={tf} is not feasible ({status}); widen the search interval")]
    UpperBoundInfeasible { tf: f64, status: TerminationStatus },

    #[error("Upper horizon tf={tf} did not solve to optimality ({status}); no feasible horizon is known")]
    UpperBoundNotOptimal { tf: f64, status: TerminationStatus },

    #[error(
        "Solver could not decide at tf={tf} ({status}); search interval was [{tf_min}, {tf_max}]"
    )]
    Indeterminate {
        tf: f64,
        status: TerminationStatus,
        tf_min: f64,
        tf_max: f64,
    },

    #[error("Search did not converge after {iterations} iterations; last interval [{tf_min}, {tf_max}]")]
    SearchNotConverged {
        tf_min: f64,
        tf_max: f64,
        iterations: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for hf-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<hf_model::ModelError> for AppError {
    fn from(err: hf_model::ModelError) -> Self {
        AppError::Model(err.to_string())
    }
}

impl From<hf_solver::SolverError> for AppError {
    fn from(err: hf_solver::SolverError) -> Self {
        AppError::Solver(err.to_string())
    }
}

impl From<hf_results::ResultsError> for AppError {
    fn from(err: hf_results::ResultsError) -> Self {
        AppError::Results(err.to_string())
    }
}
