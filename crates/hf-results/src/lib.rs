//! hf-results: run manifests, trajectory storage and CSV export.

pub mod csv;
pub mod hash;
pub mod store;
pub mod types;

pub use csv::{to_csv_string, write_csv};
pub use hash::compute_run_id;
pub use store::RunStore;
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Malformed trajectory: {message}")]
    Malformed { message: String },
}
