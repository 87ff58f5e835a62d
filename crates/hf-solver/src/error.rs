//! Error types for transcription and solving.
//!
//! Solver verdicts (optimal, infeasible, ...) are values, not errors; these
//! variants cover malformed inputs only.

use hf_core::HfError;
use hf_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Problem setup error: {what}")]
    ProblemSetup { what: String },

    #[error("Dimension mismatch in {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Numeric error: {0}")]
    Numeric(#[from] HfError),
}

pub type SolverResult<T> = Result<T, SolverError>;

impl From<SolverError> for HfError {
    fn from(e: SolverError) -> Self {
        match e {
            SolverError::ProblemSetup { .. } => HfError::InvalidArg {
                what: "problem setup",
            },
            SolverError::DimensionMismatch { .. } => HfError::InvalidArg {
                what: "dimension mismatch",
            },
            SolverError::Model(_) => HfError::InvalidArg { what: "model" },
            SolverError::Numeric(inner) => inner,
        }
    }
}
