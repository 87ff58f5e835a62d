//! Transcription and NLP solving for hammerflow models.
//!
//! A [`DynamicModel`](hf_model::DynamicModel) is discretized with forward
//! differences on a uniform grid ([`TranscribedNlp`]) and handed to an
//! [`NlpSolver`]. Two solvers are bundled, both factoring sparse Newton
//! systems with Cholesky: a primal-dual [`InteriorPoint`] method and a
//! bound-constrained [`AugmentedLagrangian`] method that runs the interior
//! phase first.

pub mod augmented_lagrangian;
pub mod error;
#[cfg(test)]
mod fixtures;
pub mod interior_point;
pub mod nlp;
mod scaled;
pub mod solve;
pub mod status;
pub mod trajectory;
pub mod transcription;

pub use augmented_lagrangian::{AlConfig, AugmentedLagrangian};
pub use error::{SolverError, SolverResult};
pub use interior_point::{InteriorPoint, IpConfig};
pub use nlp::{NlpOutcome, NlpProblem, NlpSolver, RowKind, bound_violation, max_violation};
pub use solve::{SolveResult, solve, solve_with_guess};
pub use status::TerminationStatus;
pub use trajectory::Trajectory;
pub use transcription::{ColumnLayout, TranscribedNlp};
