//! Error types for model construction.

use hf_core::HfError;
use thiserror::Error;

/// Errors raised while declaring variables or assembling a model.
///
/// These are programmer/configuration errors: they are reported as soon as
/// the offending declaration is made and never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Duplicate name: '{name}' is already declared")]
    DuplicateName { name: String },

    #[error("Unknown role: {what}")]
    UnknownRole { what: String },

    #[error("Unknown stiffness regime: '{tag}'")]
    UnknownStiffness { tag: String },

    #[error("Unknown formulation: '{tag}'")]
    UnknownFormulation { tag: String },

    #[error("Invalid bounds for {what}: lower={lower:?} upper={upper:?}")]
    InvalidBounds {
        what: String,
        lower: Option<f64>,
        upper: Option<f64>,
    },

    #[error("Unknown variable: {what}")]
    UnknownVariable { what: String },

    #[error("Invalid parameter: {what}")]
    InvalidParameter { what: String },

    #[error("Model has no objective")]
    MissingObjective,

    #[error("Numeric error: {0}")]
    Numeric(#[from] HfError),
}

pub type ModelResult<T> = Result<T, ModelError>;

impl ModelError {
    pub(crate) fn horizon(tf: f64) -> Self {
        ModelError::InvalidBounds {
            what: "time horizon (tf must be finite and > 0)".to_string(),
            lower: Some(0.0),
            upper: Some(tf),
        }
    }
}
