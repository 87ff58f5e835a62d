//! hf-model: continuous-time optimal-control models for the hammering study.
//!
//! Contains:
//! - expr (symbolic expressions with exact sparse gradients)
//! - variable / constraint / objective (registry records)
//! - model (`ModelBuilder` registry and the immutable `DynamicModel`)
//! - regime / params (stiffness regimes, formulations, physical parameters)
//! - contact (magnetic spring law shared by the hammer formulations)
//! - direct / tracking / flat / car (model builders)

pub mod car;
pub mod constraint;
pub mod contact;
pub mod direct;
pub mod error;
pub mod expr;
pub mod flat;
pub mod model;
pub mod objective;
pub mod params;
pub mod regime;
pub mod tracking;
pub mod variable;

pub use car::car_maneuver_model;
pub use constraint::{Constraint, Relation, Scope};
pub use contact::{C1, C2, NOMINAL_GAP, flat_gap_closed_form, hammer_accel, spring_force};
pub use direct::direct_model;
pub use error::{ModelError, ModelResult};
pub use expr::{Dual, EvalContext, Expr, SecondOrder, Snapshot, UnaryFn};
pub use flat::{closed_form_gaps, flat_model};
pub use model::{DynamicModel, ModelBuilder, ModelMetadata};
pub use objective::{Objective, ObjectiveKind, ObjectiveSense, ObjectiveTerm};
pub use params::{CarParams, FormulationTuning, HammerParams, SkewNormalParams};
pub use regime::{Formulation, Stiffness};
pub use tracking::{skew_normal_expr, tracking_model};
pub use variable::{Bounds, ContinuousVariable, Guess, Role};
