//! hf-core: shared foundation for hammerflow.
//!
//! Contains:
//! - units (uom SI types + constructors)
//! - numeric (Real + tolerances + grid helpers)
//! - ids (compact typed IDs for model variables and constraints)
//! - error (shared error types)
//! - timing (wall-clock deadlines and stopwatches for solver caps)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;
pub mod units;

pub use error::{HfError, HfResult};
pub use ids::*;
pub use numeric::*;
pub use timing::{Deadline, Stopwatch};
pub use units::*;
