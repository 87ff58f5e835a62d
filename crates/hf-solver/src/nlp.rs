//! Finite-dimensional nonlinear program interface.
//!
//! ```text
//! min f(x)  s.t.  c_r(x) = 0   (equality rows)
//!                 c_r(x) <= 0  (inequality rows)
//!                 l <= x <= u
//! ```

use crate::status::TerminationStatus;
use hf_core::inf_norm;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RowKind {
    /// `c(x) == 0`
    Equality,
    /// `c(x) <= 0`
    Inequality,
}

/// A nonlinear program with sparse first derivatives and optional sparse
/// second derivatives.
///
/// Gradient entries are appended as `(column, value)`; repeated columns are
/// summed by the caller. Hessian entries are appended as
/// `(row, column, value)` covering both triangles.
pub trait NlpProblem {
    fn num_vars(&self) -> usize;

    fn num_rows(&self) -> usize;

    fn lower_bounds(&self) -> &[f64];

    fn upper_bounds(&self) -> &[f64];

    fn initial_point(&self) -> Vec<f64>;

    fn row_kind(&self, row: usize) -> RowKind;

    /// Residual of `row` at `x`; its gradient is appended to `grad`.
    fn eval_row(&self, row: usize, x: &[f64], grad: &mut Vec<(usize, f64)>) -> f64;

    /// Objective value at `x`; its gradient is appended to `grad`.
    fn eval_objective(&self, x: &[f64], grad: &mut Vec<(usize, f64)>) -> f64;

    /// Append `weight · ∇²c_row(x)`. Linear rows contribute nothing.
    fn row_hessian(
        &self,
        _row: usize,
        _x: &[f64],
        _weight: f64,
        _hess: &mut Vec<(usize, usize, f64)>,
    ) {
    }

    /// Append `weight · ∇²f(x)`.
    fn objective_hessian(&self, _x: &[f64], _weight: f64, _hess: &mut Vec<(usize, usize, f64)>) {}
}

/// Final state reported by an [`NlpSolver`].
#[derive(Clone, Debug, PartialEq)]
pub struct NlpOutcome {
    pub status: TerminationStatus,
    /// Last iterate (the solution when `status` is optimal).
    pub x: Vec<f64>,
    /// Objective at `x`, in the problem's minimization form.
    pub objective: f64,
    /// Largest row violation at `x`.
    pub violation: f64,
    /// Inner (Newton) iterations summed over the run.
    pub iterations: usize,
    pub outer_iterations: usize,
    pub wall_time_s: f64,
}

/// A general-purpose NLP solver.
pub trait NlpSolver: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, nlp: &dyn NlpProblem) -> NlpOutcome;
}

/// Largest violation of `residuals` given the row kinds of `nlp`.
pub fn max_violation(nlp: &dyn NlpProblem, residuals: &[f64]) -> f64 {
    residuals
        .iter()
        .enumerate()
        .map(|(r, &c)| match nlp.row_kind(r) {
            RowKind::Equality => c.abs(),
            RowKind::Inequality => c.max(0.0),
        })
        .fold(0.0, f64::max)
}

/// Largest amount by which `x` leaves `[lower, upper]`.
pub fn bound_violation(x: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    let excess: Vec<f64> = x
        .iter()
        .zip(lower.iter().zip(upper))
        .map(|(&xi, (&l, &u))| (l - xi).max(xi - u).max(0.0))
        .collect();
    inf_norm(&excess)
}
