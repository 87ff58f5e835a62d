//! Small hand-written problems for solver tests.

use crate::nlp::{NlpProblem, RowKind};

pub(crate) type Grad = Vec<(usize, f64)>;
pub(crate) type Hess = Vec<(usize, usize, f64)>;

/// Small problem assembled from plain functions.
pub(crate) struct Toy {
    pub(crate) lower: Vec<f64>,
    pub(crate) upper: Vec<f64>,
    pub(crate) x0: Vec<f64>,
    pub(crate) kinds: Vec<RowKind>,
    pub(crate) f: fn(&[f64], &mut Grad) -> f64,
    pub(crate) f_hess: fn(&[f64], f64, &mut Hess),
    pub(crate) rows: fn(usize, &[f64], &mut Grad) -> f64,
    pub(crate) rows_hess: fn(usize, &[f64], f64, &mut Hess),
}

impl NlpProblem for Toy {
    fn num_vars(&self) -> usize {
        self.x0.len()
    }
    fn num_rows(&self) -> usize {
        self.kinds.len()
    }
    fn lower_bounds(&self) -> &[f64] {
        &self.lower
    }
    fn upper_bounds(&self) -> &[f64] {
        &self.upper
    }
    fn initial_point(&self) -> Vec<f64> {
        self.x0.clone()
    }
    fn row_kind(&self, row: usize) -> RowKind {
        self.kinds[row]
    }
    fn eval_row(&self, row: usize, x: &[f64], grad: &mut Grad) -> f64 {
        (self.rows)(row, x, grad)
    }
    fn eval_objective(&self, x: &[f64], grad: &mut Grad) -> f64 {
        (self.f)(x, grad)
    }
    fn row_hessian(&self, row: usize, x: &[f64], weight: f64, hess: &mut Hess) {
        (self.rows_hess)(row, x, weight, hess)
    }
    fn objective_hessian(&self, x: &[f64], weight: f64, hess: &mut Hess) {
        (self.f_hess)(x, weight, hess)
    }
}

/// `(x0 − 1)² + (x1 − 2)²`
pub(crate) fn bowl(x: &[f64], g: &mut Grad) -> f64 {
    g.push((0, 2.0 * (x[0] - 1.0)));
    g.push((1, 2.0 * (x[1] - 2.0)));
    (x[0] - 1.0).powi(2) + (x[1] - 2.0).powi(2)
}

pub(crate) fn bowl_hess(_: &[f64], w: f64, h: &mut Hess) {
    h.push((0, 0, 2.0 * w));
    h.push((1, 1, 2.0 * w));
}

/// `x0 + x1 − 1`
pub(crate) fn sum_row(_: usize, x: &[f64], g: &mut Grad) -> f64 {
    g.push((0, 1.0));
    g.push((1, 1.0));
    x[0] + x[1] - 1.0
}

pub(crate) fn linear_hess(_: usize, _: &[f64], _: f64, _: &mut Hess) {}

pub(crate) fn toy(kind: RowKind, upper: Vec<f64>) -> Toy {
    Toy {
        lower: vec![f64::NEG_INFINITY; 2],
        upper,
        x0: vec![0.0, 0.0],
        kinds: vec![kind],
        f: bowl,
        f_hess: bowl_hess,
        rows: sum_row,
        rows_hess: linear_hess,
    }
}
