//! Row and objective scaling shared by the NLP solvers.

use crate::nlp::{NlpProblem, RowKind};

/// Target magnitude for scaled gradients.
pub(crate) const SCALE_TARGET: f64 = 100.0;

/// Function values at one iterate, in scaled units.
#[derive(Clone, Debug)]
pub(crate) struct Point {
    pub(crate) x: Vec<f64>,
    pub(crate) objective: f64,
    pub(crate) grad_f: Vec<f64>,
    pub(crate) c: Vec<f64>,
    /// Merged sparse row gradients.
    pub(crate) jac: Vec<Vec<(usize, f64)>>,
}

impl Point {
    pub(crate) fn is_finite(&self) -> bool {
        self.objective.is_finite()
            && self.grad_f.iter().all(|v| v.is_finite())
            && self.c.iter().all(|v| v.is_finite())
            && self.jac.iter().flatten().all(|(_, v)| v.is_finite())
    }
}

/// The NLP with row and objective scaling applied.
pub(crate) struct Scaled<'a> {
    pub(crate) nlp: &'a dyn NlpProblem,
    pub(crate) kinds: Vec<RowKind>,
    pub(crate) row_scale: Vec<f64>,
    pub(crate) obj_scale: f64,
}

impl<'a> Scaled<'a> {
    /// Scale every function so its gradient at `x0` is at most
    /// [`SCALE_TARGET`] in the infinity norm.
    pub(crate) fn new(nlp: &'a dyn NlpProblem, x0: &[f64]) -> Self {
        let factor = |grad: &[(usize, f64)]| {
            let norm = grad.iter().fold(0.0_f64, |acc, (_, v)| acc.max(v.abs()));
            if norm > 0.0 && norm.is_finite() {
                (SCALE_TARGET / norm).min(1.0)
            } else {
                1.0
            }
        };
        let mut scratch = Vec::new();
        nlp.eval_objective(x0, &mut scratch);
        let obj_scale = factor(&merge(&mut scratch));
        let m = nlp.num_rows();
        let mut row_scale = Vec::with_capacity(m);
        let mut kinds = Vec::with_capacity(m);
        for r in 0..m {
            scratch.clear();
            nlp.eval_row(r, x0, &mut scratch);
            row_scale.push(factor(&merge(&mut scratch)));
            kinds.push(nlp.row_kind(r));
        }
        Self {
            nlp,
            kinds,
            row_scale,
            obj_scale,
        }
    }

    pub(crate) fn evaluate(&self, x: Vec<f64>) -> Point {
        let n = x.len();
        let mut scratch = Vec::new();
        let objective = self.obj_scale * self.nlp.eval_objective(&x, &mut scratch);
        let mut grad_f = vec![0.0; n];
        for (j, v) in scratch.drain(..) {
            grad_f[j] += self.obj_scale * v;
        }
        let m = self.kinds.len();
        let mut c = Vec::with_capacity(m);
        let mut jac = Vec::with_capacity(m);
        for r in 0..m {
            scratch.clear();
            let s = self.row_scale[r];
            c.push(s * self.nlp.eval_row(r, &x, &mut scratch));
            let mut row = merge(&mut scratch);
            for (_, v) in &mut row {
                *v *= s;
            }
            jac.push(row);
        }
        Point {
            x,
            objective,
            grad_f,
            c,
            jac,
        }
    }

    /// Largest violation in the problem's own units.
    pub(crate) fn violation(&self, point: &Point) -> f64 {
        point
            .c
            .iter()
            .zip(&self.row_scale)
            .zip(&self.kinds)
            .map(|((c, s), kind)| {
                let raw = c / s;
                match kind {
                    RowKind::Equality => raw.abs(),
                    RowKind::Inequality => raw.max(0.0),
                }
            })
            .fold(0.0, f64::max)
    }

    /// Append both triangles of `∇²(f + Σ w_r·c_r)` in scaled units.
    pub(crate) fn lagrangian_hessian(
        &self,
        x: &[f64],
        weights: &[f64],
        entries: &mut Vec<(usize, usize, f64)>,
    ) {
        self.nlp.objective_hessian(x, self.obj_scale, entries);
        for (r, &w) in weights.iter().enumerate() {
            if w != 0.0 {
                self.nlp.row_hessian(r, x, w * self.row_scale[r], entries);
            }
        }
    }
}

/// Sort by column and sum repeated entries.
pub(crate) fn merge(entries: &mut Vec<(usize, f64)>) -> Vec<(usize, f64)> {
    entries.sort_by_key(|&(j, _)| j);
    let mut out: Vec<(usize, f64)> = Vec::with_capacity(entries.len());
    for &(j, v) in entries.iter() {
        match out.last_mut() {
            Some(last) if last.0 == j => last.1 += v,
            _ => out.push((j, v)),
        }
    }
    out
}
