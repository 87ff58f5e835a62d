//! Bound-constrained augmented Lagrangian method with a log barrier on
//! strictly satisfied inequality rows.
//!
//! By default a run starts with the [`InteriorPoint`] method and only falls
//! back to the augmented Lagrangian iterations below when that phase stalls
//! short of a decision: the interior iterate becomes the start point.
//! Degenerate problems with more active rows than free variables are the
//! usual reason for the hand-over.
//!
//! Outer iterations update multiplier estimates, the penalty `ρ` and the
//! barrier parameter `μ`; each inner iteration takes a projected Newton
//! step on the merit function
//!
//! ```text
//! φ(x) = f(x) + Σ_E (λ·c + ρ/2·c²) + Σ_P (max(0, λ + ρ·c)² − λ²) / 2ρ − μ·Σ_B ln(−c)
//! ```
//!
//! `E` are the equality rows. An inequality row joins the barrier set `B`
//! when the start point satisfies it strictly, and the PHR penalty set `P`
//! otherwise. Barrier rows therefore hold at every iterate.
//!
//! The Newton matrix is `∇²f + Σ w·∇²c + ρ·J_Eᵀ·J_E + Σ_B (z/s)·∇c·∇cᵀ`
//! with primal-dual estimates `z ≈ μ/s` on the barrier slacks `s = −c`,
//! shifted by `δ·I` until a sparse Cholesky factorization succeeds.
//! Problems that supply no second derivatives get a Gauss-Newton model.

use crate::interior_point::{InteriorPoint, IpConfig};
use crate::nlp::{NlpOutcome, NlpProblem, NlpSolver, RowKind};
use crate::scaled::{Point, SCALE_TARGET, Scaled};
use crate::status::TerminationStatus;
use hf_core::{Deadline, project};
use nalgebra::DMatrix;
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// First shift tried after a failed factorization.
const SHIFT_RESTART: f64 = 1e-4;
/// Largest shift before the inner loop gives up.
const SHIFT_MAX: f64 = 1e12;
/// Fraction of a barrier slack a single step may consume.
const TO_BOUNDARY: f64 = 0.99;
/// Barrier duals stay within this factor of `μ/s`.
const DUAL_SPREAD: f64 = 1e10;

/// Augmented Lagrangian configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlConfig {
    /// Largest acceptable unscaled row violation
    pub feas_tol: f64,
    /// Stationarity tolerance on the scaled projected gradient
    pub opt_tol: f64,
    pub max_outer: usize,
    /// Newton iterations per outer iteration
    pub max_inner: usize,
    pub rho_init: f64,
    pub rho_max: f64,
    /// Initial barrier parameter (scaled units)
    pub mu_init: f64,
    /// Barrier parameter at which an optimal point may be reported
    pub mu_min: f64,
    /// Outer iterations at `rho_max` without progress before declaring
    /// the problem locally infeasible
    pub stall_outer: usize,
    /// Smallest diagonal shift added to the Newton matrix
    pub regularization: f64,
    /// Sufficient-decrease constant of the Armijo test
    pub armijo: f64,
    /// Step reduction factor of the line search
    pub backtrack: f64,
    pub max_backtracks: usize,
    /// Wall-clock budget in seconds (`None` = unlimited), shared with the
    /// interior phase
    pub max_wall_time: Option<f64>,
    /// Interior-point phase run first (`None` skips it)
    pub interior: Option<IpConfig>,
}

impl Default for AlConfig {
    fn default() -> Self {
        Self {
            feas_tol: 1e-6,
            opt_tol: 1e-5,
            max_outer: 60,
            max_inner: 200,
            rho_init: 10.0,
            rho_max: 1e8,
            mu_init: 0.1,
            mu_min: 1e-6,
            stall_outer: 4,
            regularization: 1e-8,
            armijo: 1e-4,
            backtrack: 0.5,
            max_backtracks: 40,
            max_wall_time: None,
            interior: Some(IpConfig::default()),
        }
    }
}

/// Augmented Lagrangian NLP solver.
#[derive(Clone, Debug, Default)]
pub struct AugmentedLagrangian {
    pub config: AlConfig,
}

impl AugmentedLagrangian {
    pub fn new(config: AlConfig) -> Self {
        Self { config }
    }

    /// Same configuration with a wall-clock budget.
    pub fn with_time_limit(mut self, seconds: Option<f64>) -> Self {
        self.config.max_wall_time = seconds;
        self
    }
}

impl NlpSolver for AugmentedLagrangian {
    fn name(&self) -> &str {
        "augmented_lagrangian"
    }

    fn solve(&self, nlp: &dyn NlpProblem) -> NlpOutcome {
        let budget = self
            .config
            .max_wall_time
            .and_then(|s| Duration::try_from_secs_f64(s).ok());
        let deadline = Deadline::after(budget);
        let mut start = nlp.initial_point();
        let mut earlier = 0;
        if let Some(interior) = &self.config.interior {
            let first = InteriorPoint::new(interior.clone()).run(nlp, &deadline);
            let TerminationStatus::Other(reason) = &first.status else {
                return first;
            };
            info!(
                reason = reason.as_str(),
                violation = first.violation,
                iterations = first.iterations,
                "interior phase stalled, continuing with the augmented lagrangian"
            );
            earlier = first.iterations;
            start = first.x;
        }
        let mut out = Run {
            config: &self.config,
            deadline: &deadline,
        }
        .execute(nlp, start);
        out.iterations += earlier;
        out
    }
}

/// How a row enters the merit function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RowMode {
    Equality,
    /// Inequality violated or active at the start point.
    Penalty,
    /// Inequality kept strictly satisfied by `−μ·ln(−c)`.
    Barrier,
}

impl RowMode {
    fn classify(kind: RowKind, c0: f64) -> Self {
        match kind {
            RowKind::Equality => RowMode::Equality,
            RowKind::Inequality if c0 < 0.0 => RowMode::Barrier,
            RowKind::Inequality => RowMode::Penalty,
        }
    }
}

/// Multiplier estimates, penalty and barrier parameters.
#[derive(Clone, Debug)]
struct Penalty {
    modes: Vec<RowMode>,
    mult: Vec<f64>,
    /// Primal-dual estimates on barrier rows, zero elsewhere.
    duals: Vec<f64>,
    rho: f64,
    mu: f64,
}

impl Penalty {
    fn new(kinds: &[RowKind], c0: &[f64], rho: f64, mu: f64) -> Self {
        let modes: Vec<RowMode> = kinds
            .iter()
            .zip(c0)
            .map(|(&kind, &c)| RowMode::classify(kind, c))
            .collect();
        let duals = modes
            .iter()
            .zip(c0)
            .map(|(&mode, &c)| if mode == RowMode::Barrier { mu / -c } else { 0.0 })
            .collect();
        Self {
            mult: vec![0.0; modes.len()],
            modes,
            duals,
            rho,
            mu,
        }
    }

    fn has_barrier(&self) -> bool {
        self.modes.contains(&RowMode::Barrier)
    }

    /// `+∞` once a barrier row is no longer strictly satisfied.
    fn merit(&self, point: &Point) -> f64 {
        let rho = self.rho;
        let mut phi = point.objective;
        for ((mode, &c), &m) in self.modes.iter().zip(&point.c).zip(&self.mult) {
            phi += match mode {
                RowMode::Equality => m * c + 0.5 * rho * c * c,
                RowMode::Penalty => {
                    let t = (m + rho * c).max(0.0);
                    (t * t - m * m) / (2.0 * rho)
                }
                RowMode::Barrier if c < 0.0 => -self.mu * (-c).ln(),
                RowMode::Barrier => return f64::INFINITY,
            };
        }
        phi
    }

    /// First-order multiplier estimates `w`; `∇φ = ∇f + Σ w·∇c`.
    fn weights(&self, point: &Point) -> Vec<f64> {
        self.modes
            .iter()
            .zip(&point.c)
            .zip(&self.mult)
            .map(|((mode, &c), &m)| match mode {
                RowMode::Equality => m + self.rho * c,
                RowMode::Penalty => (m + self.rho * c).max(0.0),
                RowMode::Barrier => self.mu / -c,
            })
            .collect()
    }

    /// Coefficient of `∇c·∇cᵀ` in the Newton matrix.
    fn curvature(&self, row: usize, c: f64, weight: f64) -> Option<f64> {
        match self.modes[row] {
            RowMode::Equality => Some(self.rho),
            RowMode::Penalty if weight > 0.0 => Some(self.rho),
            RowMode::Penalty => None,
            RowMode::Barrier => Some(self.duals[row] / -c),
        }
    }

    /// Largest step along `d` that keeps every barrier slack above
    /// `1 − TO_BOUNDARY` of its current value, to first order. Returns the
    /// step length and the directional derivatives `∇c·d` of barrier rows.
    fn max_step(&self, point: &Point, d: &[f64]) -> (f64, Vec<(usize, f64)>) {
        let mut alpha = 1.0_f64;
        let mut slopes = Vec::new();
        for (r, row) in point.jac.iter().enumerate() {
            if self.modes[r] != RowMode::Barrier {
                continue;
            }
            let dc: f64 = row.iter().map(|&(j, v)| v * d[j]).sum();
            if dc > 0.0 {
                alpha = alpha.min(TO_BOUNDARY * -point.c[r] / dc);
            }
            slopes.push((r, dc));
        }
        (alpha, slopes)
    }

    /// Newton update of the barrier duals from linearized complementarity
    /// `z·s = μ`, then clamped around `μ/s` at the accepted point.
    fn update_duals(&mut self, before: &Point, after: &Point, slopes: &[(usize, f64)]) {
        let steps: Vec<(usize, f64)> = slopes
            .iter()
            .map(|&(r, dc)| {
                let (s, z) = (-before.c[r], self.duals[r]);
                (r, (self.mu - z * s + z * dc) / s)
            })
            .collect();
        let alpha = steps
            .iter()
            .filter(|&&(_, dz)| dz < 0.0)
            .fold(1.0_f64, |a, &(r, dz)| a.min(TO_BOUNDARY * self.duals[r] / -dz));
        for (r, dz) in steps {
            let s = -after.c[r];
            let z = self.duals[r] + alpha * dz;
            self.duals[r] = z.clamp(self.mu / (DUAL_SPREAD * s), DUAL_SPREAD * self.mu / s);
        }
    }

    fn next_mu(&mut self, mu_min: f64) {
        self.mu = (0.2 * self.mu).min(self.mu.powf(1.5)).max(mu_min);
    }
}

fn merit_gradient(point: &Point, weights: &[f64]) -> Vec<f64> {
    let mut g = point.grad_f.clone();
    for (row, &w) in point.jac.iter().zip(weights) {
        if w != 0.0 {
            for &(j, v) in row {
                g[j] += w * v;
            }
        }
    }
    g
}

/// `‖P(x − g) − x‖∞`, zero exactly at a bound-constrained stationary point.
fn projected_gradient(x: &[f64], g: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    x.iter()
        .zip(g)
        .zip(lower.iter().zip(upper))
        .map(|((&xi, &gi), (&l, &u))| (project(xi - gi, l, u) - xi).abs())
        .fold(0.0, f64::max)
}

/// Variables held fixed for one Newton step: fixed by their bounds, or
/// sitting on a bound that the gradient pushes against.
fn frozen_mask(x: &[f64], g: &[f64], lower: &[f64], upper: &[f64]) -> Vec<bool> {
    x.iter()
        .zip(g)
        .zip(lower.iter().zip(upper))
        .map(|((&xi, &gi), (&l, &u))| {
            let at_lower = xi <= l + 1e-12 * (1.0 + l.abs());
            let at_upper = xi >= u - 1e-12 * (1.0 + u.abs());
            l == u || (at_lower && gi > 0.0) || (at_upper && gi < 0.0)
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InnerExit {
    Converged,
    IterationLimit,
    /// Line search kept failing even with a large shift.
    Stalled,
    FactorizationFailed,
    NonFinite,
    TimeLimit,
}

struct Inner {
    point: Point,
    iterations: usize,
    exit: InnerExit,
}

struct Run<'c> {
    config: &'c AlConfig,
    deadline: &'c Deadline,
}

impl Run<'_> {
    fn execute(&self, nlp: &dyn NlpProblem, raw_x0: Vec<f64>) -> NlpOutcome {
        let cfg = self.config;
        let n = nlp.num_vars();
        let (lower, upper) = (nlp.lower_bounds(), nlp.upper_bounds());
        if lower.len() != n || upper.len() != n || raw_x0.len() != n {
            return self.abort(
                raw_x0,
                TerminationStatus::Other("bound or start vector has the wrong length".into()),
            );
        }
        if lower.iter().zip(upper).any(|(l, u)| l > u) {
            return self.abort(raw_x0, TerminationStatus::Infeasible);
        }

        let x0: Vec<f64> = raw_x0
            .iter()
            .zip(lower.iter().zip(upper))
            .map(|(&v, (&l, &u))| project(v, l, u))
            .collect();
        let scaled = Scaled::new(nlp, &x0);
        let mut point = scaled.evaluate(x0);
        if !point.is_finite() {
            return self.abort(
                point.x,
                TerminationStatus::Other("non-finite values at the initial point".into()),
            );
        }

        let mut penalty = Penalty::new(&scaled.kinds, &point.c, cfg.rho_init, cfg.mu_init);
        let mut shift = cfg.regularization;
        let mut best = f64::INFINITY;
        let mut previous = f64::INFINITY;
        let mut stall = 0;
        let mut iterations = 0;

        for outer in 1..=cfg.max_outer {
            let omega = (10.0 * penalty.mu).max(0.5 * cfg.opt_tol);
            let inner =
                self.minimize(&scaled, &mut penalty, point, lower, upper, omega, &mut shift);
            iterations += inner.iterations;
            point = inner.point;

            let violation = scaled.violation(&point);
            let weights = penalty.weights(&point);
            let measure = projected_gradient(
                &point.x,
                &merit_gradient(&point, &weights),
                lower,
                upper,
            );
            let dual_scale = if weights.is_empty() {
                1.0
            } else {
                let mean = weights.iter().map(|w| w.abs()).sum::<f64>() / weights.len() as f64;
                (mean / SCALE_TARGET).max(1.0)
            };
            debug!(
                outer,
                inner = inner.iterations,
                violation,
                stationarity = measure / dual_scale,
                rho = penalty.rho,
                mu = penalty.mu,
                exit = ?inner.exit,
                "augmented lagrangian outer iteration"
            );

            let finish = |status: TerminationStatus, point: Point| {
                self.finish(&scaled, point, status, iterations, outer)
            };
            let barrier_done = !penalty.has_barrier() || penalty.mu <= cfg.mu_min;
            if violation <= cfg.feas_tol && measure / dual_scale <= cfg.opt_tol && barrier_done {
                return finish(TerminationStatus::Optimal, point);
            }
            match inner.exit {
                InnerExit::TimeLimit => return finish(TerminationStatus::TimeLimit, point),
                InnerExit::NonFinite => {
                    return finish(
                        TerminationStatus::Other("non-finite merit function".into()),
                        point,
                    );
                }
                InnerExit::FactorizationFailed => {
                    return finish(
                        TerminationStatus::Other("Newton matrix could not be factored".into()),
                        point,
                    );
                }
                _ => {}
            }
            if self.deadline.expired() {
                return finish(TerminationStatus::TimeLimit, point);
            }

            if violation <= 0.99 * best {
                best = violation;
                stall = 0;
            } else if penalty.rho >= cfg.rho_max && inner.exit == InnerExit::Converged {
                stall += 1;
                if stall >= cfg.stall_outer {
                    return finish(TerminationStatus::Infeasible, point);
                }
            } else {
                stall = 0;
            }

            if violation <= cfg.feas_tol || violation <= 0.25 * previous {
                for ((m, w), mode) in penalty.mult.iter_mut().zip(weights).zip(&penalty.modes) {
                    *m = if *mode == RowMode::Barrier { 0.0 } else { w };
                }
            } else {
                penalty.rho = (penalty.rho * 10.0).min(cfg.rho_max);
            }
            previous = violation;
            penalty.next_mu(cfg.mu_min);
        }

        self.finish(
            &scaled,
            point,
            TerminationStatus::Other("outer iteration limit reached".into()),
            iterations,
            cfg.max_outer,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn minimize(
        &self,
        scaled: &Scaled<'_>,
        penalty: &mut Penalty,
        mut point: Point,
        lower: &[f64],
        upper: &[f64],
        omega: f64,
        shift: &mut f64,
    ) -> Inner {
        let cfg = self.config;
        let done = |point: Point, iterations: usize, exit: InnerExit| Inner {
            point,
            iterations,
            exit,
        };
        for it in 0..cfg.max_inner {
            if self.deadline.expired() {
                return done(point, it, InnerExit::TimeLimit);
            }
            let weights = penalty.weights(&point);
            let g = merit_gradient(&point, &weights);
            let phi = penalty.merit(&point);
            if !phi.is_finite() || g.iter().any(|v| !v.is_finite()) {
                return done(point, it, InnerExit::NonFinite);
            }
            if projected_gradient(&point.x, &g, lower, upper) <= omega {
                return done(point, it, InnerExit::Converged);
            }

            let frozen = frozen_mask(&point.x, &g, lower, upper);
            let Some(step) = self.newton_step(scaled, penalty, &point, &weights, &g, &frozen, shift)
            else {
                return done(point, it, InnerExit::FactorizationFailed);
            };

            let (alpha_max, slopes) = penalty.max_step(&point, &step);
            let search = self.line_search(
                scaled, penalty, &point, phi, &g, &step, lower, upper, alpha_max,
            );
            match search {
                Some((trial, alpha)) => {
                    if alpha == alpha_max {
                        *shift = (*shift / 10.0).max(cfg.regularization);
                    }
                    penalty.update_duals(&point, &trial, &slopes);
                    point = trial;
                }
                None => {
                    *shift = (*shift * 10.0).max(SHIFT_RESTART);
                    if *shift > SHIFT_MAX {
                        return done(point, it + 1, InnerExit::Stalled);
                    }
                }
            }
        }
        done(point, cfg.max_inner, InnerExit::IterationLimit)
    }

    /// Solve `(H + δI)·d = −g` over the free variables.
    #[allow(clippy::too_many_arguments)]
    fn newton_step(
        &self,
        scaled: &Scaled<'_>,
        penalty: &Penalty,
        point: &Point,
        weights: &[f64],
        g: &[f64],
        frozen: &[bool],
        shift: &mut f64,
    ) -> Option<Vec<f64>> {
        let n = point.x.len();
        let mut entries = Vec::new();
        scaled.lagrangian_hessian(&point.x, weights, &mut entries);
        for (r, (row, &w)) in point.jac.iter().zip(weights).enumerate() {
            let Some(k) = penalty.curvature(r, point.c[r], w) else {
                continue;
            };
            for &(i, a) in row {
                for &(j, b) in row {
                    entries.push((i, j, k * a * b));
                }
            }
        }
        entries.retain(|&(i, j, v)| !frozen[i] && !frozen[j] && v != 0.0);

        let rhs = DMatrix::from_iterator(
            n,
            1,
            g.iter()
                .zip(frozen)
                .map(|(&gi, &fixed)| if fixed { 0.0 } else { -gi }),
        );
        let mut delta = shift.max(self.config.regularization);
        loop {
            let mut coo = CooMatrix::new(n, n);
            for &(i, j, v) in &entries {
                coo.push(i, j, v);
            }
            for (i, &fixed) in frozen.iter().enumerate() {
                coo.push(i, i, if fixed { 1.0 } else { delta });
            }
            if let Ok(chol) = CscCholesky::factor(&CscMatrix::from(&coo)) {
                let sol = chol.solve(&rhs);
                let step: Vec<f64> = sol.as_slice().to_vec();
                if step.iter().all(|v| v.is_finite()) {
                    *shift = delta;
                    return Some(step);
                }
            }
            delta = if delta < SHIFT_RESTART {
                SHIFT_RESTART
            } else {
                8.0 * delta
            };
            if delta > SHIFT_MAX {
                return None;
            }
        }
    }

    /// Projected backtracking with the Armijo test along the projection
    /// arc, starting from `alpha_max`.
    #[allow(clippy::too_many_arguments)]
    fn line_search(
        &self,
        scaled: &Scaled<'_>,
        penalty: &Penalty,
        point: &Point,
        phi: f64,
        g: &[f64],
        step: &[f64],
        lower: &[f64],
        upper: &[f64],
        alpha_max: f64,
    ) -> Option<(Point, f64)> {
        let cfg = self.config;
        let mut alpha = alpha_max;
        for _ in 0..=cfg.max_backtracks {
            let x: Vec<f64> = point
                .x
                .iter()
                .zip(step)
                .zip(lower.iter().zip(upper))
                .map(|((&xi, &di), (&l, &u))| project(xi + alpha * di, l, u))
                .collect();
            let slope: f64 = x
                .iter()
                .zip(&point.x)
                .zip(g)
                .map(|((xn, xo), gi)| gi * (xn - xo))
                .sum();
            if slope < 0.0 {
                let trial = scaled.evaluate(x);
                if trial.is_finite() {
                    let value = penalty.merit(&trial);
                    if value.is_finite() && value <= phi + cfg.armijo * slope {
                        return Some((trial, alpha));
                    }
                }
            }
            alpha *= cfg.backtrack;
        }
        None
    }

    fn finish(
        &self,
        scaled: &Scaled<'_>,
        point: Point,
        status: TerminationStatus,
        iterations: usize,
        outer_iterations: usize,
    ) -> NlpOutcome {
        let violation = scaled.violation(&point);
        let objective = point.objective / scaled.obj_scale;
        info!(
            %status,
            objective,
            violation,
            iterations,
            outer_iterations,
            "augmented lagrangian finished"
        );
        NlpOutcome {
            status,
            x: point.x,
            objective,
            violation,
            iterations,
            outer_iterations,
            wall_time_s: self.deadline.elapsed_s(),
        }
    }

    fn abort(&self, x: Vec<f64>, status: TerminationStatus) -> NlpOutcome {
        info!(%status, "augmented lagrangian stopped before iterating");
        NlpOutcome {
            status,
            x,
            objective: f64::NAN,
            violation: f64::INFINITY,
            iterations: 0,
            outer_iterations: 0,
            wall_time_s: self.deadline.elapsed_s(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Grad, Hess, Toy, linear_hess, toy};
    use approx::assert_relative_eq;

    fn al_only() -> AugmentedLagrangian {
        AugmentedLagrangian::new(AlConfig {
            interior: None,
            ..AlConfig::default()
        })
    }

    #[test]
    fn equality_constrained_bowl() {
        let nlp = toy(RowKind::Equality, vec![f64::INFINITY; 2]);
        let out = al_only().solve(&nlp);
        assert!(out.status.is_optimal(), "{}", out.status);
        assert_relative_eq!(out.x[0], 0.0, epsilon = 1e-5);
        assert_relative_eq!(out.x[1], 1.0, epsilon = 1e-5);
        assert_relative_eq!(out.objective, 2.0, epsilon = 1e-4);
        assert!(out.violation <= 1e-6);
    }

    #[test]
    fn inequality_and_bound_active_together() {
        // x0 + x1 <= 1 and x1 <= 0.5: the optimum sits on both.
        let nlp = toy(RowKind::Inequality, vec![f64::INFINITY, 0.5]);
        let out = al_only().solve(&nlp);
        assert!(out.status.is_optimal(), "{}", out.status);
        assert_relative_eq!(out.x[0], 0.5, epsilon = 1e-5);
        assert_relative_eq!(out.x[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn inactive_inequality_leaves_the_bowl_minimum() {
        fn loose(_: usize, x: &[f64], g: &mut Grad) -> f64 {
            g.push((0, 1.0));
            x[0] - 10.0
        }
        let nlp = Toy {
            rows: loose,
            ..toy(RowKind::Inequality, vec![f64::INFINITY; 2])
        };
        let out = al_only().solve(&nlp);
        assert!(out.status.is_optimal());
        assert_relative_eq!(out.x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(out.x[1], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn satisfied_inequality_holds_against_an_unbounded_objective() {
        // min −exp(2·x0) + (x1 − 2)² with x0 <= 1 as a row: past the row
        // the objective falls faster than any quadratic penalty rises.
        fn f(x: &[f64], g: &mut Grad) -> f64 {
            let e = (2.0 * x[0]).exp();
            g.push((0, -2.0 * e));
            g.push((1, 2.0 * (x[1] - 2.0)));
            -e + (x[1] - 2.0).powi(2)
        }
        fn f_hess(x: &[f64], w: f64, h: &mut Hess) {
            h.push((0, 0, -4.0 * (2.0 * x[0]).exp() * w));
            h.push((1, 1, 2.0 * w));
        }
        fn cap(_: usize, x: &[f64], g: &mut Grad) -> f64 {
            g.push((0, 1.0));
            x[0] - 1.0
        }
        let nlp = Toy {
            f,
            f_hess,
            rows: cap,
            ..toy(RowKind::Inequality, vec![f64::INFINITY; 2])
        };
        let out = al_only().solve(&nlp);
        assert!(out.status.is_optimal(), "{}", out.status);
        assert!(out.x[0] <= 1.0);
        assert_relative_eq!(out.x[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(out.x[1], 2.0, epsilon = 1e-6);
        assert_eq!(out.violation, 0.0);
    }

    #[test]
    fn violated_inequality_at_start_is_penalized() {
        let mut nlp = toy(RowKind::Inequality, vec![f64::INFINITY; 2]);
        nlp.x0 = vec![3.0, 3.0];
        let out = al_only().solve(&nlp);
        assert!(out.status.is_optimal(), "{}", out.status);
        assert_relative_eq!(out.x[0], 0.0, epsilon = 1e-5);
        assert_relative_eq!(out.x[1], 1.0, epsilon = 1e-5);
        assert!(out.violation <= 1e-6);
    }

    #[test]
    fn rows_are_split_by_start_point() {
        let kinds = [RowKind::Equality, RowKind::Inequality, RowKind::Inequality];
        let penalty = Penalty::new(&kinds, &[0.5, -2.0, 0.0], 10.0, 0.1);
        assert_eq!(
            penalty.modes,
            vec![RowMode::Equality, RowMode::Barrier, RowMode::Penalty]
        );
        assert_relative_eq!(penalty.duals[1], 0.05);
        assert_eq!(penalty.duals[2], 0.0);
    }

    #[test]
    fn barrier_merit_is_infinite_outside() {
        let penalty = Penalty::new(&[RowKind::Inequality], &[-1.0], 10.0, 0.1);
        let point = |c: f64| Point {
            x: vec![0.0],
            objective: 0.0,
            grad_f: vec![0.0],
            c: vec![c],
            jac: vec![vec![(0, 1.0)]],
        };
        assert_relative_eq!(penalty.merit(&point(-1.0)), 0.0);
        assert!(penalty.merit(&point(-0.5)) > 0.0);
        assert_eq!(penalty.merit(&point(0.0)), f64::INFINITY);
        // Step towards the row stops short of it.
        let (alpha, slopes) = penalty.max_step(&point(-1.0), &[4.0]);
        assert_relative_eq!(alpha, 0.99 / 4.0);
        assert_eq!(slopes, vec![(0, 4.0)]);
    }

    #[test]
    fn nonlinear_circle() {
        // min x0 + x1 on x0² + x1² = 2 → (−1, −1).
        fn f(_: &[f64], g: &mut Grad) -> f64 {
            g.push((0, 1.0));
            g.push((1, 1.0));
            0.0
        }
        fn f_hess(_: &[f64], _: f64, _: &mut Hess) {}
        fn circle(_: usize, x: &[f64], g: &mut Grad) -> f64 {
            g.push((0, 2.0 * x[0]));
            g.push((1, 2.0 * x[1]));
            x[0] * x[0] + x[1] * x[1] - 2.0
        }
        fn circle_hess(_: usize, _: &[f64], w: f64, h: &mut Hess) {
            h.push((0, 0, 2.0 * w));
            h.push((1, 1, 2.0 * w));
        }
        let mut nlp = toy(RowKind::Equality, vec![f64::INFINITY; 2]);
        nlp.x0 = vec![-0.5, -1.5];
        nlp.f = f;
        nlp.f_hess = f_hess;
        nlp.rows = circle;
        nlp.rows_hess = circle_hess;
        let out = al_only().solve(&nlp);
        assert!(out.status.is_optimal(), "{}", out.status);
        assert_relative_eq!(out.x[0], -1.0, epsilon = 1e-5);
        assert_relative_eq!(out.x[1], -1.0, epsilon = 1e-5);
    }

    #[test]
    fn unreachable_equality_is_infeasible() {
        // x in [0, 1] but x = 2 is required.
        fn f(_: &[f64], _: &mut Grad) -> f64 {
            0.0
        }
        fn f_hess(_: &[f64], _: f64, _: &mut Hess) {}
        fn row(_: usize, x: &[f64], g: &mut Grad) -> f64 {
            g.push((0, 1.0));
            x[0] - 2.0
        }
        let nlp = Toy {
            lower: vec![0.0],
            upper: vec![1.0],
            x0: vec![0.5],
            kinds: vec![RowKind::Equality],
            f,
            f_hess,
            rows: row,
            rows_hess: linear_hess,
        };
        let out = al_only().solve(&nlp);
        assert_eq!(out.status, TerminationStatus::Infeasible);
        assert_relative_eq!(out.x[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(out.violation, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn crossed_bounds_are_infeasible() {
        let mut nlp = toy(RowKind::Equality, vec![f64::INFINITY; 2]);
        nlp.lower = vec![1.0, 0.0];
        nlp.upper = vec![0.0, 1.0];
        let out = al_only().solve(&nlp);
        assert!(out.status.is_infeasible());
        assert_eq!(out.iterations, 0);
    }

    #[test]
    fn zero_budget_hits_the_time_limit() {
        let nlp = toy(RowKind::Equality, vec![f64::INFINITY; 2]);
        let solver = al_only().with_time_limit(Some(0.0));
        let out = solver.solve(&nlp);
        assert_eq!(out.status, TerminationStatus::TimeLimit);
    }

    #[test]
    fn runs_are_deterministic() {
        let nlp = toy(RowKind::Inequality, vec![f64::INFINITY, 0.5]);
        let solver = al_only();
        let (a, b) = (solver.solve(&nlp), solver.solve(&nlp));
        assert_eq!(a.x, b.x);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: AlConfig = serde_json::from_str(r#"{"max_outer": 5}"#).unwrap();
        assert_eq!(cfg.max_outer, 5);
        assert_eq!(cfg.rho_max, 1e8);
        assert_eq!(cfg.mu_min, 1e-6);
        assert_eq!(cfg.interior, Some(IpConfig::default()));

        let cfg: AlConfig = serde_json::from_str(r#"{"interior": null}"#).unwrap();
        assert_eq!(cfg.interior, None);
    }

    #[test]
    fn default_run_returns_the_interior_result_when_it_decides() {
        let mut nlp = toy(RowKind::Equality, vec![f64::INFINITY; 2]);
        nlp.x0 = vec![3.0, -1.0];
        let hybrid = AugmentedLagrangian::default().solve(&nlp);
        let interior = InteriorPoint::default().solve(&nlp);
        assert!(hybrid.status.is_optimal(), "{}", hybrid.status);
        assert_eq!(hybrid.x, interior.x);
        assert_eq!(hybrid.iterations, interior.iterations);
        assert_relative_eq!(hybrid.x[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(hybrid.x[1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn default_run_reports_unreachable_rows_as_infeasible() {
        fn f(_: &[f64], _: &mut Grad) -> f64 {
            0.0
        }
        fn f_hess(_: &[f64], _: f64, _: &mut Hess) {}
        fn row(_: usize, x: &[f64], g: &mut Grad) -> f64 {
            g.push((0, 1.0));
            x[0] - 2.0
        }
        let nlp = Toy {
            lower: vec![0.0],
            upper: vec![1.0],
            x0: vec![0.5],
            kinds: vec![RowKind::Equality],
            f,
            f_hess,
            rows: row,
            rows_hess: linear_hess,
        };
        let out = AugmentedLagrangian::default().solve(&nlp);
        assert_eq!(out.status, TerminationStatus::Infeasible);
        assert!(out.violation > 0.99);
    }
}
