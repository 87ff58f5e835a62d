//! Primal-dual interior-point method with a filter line search.
//!
//! Inequality rows get slacks `s >= 0` so that every row reads
//! `c(x) + s = 0`; finite bounds and slacks carry a log barrier with duals
//! `z` and `v`. Each iteration solves the primal-dual system reduced onto
//! the primal variables
//!
//! ```text
//! (W + Σ + δ_w·I + Jᵀ·D⁻¹·J)·dx = −r_x − Jᵀ·D⁻¹·r̃_c
//! ```
//!
//! where `W` is the Hessian of the Lagrangian, `Σ = z/(x − l) + z/(u − x)`
//! and `D` carries the eliminated slack block plus a small regularization.
//! `δ_w` grows until the sparse Cholesky factorization succeeds, which is
//! exactly when the full system has the inertia of a descent step.
//!
//! Steps are accepted by a filter on `(θ, φ)`: `θ = ‖c + s‖₁` and `φ` the
//! barrier objective. A rejected full step gets up to
//! [`IpConfig::max_soc`] second-order corrections before backtracking.
//!
//! Bounds are relaxed by [`IpConfig::bound_relax`] relative to their
//! magnitude, so iterates may sit that far outside the original box.

use crate::nlp::{NlpOutcome, NlpProblem, NlpSolver, RowKind};
use crate::scaled::{Point, Scaled};
use crate::status::TerminationStatus;
use hf_core::Deadline;
use nalgebra::DMatrix;
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Smallest fraction-to-the-boundary factor.
const TAU_MIN: f64 = 0.99;
/// Bound and slack duals stay within this factor of `μ/s`.
const DUAL_SPREAD: f64 = 1e10;
/// Regularization of the constraint block.
const ROW_REGULARIZATION: f64 = 1e-8;
/// Slack given to inequality rows that are active or violated at the start.
const SLACK_FLOOR: f64 = 1e-2;
/// First, smallest and largest primal shift of the inertia correction.
const SHIFT_FIRST: f64 = 1e-4;
const SHIFT_MIN: f64 = 1e-20;
const SHIFT_MAX: f64 = 1e40;
/// Iterative refinement passes on each solve.
const REFINE_STEPS: usize = 2;
/// Filter margins on `θ` and `φ`.
const GAMMA_THETA: f64 = 1e-5;
const GAMMA_PHI: f64 = 1e-5;
/// Armijo constant for steps taken on the barrier objective alone.
const ARMIJO: f64 = 1e-4;
/// Exponents of the switching condition `α·(−∇φ·d)^s_φ > θ^s_θ`.
const SWITCH_PHI: f64 = 2.3;
const SWITCH_THETA: f64 = 1.1;
/// Filter envelope relative to the initial violation.
const THETA_MAX_FACTOR: f64 = 1e4;
const THETA_MIN_FACTOR: f64 = 1e-4;
const ALPHA_FLOOR: f64 = 1e-14;

/// Interior-point configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpConfig {
    /// Scaled optimality error at which the run stops
    pub tol: f64,
    /// Largest acceptable unscaled row violation
    pub feas_tol: f64,
    pub max_iter: usize,
    pub mu_init: f64,
    /// The barrier parameter drops once the barrier error is below
    /// `barrier_tol_factor · μ`
    pub barrier_tol_factor: f64,
    /// Relative relaxation of finite bounds
    pub bound_relax: f64,
    /// Relative distance the start point is pushed inside its bounds
    pub bound_push: f64,
    /// Second-order corrections tried on a rejected full step
    pub max_soc: usize,
    /// A stalled line search above this unscaled violation is reported as
    /// local infeasibility
    pub infeasible_violation: f64,
    /// Wall-clock budget in seconds (`None` = unlimited)
    pub max_wall_time: Option<f64>,
}

impl Default for IpConfig {
    fn default() -> Self {
        Self {
            tol: 1e-6,
            feas_tol: 1e-6,
            max_iter: 1000,
            mu_init: 0.1,
            barrier_tol_factor: 10.0,
            bound_relax: 1e-8,
            bound_push: 1e-2,
            max_soc: 4,
            infeasible_violation: 1e-3,
            max_wall_time: None,
        }
    }
}

/// Interior-point NLP solver.
#[derive(Clone, Debug, Default)]
pub struct InteriorPoint {
    pub config: IpConfig,
}

impl InteriorPoint {
    pub fn new(config: IpConfig) -> Self {
        Self { config }
    }

    /// Same configuration with a wall-clock budget.
    pub fn with_time_limit(mut self, seconds: Option<f64>) -> Self {
        self.config.max_wall_time = seconds;
        self
    }

    /// Solve against an externally owned deadline.
    pub(crate) fn run(&self, nlp: &dyn NlpProblem, deadline: &Deadline) -> NlpOutcome {
        Run {
            config: &self.config,
            deadline,
        }
        .execute(nlp)
    }
}

impl NlpSolver for InteriorPoint {
    fn name(&self) -> &str {
        "interior_point"
    }

    fn solve(&self, nlp: &dyn NlpProblem) -> NlpOutcome {
        let budget = self
            .config
            .max_wall_time
            .and_then(|s| Duration::try_from_secs_f64(s).ok());
        self.run(nlp, &Deadline::after(budget))
    }
}

/// Relaxed bounds seen by the barrier. Fixed variables carry none.
#[derive(Clone, Debug)]
struct Barrier {
    lower: Vec<f64>,
    upper: Vec<f64>,
    fixed: Vec<bool>,
}

impl Barrier {
    fn new(lower: &[f64], upper: &[f64], relax: f64) -> Self {
        let widen = |b: f64| relax * b.abs().max(1.0);
        let mut out = Self {
            lower: Vec::with_capacity(lower.len()),
            upper: Vec::with_capacity(lower.len()),
            fixed: Vec::with_capacity(lower.len()),
        };
        for (&l, &u) in lower.iter().zip(upper) {
            let fixed = l == u;
            out.fixed.push(fixed);
            if fixed {
                out.lower.push(f64::NEG_INFINITY);
                out.upper.push(f64::INFINITY);
            } else {
                out.lower.push(if l.is_finite() { l - widen(l) } else { l });
                out.upper.push(if u.is_finite() { u + widen(u) } else { u });
            }
        }
        out
    }

    fn has_lower(&self, j: usize) -> bool {
        self.lower[j].is_finite()
    }

    fn has_upper(&self, j: usize) -> bool {
        self.upper[j].is_finite()
    }

    /// Number of finite lower and upper bounds.
    fn count(&self) -> usize {
        (0..self.fixed.len())
            .map(|j| usize::from(self.has_lower(j)) + usize::from(self.has_upper(j)))
            .sum()
    }

    /// `−μ·Σ ln(x − l) − μ·Σ ln(u − x)`, `+∞` outside.
    fn log_barrier(&self, x: &[f64], mu: f64) -> f64 {
        let mut sum = 0.0;
        for (j, &xj) in x.iter().enumerate() {
            for gap in [xj - self.lower[j], self.upper[j] - xj] {
                if gap.is_finite() {
                    if gap <= 0.0 {
                        return f64::INFINITY;
                    }
                    sum -= mu * gap.ln();
                }
            }
        }
        sum
    }

    /// Largest `α <= 1` keeping `x + α·dx` a fraction `τ` inside.
    fn max_step(&self, x: &[f64], dx: &[f64], tau: f64) -> f64 {
        let mut alpha = 1.0_f64;
        for (j, (&xj, &d)) in x.iter().zip(dx).enumerate() {
            if d < 0.0 && self.has_lower(j) {
                alpha = alpha.min(-tau * (xj - self.lower[j]) / d);
            }
            if d > 0.0 && self.has_upper(j) {
                alpha = alpha.min(tau * (self.upper[j] - xj) / d);
            }
        }
        alpha
    }
}

/// Push `x0` strictly inside the original bounds.
fn push_inside(x0: &[f64], lower: &[f64], upper: &[f64], push: f64) -> Vec<f64> {
    x0.iter()
        .zip(lower.iter().zip(upper))
        .map(|(&v, (&l, &u))| {
            if l == u {
                return l;
            }
            let room = push * (u - l);
            let mut v = v;
            if l.is_finite() {
                v = v.max(l + (push * l.abs().max(1.0)).min(room));
            }
            if u.is_finite() {
                v = v.min(u - (push * u.abs().max(1.0)).min(room));
            }
            v
        })
        .collect()
}

/// Largest `α <= 1` keeping every component of `v + α·dv` a fraction `τ`
/// above zero; only the `active` entries count.
fn positive_step(v: &[f64], dv: &[f64], active: impl Fn(usize) -> bool, tau: f64) -> f64 {
    v.iter()
        .zip(dv)
        .enumerate()
        .filter(|&(i, (_, &d))| d < 0.0 && active(i))
        .fold(1.0_f64, |a, (_, (&vi, &d))| a.min(-tau * vi / d))
}

/// Accepted `(θ, φ)` pairs.
#[derive(Clone, Debug, Default)]
struct Filter(Vec<(f64, f64)>);

impl Filter {
    fn blocks(&self, theta: f64, phi: f64) -> bool {
        self.0.iter().any(|&(t, p)| theta >= t && phi >= p)
    }

    fn augment(&mut self, theta: f64, phi: f64) {
        self.0
            .push(((1.0 - GAMMA_THETA) * theta, phi - GAMMA_PHI * theta));
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

/// Primal-dual iterate.
struct State {
    point: Point,
    /// Row slacks, zero on equality rows.
    slack: Vec<f64>,
    y: Vec<f64>,
    zl: Vec<f64>,
    zu: Vec<f64>,
    /// Slack duals, zero on equality rows.
    v: Vec<f64>,
}

/// Factored reduced system plus what is needed to apply the full one.
struct Kkt {
    chol: CscCholesky<f64>,
    /// `W` over free variables.
    hess: Vec<(usize, usize, f64)>,
    /// `Σ + δ_w` on free variables, one on fixed ones.
    diag: Vec<f64>,
    /// Constraint block `D`.
    d: Vec<f64>,
    /// `v/s + δ_w` on inequality rows.
    slack_diag: Vec<f64>,
}

impl Kkt {
    /// Solve `[H Jᵀ; J −D]·[dx; dy] = [bx; bc]`.
    fn solve(
        &self,
        jac: &[Vec<(usize, f64)>],
        fixed: &[bool],
        bx: &[f64],
        bc: &[f64],
    ) -> Option<(Vec<f64>, Vec<f64>)> {
        let mut rhs = bx.to_vec();
        for (r, row) in jac.iter().enumerate() {
            let k = bc[r] / self.d[r];
            for &(j, a) in row {
                if !fixed[j] {
                    rhs[j] += a * k;
                }
            }
        }
        for (j, &f) in fixed.iter().enumerate() {
            if f {
                rhs[j] = 0.0;
            }
        }
        let sol = self.chol.solve(&DMatrix::from_column_slice(rhs.len(), 1, &rhs));
        let dx = sol.as_slice().to_vec();
        let dy: Vec<f64> = jac
            .iter()
            .enumerate()
            .map(|(r, row)| (free_dot(row, fixed, &dx) - bc[r]) / self.d[r])
            .collect();
        let finite = dx.iter().chain(&dy).all(|v| v.is_finite());
        finite.then_some((dx, dy))
    }

    fn apply(
        &self,
        jac: &[Vec<(usize, f64)>],
        fixed: &[bool],
        dx: &[f64],
        dy: &[f64],
    ) -> (Vec<f64>, Vec<f64>) {
        let mut ox: Vec<f64> = dx.iter().zip(&self.diag).map(|(d, s)| s * d).collect();
        for &(i, j, v) in &self.hess {
            ox[i] += v * dx[j];
        }
        let mut oc = Vec::with_capacity(jac.len());
        for (r, row) in jac.iter().enumerate() {
            for &(j, a) in row {
                if !fixed[j] {
                    ox[j] += a * dy[r];
                }
            }
            oc.push(free_dot(row, fixed, dx) - self.d[r] * dy[r]);
        }
        (ox, oc)
    }

    fn solve_refined(
        &self,
        jac: &[Vec<(usize, f64)>],
        fixed: &[bool],
        bx: &[f64],
        bc: &[f64],
    ) -> Option<(Vec<f64>, Vec<f64>)> {
        let (mut dx, mut dy) = self.solve(jac, fixed, bx, bc)?;
        for _ in 0..REFINE_STEPS {
            let (ox, oc) = self.apply(jac, fixed, &dx, &dy);
            let ex: Vec<f64> = bx
                .iter()
                .zip(&ox)
                .zip(fixed)
                .map(|((b, o), &f)| if f { 0.0 } else { b - o })
                .collect();
            let ec: Vec<f64> = bc.iter().zip(&oc).map(|(b, o)| b - o).collect();
            let (cx, cy) = self.solve(jac, fixed, &ex, &ec)?;
            dx.iter_mut().zip(cx).for_each(|(a, b)| *a += b);
            dy.iter_mut().zip(cy).for_each(|(a, b)| *a += b);
        }
        Some((dx, dy))
    }
}

fn free_dot(row: &[(usize, f64)], fixed: &[bool], x: &[f64]) -> f64 {
    row.iter()
        .filter(|&&(j, _)| !fixed[j])
        .map(|&(j, a)| a * x[j])
        .sum()
}

/// Newton direction and the quantities the line search reuses.
struct Newton {
    kkt: Kkt,
    /// `−r_x`
    bx: Vec<f64>,
    /// `y − μ/s` on inequality rows.
    rs: Vec<f64>,
    dx: Vec<f64>,
    dy: Vec<f64>,
    ds: Vec<f64>,
    dzl: Vec<f64>,
    dzu: Vec<f64>,
    dv: Vec<f64>,
}

/// Trial point that passed the filter.
struct Accepted {
    point: Point,
    slack: Vec<f64>,
    alpha: f64,
    /// Multiplier step of a second-order correction.
    dy: Option<Vec<f64>>,
    /// Whether the filter must be augmented.
    augment: bool,
}

struct Run<'c> {
    config: &'c IpConfig,
    deadline: &'c Deadline,
}

/// Per-solve data shared by every iteration.
struct Problem<'a> {
    scaled: Scaled<'a>,
    barrier: Barrier,
    ineq: Vec<bool>,
}

impl Problem<'_> {
    /// `‖c + s‖₁`
    fn theta(&self, point: &Point, slack: &[f64]) -> f64 {
        point.c.iter().zip(slack).map(|(c, s)| (c + s).abs()).sum()
    }

    /// Barrier objective, `+∞` outside the relaxed box or at a
    /// non-positive slack.
    fn phi(&self, point: &Point, slack: &[f64], mu: f64) -> f64 {
        let mut value = point.objective + self.barrier.log_barrier(&point.x, mu);
        for (r, &s) in slack.iter().enumerate() {
            if self.ineq[r] {
                if s <= 0.0 {
                    return f64::INFINITY;
                }
                value -= mu * s.ln();
            }
        }
        value
    }

    fn lagrangian_gradient(&self, state: &State) -> Vec<f64> {
        let mut g = state.point.grad_f.clone();
        for (row, &y) in state.point.jac.iter().zip(&state.y) {
            if y != 0.0 {
                for &(j, a) in row {
                    g[j] += y * a;
                }
            }
        }
        g
    }

    /// Scaled optimality error of the barrier problem at `mu` (zero gives
    /// the error of the original problem).
    fn error(&self, state: &State, grad_l: &[f64], mu: f64) -> f64 {
        let b = &self.barrier;
        let x = &state.point.x;
        let mut dual = 0.0_f64;
        let mut comp = 0.0_f64;
        for j in 0..x.len() {
            if !b.fixed[j] {
                dual = dual.max((grad_l[j] - state.zl[j] + state.zu[j]).abs());
            }
            if b.has_lower(j) {
                comp = comp.max(((x[j] - b.lower[j]) * state.zl[j] - mu).abs());
            }
            if b.has_upper(j) {
                comp = comp.max(((b.upper[j] - x[j]) * state.zu[j] - mu).abs());
            }
        }
        let mut primal = 0.0_f64;
        for r in 0..self.ineq.len() {
            primal = primal.max((state.point.c[r] + state.slack[r]).abs());
            if self.ineq[r] {
                dual = dual.max((state.y[r] - state.v[r]).abs());
                comp = comp.max((state.slack[r] * state.v[r] - mu).abs());
            }
        }

        let bound_duals: f64 = state.zl.iter().chain(&state.zu).chain(&state.v).sum();
        let bound_count = b.count() + self.ineq.iter().filter(|&&i| i).count();
        let all_duals = bound_duals + state.y.iter().map(|y| y.abs()).sum::<f64>();
        let all_count = bound_count + self.ineq.len();
        let spread = |sum: f64, count: usize| (sum / count.max(1) as f64).max(100.0) / 100.0;
        (dual / spread(all_duals, all_count))
            .max(primal)
            .max(comp / spread(bound_duals, bound_count))
    }
}

impl Run<'_> {
    fn execute(&self, nlp: &dyn NlpProblem) -> NlpOutcome {
        let cfg = self.config;
        let n = nlp.num_vars();
        let (lower, upper) = (nlp.lower_bounds(), nlp.upper_bounds());
        let raw_x0 = nlp.initial_point();
        if lower.len() != n || upper.len() != n || raw_x0.len() != n {
            return self.abort(
                raw_x0,
                TerminationStatus::Other("bound or start vector has the wrong length".into()),
            );
        }
        if lower.iter().zip(upper).any(|(l, u)| l > u) {
            return self.abort(raw_x0, TerminationStatus::Infeasible);
        }

        let x0 = push_inside(&raw_x0, lower, upper, cfg.bound_push);
        let scaled = Scaled::new(nlp, &x0);
        let point = scaled.evaluate(x0);
        if !point.is_finite() {
            return self.abort(
                point.x,
                TerminationStatus::Other("non-finite values at the initial point".into()),
            );
        }
        let ineq: Vec<bool> = scaled
            .kinds
            .iter()
            .map(|&k| k == RowKind::Inequality)
            .collect();
        let problem = Problem {
            barrier: Barrier::new(lower, upper, cfg.bound_relax),
            scaled,
            ineq,
        };

        let m = problem.ineq.len();
        let b = &problem.barrier;
        let mut state = State {
            slack: (0..m)
                .map(|r| if problem.ineq[r] { (-point.c[r]).max(SLACK_FLOOR) } else { 0.0 })
                .collect(),
            y: vec![0.0; m],
            zl: (0..n).map(|j| if b.has_lower(j) { 1.0 } else { 0.0 }).collect(),
            zu: (0..n).map(|j| if b.has_upper(j) { 1.0 } else { 0.0 }).collect(),
            v: problem.ineq.iter().map(|&i| if i { 1.0 } else { 0.0 }).collect(),
            point,
        };

        let theta0 = problem.theta(&state.point, &state.slack).max(1.0);
        let (theta_max, theta_min) = (THETA_MAX_FACTOR * theta0, THETA_MIN_FACTOR * theta0);
        let mut filter = Filter::default();
        let mut mu = cfg.mu_init;
        let mut subproblems = 1;
        let mut last_shift = 0.0;
        let mut iterations = 0;

        loop {
            let done = (iterations, subproblems);
            if self.deadline.expired() {
                return self.finish(&problem, state.point, TerminationStatus::TimeLimit, done);
            }
            let grad_l = problem.lagrangian_gradient(&state);
            let error = problem.error(&state, &grad_l, 0.0);
            let violation = problem.scaled.violation(&state.point);
            if error <= cfg.tol && violation <= cfg.feas_tol {
                return self.finish(&problem, state.point, TerminationStatus::Optimal, done);
            }
            if iterations >= cfg.max_iter {
                let status = TerminationStatus::Other("iteration limit reached".into());
                return self.finish(&problem, state.point, status, done);
            }
            let mu_floor = cfg.tol / 10.0;
            while mu > mu_floor
                && problem.error(&state, &grad_l, mu) <= cfg.barrier_tol_factor * mu
            {
                mu = (0.2 * mu).min(mu.powf(1.5)).max(mu_floor);
                subproblems += 1;
                filter.clear();
            }
            let tau = TAU_MIN.max(1.0 - mu);

            let done = (iterations, subproblems);
            let Some(newton) = self.direction(&problem, &state, &grad_l, mu, &mut last_shift) else {
                let status = TerminationStatus::Other("KKT matrix could not be factored".into());
                return self.finish(&problem, state.point, status, done);
            };
            let alpha_max = b
                .max_step(&state.point.x, &newton.dx, tau)
                .min(positive_step(&state.slack, &newton.ds, |r| problem.ineq[r], tau));
            let alpha_dual = positive_step(&state.zl, &newton.dzl, |j| b.has_lower(j), tau)
                .min(positive_step(&state.zu, &newton.dzu, |j| b.has_upper(j), tau))
                .min(positive_step(&state.v, &newton.dv, |r| problem.ineq[r], tau));

            let search = self.line_search(
                &problem, &state, &newton, mu, tau, alpha_max, &filter, theta_min, theta_max,
            );
            let Some(accepted) = search else {
                let status = if violation > cfg.infeasible_violation {
                    TerminationStatus::Infeasible
                } else {
                    TerminationStatus::Other("line search stalled".into())
                };
                return self.finish(&problem, state.point, status, done);
            };
            if accepted.augment {
                filter.augment(
                    problem.theta(&state.point, &state.slack),
                    problem.phi(&state.point, &state.slack, mu),
                );
            }
            debug!(
                iteration = iterations,
                objective = state.point.objective / problem.scaled.obj_scale,
                violation,
                error,
                mu,
                shift = last_shift,
                alpha = accepted.alpha,
                "interior point iteration"
            );

            let alpha = accepted.alpha;
            let dy = accepted.dy.as_ref().unwrap_or(&newton.dy);
            state.y.iter_mut().zip(dy).for_each(|(y, d)| *y += alpha * d);
            state.point = accepted.point;
            state.slack = accepted.slack;
            let x = &state.point.x;
            let clamp =
                |z: f64, gap: f64| z.max(mu / (DUAL_SPREAD * gap)).min(DUAL_SPREAD * mu / gap);
            for j in 0..n {
                if b.has_lower(j) {
                    state.zl[j] =
                        clamp(state.zl[j] + alpha_dual * newton.dzl[j], x[j] - b.lower[j]);
                }
                if b.has_upper(j) {
                    state.zu[j] =
                        clamp(state.zu[j] + alpha_dual * newton.dzu[j], b.upper[j] - x[j]);
                }
            }
            for r in 0..m {
                if problem.ineq[r] {
                    state.v[r] = clamp(state.v[r] + alpha_dual * newton.dv[r], state.slack[r]);
                }
            }
            iterations += 1;
        }
    }

    /// Newton direction at `state` with the smallest primal shift that
    /// gives the reduced matrix a Cholesky factorization.
    fn direction(
        &self,
        problem: &Problem<'_>,
        state: &State,
        grad_l: &[f64],
        mu: f64,
        last_shift: &mut f64,
    ) -> Option<Newton> {
        let b = &problem.barrier;
        let point = &state.point;
        let (x, n, m) = (&point.x, point.x.len(), point.c.len());
        let fixed = &b.fixed;

        let mut hess = Vec::new();
        problem.scaled.lagrangian_hessian(x, &state.y, &mut hess);
        hess.retain(|&(i, j, v)| !fixed[i] && !fixed[j] && v != 0.0);

        let mut sigma = vec![0.0; n];
        let mut bx = vec![0.0; n];
        for j in 0..n {
            if fixed[j] {
                continue;
            }
            let mut r = grad_l[j];
            if b.has_lower(j) {
                let gap = x[j] - b.lower[j];
                sigma[j] += state.zl[j] / gap;
                r -= mu / gap;
            }
            if b.has_upper(j) {
                let gap = b.upper[j] - x[j];
                sigma[j] += state.zu[j] / gap;
                r += mu / gap;
            }
            bx[j] = -r;
        }
        let rs: Vec<f64> = (0..m)
            .map(|r| if problem.ineq[r] { state.y[r] - mu / state.slack[r] } else { 0.0 })
            .collect();
        let rc: Vec<f64> = point.c.iter().zip(&state.slack).map(|(c, s)| c + s).collect();

        let mut shift = 0.0;
        let kkt = loop {
            if let Some(kkt) = self.factor(problem, state, &hess, &sigma, shift) {
                break kkt;
            }
            shift = if shift == 0.0 {
                if *last_shift == 0.0 { SHIFT_FIRST } else { (*last_shift / 3.0).max(SHIFT_MIN) }
            } else if *last_shift == 0.0 {
                100.0 * shift
            } else {
                8.0 * shift
            };
            if shift > SHIFT_MAX {
                return None;
            }
        };
        *last_shift = shift;

        let bc: Vec<f64> = (0..m)
            .map(|r| {
                if problem.ineq[r] {
                    -(rc[r] - rs[r] / kkt.slack_diag[r])
                } else {
                    -rc[r]
                }
            })
            .collect();
        let (dx, dy) = kkt.solve_refined(&point.jac, fixed, &bx, &bc)?;
        let ds: Vec<f64> = (0..m)
            .map(|r| if problem.ineq[r] { (-rs[r] - dy[r]) / kkt.slack_diag[r] } else { 0.0 })
            .collect();

        let mut dzl = vec![0.0; n];
        let mut dzu = vec![0.0; n];
        for j in 0..n {
            if b.has_lower(j) {
                let gap = x[j] - b.lower[j];
                dzl[j] = mu / gap - state.zl[j] - state.zl[j] / gap * dx[j];
            }
            if b.has_upper(j) {
                let gap = b.upper[j] - x[j];
                dzu[j] = mu / gap - state.zu[j] + state.zu[j] / gap * dx[j];
            }
        }
        let dv: Vec<f64> = (0..m)
            .map(|r| {
                if problem.ineq[r] {
                    let (s, v) = (state.slack[r], state.v[r]);
                    mu / s - v - v / s * ds[r]
                } else {
                    0.0
                }
            })
            .collect();

        Some(Newton {
            kkt,
            bx,
            rs,
            dx,
            dy,
            ds,
            dzl,
            dzu,
            dv,
        })
    }

    fn factor(
        &self,
        problem: &Problem<'_>,
        state: &State,
        hess: &[(usize, usize, f64)],
        sigma: &[f64],
        shift: f64,
    ) -> Option<Kkt> {
        let fixed = &problem.barrier.fixed;
        let n = fixed.len();
        let slack_diag: Vec<f64> = (0..problem.ineq.len())
            .map(|r| if problem.ineq[r] { state.v[r] / state.slack[r] + shift } else { 0.0 })
            .collect();
        let d: Vec<f64> = slack_diag
            .iter()
            .zip(&problem.ineq)
            .map(|(&sd, &i)| if i { 1.0 / sd + ROW_REGULARIZATION } else { ROW_REGULARIZATION })
            .collect();
        let diag: Vec<f64> = (0..n)
            .map(|j| if fixed[j] { 1.0 } else { sigma[j] + shift })
            .collect();

        let mut coo = CooMatrix::new(n, n);
        for &(i, j, v) in hess {
            coo.push(i, j, v);
        }
        for (j, &v) in diag.iter().enumerate() {
            coo.push(j, j, v);
        }
        for (row, &dr) in state.point.jac.iter().zip(&d) {
            let k = 1.0 / dr;
            for &(i, a) in row.iter().filter(|&&(i, _)| !fixed[i]) {
                for &(j, c) in row.iter().filter(|&&(j, _)| !fixed[j]) {
                    coo.push(i, j, k * a * c);
                }
            }
        }
        let chol = CscCholesky::factor(&CscMatrix::from(&coo)).ok()?;
        Some(Kkt {
            chol,
            hess: hess.to_vec(),
            diag,
            d,
            slack_diag,
        })
    }

    /// Backtracking filter line search from `alpha_max`, with second-order
    /// corrections on a rejected full step.
    #[allow(clippy::too_many_arguments)]
    fn line_search(
        &self,
        problem: &Problem<'_>,
        state: &State,
        newton: &Newton,
        mu: f64,
        tau: f64,
        alpha_max: f64,
        filter: &Filter,
        theta_min: f64,
        theta_max: f64,
    ) -> Option<Accepted> {
        let b = &problem.barrier;
        let x = &state.point.x;
        let theta = problem.theta(&state.point, &state.slack);
        let phi = problem.phi(&state.point, &state.slack, mu);

        // Directional derivative of the barrier objective.
        let mut slope = 0.0;
        for (j, &d) in newton.dx.iter().enumerate() {
            if b.fixed[j] {
                continue;
            }
            let mut g = state.point.grad_f[j];
            if b.has_lower(j) {
                g -= mu / (x[j] - b.lower[j]);
            }
            if b.has_upper(j) {
                g += mu / (b.upper[j] - x[j]);
            }
            slope += g * d;
        }
        for (r, &ds) in newton.ds.iter().enumerate() {
            if problem.ineq[r] {
                slope -= mu / state.slack[r] * ds;
            }
        }

        let descent = slope < 0.0;
        let alpha_min = if descent {
            let by_theta = GAMMA_THETA * theta / -slope;
            let by_switch = 1e-4 * theta.powf(SWITCH_THETA) / (-slope).powf(SWITCH_PHI);
            (0.05 * GAMMA_THETA.min(by_theta).min(by_switch)).max(ALPHA_FLOOR)
        } else {
            0.05 * GAMMA_THETA
        };
        // Some(augment) when (θ, φ) at step α is acceptable.
        let acceptable = |alpha: f64, t: f64, p: f64| -> Option<bool> {
            if !p.is_finite() || t > theta_max {
                return None;
            }
            let switching = descent && alpha * (-slope).powf(SWITCH_PHI) > theta.powf(SWITCH_THETA);
            if theta <= theta_min && switching {
                (p <= phi + ARMIJO * alpha * slope).then_some(false)
            } else {
                let progress = t <= (1.0 - GAMMA_THETA) * theta || p <= phi - GAMMA_PHI * theta;
                (progress && !filter.blocks(t, p)).then_some(true)
            }
        };
        let slack_at = |ds: &[f64], alpha: f64| -> Vec<f64> {
            state
                .slack
                .iter()
                .zip(ds)
                .zip(&problem.ineq)
                .map(|((s, d), &i)| if i { s + alpha * d } else { 0.0 })
                .collect()
        };

        let mut alpha = alpha_max;
        while alpha >= alpha_min {
            let trial_x: Vec<f64> = x.iter().zip(&newton.dx).map(|(v, d)| v + alpha * d).collect();
            let slack = slack_at(&newton.ds, alpha);
            let trial = problem.scaled.evaluate(trial_x);
            if trial.is_finite() {
                let t = problem.theta(&trial, &slack);
                let p = problem.phi(&trial, &slack, mu);
                if let Some(augment) = acceptable(alpha, t, p) {
                    return Some(Accepted {
                        point: trial,
                        slack,
                        alpha,
                        dy: None,
                        augment,
                    });
                }
                if alpha == alpha_max && self.config.max_soc > 0 {
                    let corrected = self.second_order(
                        problem, state, newton, mu, tau, alpha, &trial, &slack, &acceptable,
                    );
                    if corrected.is_some() {
                        return corrected;
                    }
                }
            }
            alpha *= 0.5;
        }
        None
    }

    /// Re-solve with the constraint residual of the rejected trial folded
    /// in, keeping the factorization.
    #[allow(clippy::too_many_arguments)]
    fn second_order(
        &self,
        problem: &Problem<'_>,
        state: &State,
        newton: &Newton,
        mu: f64,
        tau: f64,
        alpha: f64,
        trial: &Point,
        trial_slack: &[f64],
        acceptable: &dyn Fn(f64, f64, f64) -> Option<bool>,
    ) -> Option<Accepted> {
        let b = &problem.barrier;
        let jac = &state.point.jac;
        let ineq = &problem.ineq;
        let m = ineq.len();
        let mut residual: Vec<f64> = (0..m)
            .map(|r| {
                alpha * (state.point.c[r] + state.slack[r]) + trial.c[r] + trial_slack[r]
            })
            .collect();
        let mut previous = problem.theta(trial, trial_slack);
        for _ in 0..self.config.max_soc {
            let bc: Vec<f64> = (0..m)
                .map(|r| {
                    if ineq[r] {
                        -(residual[r] - newton.rs[r] / newton.kkt.slack_diag[r])
                    } else {
                        -residual[r]
                    }
                })
                .collect();
            let (dx, dy) = newton.kkt.solve(jac, &b.fixed, &newton.bx, &bc)?;
            let ds: Vec<f64> = (0..m)
                .map(|r| {
                    if ineq[r] {
                        (-newton.rs[r] - dy[r]) / newton.kkt.slack_diag[r]
                    } else {
                        0.0
                    }
                })
                .collect();
            let step = b
                .max_step(&state.point.x, &dx, tau)
                .min(positive_step(&state.slack, &ds, |r| ineq[r], tau));
            let x: Vec<f64> = state.point.x.iter().zip(&dx).map(|(v, d)| v + step * d).collect();
            let slack: Vec<f64> = (0..m)
                .map(|r| if ineq[r] { state.slack[r] + step * ds[r] } else { 0.0 })
                .collect();
            let point = problem.scaled.evaluate(x);
            if !point.is_finite() {
                return None;
            }
            let t = problem.theta(&point, &slack);
            if let Some(augment) = acceptable(alpha, t, problem.phi(&point, &slack, mu)) {
                return Some(Accepted {
                    point,
                    slack,
                    alpha: step,
                    dy: Some(dy),
                    augment,
                });
            }
            if t > 0.99 * previous {
                return None;
            }
            previous = t;
            for r in 0..m {
                residual[r] = step * residual[r] + point.c[r] + slack[r];
            }
        }
        None
    }

    fn finish(
        &self,
        problem: &Problem<'_>,
        point: Point,
        status: TerminationStatus,
        (iterations, subproblems): (usize, usize),
    ) -> NlpOutcome {
        let violation = problem.scaled.violation(&point);
        let objective = point.objective / problem.scaled.obj_scale;
        info!(
            %status,
            objective,
            violation,
            iterations,
            subproblems,
            "interior point finished"
        );
        NlpOutcome {
            status,
            x: point.x,
            objective,
            violation,
            iterations,
            outer_iterations: subproblems,
            wall_time_s: self.deadline.elapsed_s(),
        }
    }

    fn abort(&self, x: Vec<f64>, status: TerminationStatus) -> NlpOutcome {
        info!(%status, "interior point stopped before iterating");
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
