//! Bisection on the maneuver duration.
//!
//! The solver is used as a feasibility oracle: the search keeps a bracket
//! `[tf_min, tf_max]` plus the shortest horizon proven optimal so far
//! (`best`), and always solves at `tf_max`. Both branches preserve
//! `best - tf_max == tf_max - tf_min`, so every solve halves the bracket.

use crate::error::{AppError, AppResult};
use crate::progress::{SearchProgressEvent, SearchStage};
use hf_core::Stopwatch;
use hf_model::{DynamicModel, ModelResult};
use hf_solver::{NlpSolver, SolveResult, TerminationStatus, solve_with_guess};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Anything the search can classify.
pub trait Trial {
    fn status(&self) -> &TerminationStatus;

    fn objective(&self) -> Option<f64>;
}

impl Trial for SolveResult {
    fn status(&self) -> &TerminationStatus {
        &self.status
    }

    fn objective(&self) -> Option<f64> {
        self.objective_value
    }
}

/// What to do when a solve is neither optimal nor infeasible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndeterminatePolicy {
    /// Stop with [`AppError::Indeterminate`].
    #[default]
    Abort,
    /// Shrink the bracket as if the horizon were infeasible. The trial
    /// keeps its real status.
    TreatAsInfeasible,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchOptions {
    pub policy: IndeterminatePolicy,
    pub max_iterations: usize,
    /// Seed each solve with the last optimal trajectory.
    pub warm_start: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            policy: IndeterminatePolicy::Abort,
            max_iterations: 64,
            warm_start: false,
        }
    }
}

/// Initial search interval and the width at which the search stops.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bracket {
    pub tf_min: f64,
    pub tf_max: f64,
    pub tol: f64,
}

impl Bracket {
    pub fn new(tf_min: f64, tf_max: f64, tol: f64) -> AppResult<Self> {
        let bracket = Self {
            tf_min,
            tf_max,
            tol,
        };
        bracket.validate()?;
        Ok(bracket)
    }

    pub fn validate(&self) -> AppResult<()> {
        if !(self.tf_min.is_finite() && self.tf_max.is_finite() && self.tol.is_finite()) {
            return Err(AppError::InvalidInput(format!(
                "search bracket must be finite, got [{}, {}] tol {}",
                self.tf_min, self.tf_max, self.tol
            )));
        }
        if !(0.0 <= self.tf_min && self.tf_min < self.tf_max) {
            return Err(AppError::InvalidInput(format!(
                "search bracket must satisfy 0 <= tf_min < tf_max, got [{}, {}]",
                self.tf_min, self.tf_max
            )));
        }
        if self.tol <= 0.0 {
            return Err(AppError::InvalidInput(format!(
                "search tolerance must be positive, got {}",
                self.tol
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.tf_max - self.tf_min
    }
}

/// One oracle call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchTrial {
    pub tf: f64,
    pub status: TerminationStatus,
    pub objective: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct SearchOutcome<T> {
    /// Shortest horizon with an optimal solve.
    pub tf_star: f64,
    /// The optimal solve at `tf_star`.
    pub result: T,
    /// Final bracket; `tf_max - tf_min < tol`.
    pub tf_min: f64,
    pub tf_max: f64,
    pub iterations: usize,
    /// Every oracle call in order.
    pub trials: Vec<SearchTrial>,
}

/// Bisect with an arbitrary oracle.
///
/// `oracle(tf, warm)` gets the last optimal result as `warm` when
/// `options.warm_start` is set.
pub fn bisect_with<T, F>(
    bracket: Bracket,
    options: &SearchOptions,
    oracle: F,
) -> AppResult<SearchOutcome<T>>
where
    T: Trial,
    F: FnMut(f64, Option<&T>) -> AppResult<T>,
{
    bisect_with_progress(bracket, options, oracle, None)
}

fn emit(
    progress_cb: &mut Option<&mut dyn FnMut(SearchProgressEvent)>,
    stage: SearchStage,
    iteration: usize,
    tf: f64,
    (tf_min, tf_max): (f64, f64),
    status: Option<TerminationStatus>,
    clock: &Stopwatch,
) {
    if let Some(cb) = progress_cb.as_deref_mut() {
        cb(SearchProgressEvent {
            stage,
            iteration,
            tf,
            tf_min,
            tf_max,
            status,
            elapsed_wall_s: clock.elapsed_s(),
        });
    }
}

/// [`bisect_with`] reporting every step to `progress_cb`.
pub fn bisect_with_progress<T, F>(
    bracket: Bracket,
    options: &SearchOptions,
    mut oracle: F,
    mut progress_cb: Option<&mut dyn FnMut(SearchProgressEvent)>,
) -> AppResult<SearchOutcome<T>>
where
    T: Trial,
    F: FnMut(f64, Option<&T>) -> AppResult<T>,
{
    bracket.validate()?;
    if options.max_iterations == 0 {
        return Err(AppError::InvalidInput(
            "max_iterations must be at least 1".into(),
        ));
    }

    let clock = Stopwatch::start("search");
    let (mut lo, mut hi) = (bracket.tf_min, bracket.tf_max);
    let mut best: Option<(f64, T)> = None;
    let mut trials = Vec::new();
    let mut iterations = 0;

    loop {
        if iterations == options.max_iterations {
            return Err(AppError::SearchNotConverged {
                tf_min: lo,
                tf_max: hi,
                iterations,
            });
        }
        iterations += 1;
        let tf = hi;
        emit(&mut progress_cb, SearchStage::Solving, iterations, tf, (lo, hi), None, &clock);

        let warm = if options.warm_start {
            best.as_ref().map(|(_, r)| r)
        } else {
            None
        };
        let result = oracle(tf, warm)?;
        let status = result.status().clone();
        trials.push(SearchTrial {
            tf,
            status: status.clone(),
            objective: result.objective(),
        });
        debug!(iteration = iterations, tf, status = %status, "search trial");

        let feasible = if status.is_optimal() {
            true
        } else if status.is_infeasible() {
            false
        } else {
            match options.policy {
                IndeterminatePolicy::Abort => {
                    emit(
                        &mut progress_cb,
                        SearchStage::Indeterminate,
                        iterations,
                        tf,
                        (lo, hi),
                        Some(status.clone()),
                        &clock,
                    );
                    return Err(AppError::Indeterminate {
                        tf,
                        status,
                        tf_min: lo,
                        tf_max: hi,
                    });
                }
                IndeterminatePolicy::TreatAsInfeasible => {
                    warn!(tf, status = %status, "indeterminate solve treated as infeasible");
                    false
                }
            }
        };

        if feasible {
            hi = 0.5 * (lo + hi);
            best = Some((tf, result));
        } else {
            let Some((best_tf, _)) = &best else {
                if status.is_infeasible() {
                    return Err(AppError::UpperBoundInfeasible { tf, status });
                }
                return Err(AppError::UpperBoundNotOptimal { tf, status });
            };
            hi = 0.5 * (tf + best_tf);
            lo = tf;
        }
        let stage = if feasible {
            SearchStage::Feasible
        } else {
            SearchStage::Infeasible
        };
        emit(&mut progress_cb, stage, iterations, tf, (lo, hi), Some(status), &clock);

        if hi - lo < bracket.tol {
            break;
        }
    }

    let Some((tf_star, result)) = best else {
        return Err(AppError::SearchNotConverged {
            tf_min: lo,
            tf_max: hi,
            iterations,
        });
    };
    emit(
        &mut progress_cb,
        SearchStage::Converged,
        iterations,
        tf_star,
        (lo, hi),
        Some(TerminationStatus::Optimal),
        &clock,
    );
    info!(tf_star, tf_min = lo, tf_max = hi, iterations, "search converged");
    Ok(SearchOutcome {
        tf_star,
        result,
        tf_min: lo,
        tf_max: hi,
        iterations,
        trials,
    })
}

/// Shortest horizon in `bracket` for which `builder`'s model solves to
/// optimality on `n_nodes` intervals.
pub fn find_minimal_feasible_duration(
    builder: &dyn Fn(f64) -> ModelResult<DynamicModel>,
    bracket: Bracket,
    n_nodes: usize,
    solver: &dyn NlpSolver,
    options: &SearchOptions,
) -> AppResult<SearchOutcome<SolveResult>> {
    find_minimal_feasible_duration_with_progress(builder, bracket, n_nodes, solver, options, None)
}

pub fn find_minimal_feasible_duration_with_progress(
    builder: &dyn Fn(f64) -> ModelResult<DynamicModel>,
    bracket: Bracket,
    n_nodes: usize,
    solver: &dyn NlpSolver,
    options: &SearchOptions,
    progress_cb: Option<&mut dyn FnMut(SearchProgressEvent)>,
) -> AppResult<SearchOutcome<SolveResult>> {
    let oracle = |tf: f64, warm: Option<&SolveResult>| -> AppResult<SolveResult> {
        let model = builder(tf)?;
        let result = solve_with_guess(&model, n_nodes, solver, warm.map(|r| &r.trajectory))?;
        Ok(result)
    };
    bisect_with_progress(bracket, options, oracle, progress_cb)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted oracle verdict.
    #[derive(Debug)]
    struct Verdict(TerminationStatus);

    impl Trial for Verdict {
        fn status(&self) -> &TerminationStatus {
            &self.0
        }

        fn objective(&self) -> Option<f64> {
            self.0.is_optimal().then_some(1.0)
        }
    }

    fn threshold(t: f64) -> impl FnMut(f64, Option<&Verdict>) -> AppResult<Verdict> {
        move |tf, _| {
            Ok(Verdict(if tf >= t {
                TerminationStatus::Optimal
            } else {
                TerminationStatus::Infeasible
            }))
        }
    }

    #[test]
    fn three_seconds_to_a_centisecond_takes_nine_solves() {
        let bracket = Bracket::new(0.0, 3.0, 1e-2).unwrap();
        let out = bisect_with(bracket, &SearchOptions::default(), threshold(1.234)).unwrap();
        assert_eq!(out.iterations, 9);
        assert_eq!(out.trials.len(), 9);
        assert!(out.tf_max - out.tf_min < 1e-2);
        assert!(out.tf_star >= 1.234);
        assert!(out.tf_star - 1.234 < 2e-2);
        assert!(out.result.0.is_optimal());
    }

    #[test]
    fn first_trial_is_the_upper_bound() {
        let bracket = Bracket::new(0.5, 2.0, 0.1).unwrap();
        let out = bisect_with(bracket, &SearchOptions::default(), threshold(0.0)).unwrap();
        assert_eq!(out.trials[0].tf, 2.0);
        // Everything feasible: the bracket collapses onto tf_min.
        assert!(out.tf_star - 0.5 < 0.2);
        assert!(out.trials.iter().all(|t| t.status.is_optimal()));
    }

    #[test]
    fn infeasible_upper_bound_is_an_error() {
        let bracket = Bracket::new(0.0, 1.0, 0.01).unwrap();
        let err = bisect_with(bracket, &SearchOptions::default(), threshold(5.0)).unwrap_err();
        assert!(matches!(
            err,
            AppError::UpperBoundInfeasible {
                tf,
                status: TerminationStatus::Infeasible
            } if tf == 1.0
        ));
    }

    #[test]
    fn undecided_upper_bound_is_not_reported_as_infeasible() {
        let options = SearchOptions {
            policy: IndeterminatePolicy::TreatAsInfeasible,
            ..SearchOptions::default()
        };
        let bracket = Bracket::new(0.0, 0.8, 0.01).unwrap();
        let err = bisect_with(bracket, &options, flaky).unwrap_err();
        assert!(matches!(
            err,
            AppError::UpperBoundNotOptimal {
                tf,
                status: TerminationStatus::TimeLimit
            } if tf == 0.8
        ));
    }

    /// Optimal above 1.0, time limit in [0.6, 1.0), infeasible below.
    fn flaky(tf: f64, _: Option<&Verdict>) -> AppResult<Verdict> {
        Ok(Verdict(if tf >= 1.0 {
            TerminationStatus::Optimal
        } else if tf >= 0.6 {
            TerminationStatus::TimeLimit
        } else {
            TerminationStatus::Infeasible
        }))
    }

    #[test]
    fn indeterminate_aborts_by_default() {
        let bracket = Bracket::new(0.0, 2.0, 0.01).unwrap();
        let err = bisect_with(bracket, &SearchOptions::default(), flaky).unwrap_err();
        match err {
            AppError::Indeterminate {
                tf,
                status,
                tf_min,
                tf_max,
            } => {
                // 2.0 and 1.0 optimal, 0.5 infeasible, then 0.75 times out.
                assert_eq!(tf, 0.75);
                assert_eq!(status, TerminationStatus::TimeLimit);
                assert_eq!((tf_min, tf_max), (0.5, 0.75));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn indeterminate_can_be_treated_as_infeasible() {
        let options = SearchOptions {
            policy: IndeterminatePolicy::TreatAsInfeasible,
            ..SearchOptions::default()
        };
        let bracket = Bracket::new(0.0, 2.0, 0.01).unwrap();
        let out = bisect_with(bracket, &options, flaky).unwrap();
        assert!(out.tf_star >= 1.0);
        assert!(
            out.trials
                .iter()
                .any(|t| t.status == TerminationStatus::TimeLimit)
        );
        assert!(out.tf_max - out.tf_min < 0.01);
    }

    #[test]
    fn iteration_cap_reports_last_interval() {
        let options = SearchOptions {
            max_iterations: 3,
            ..SearchOptions::default()
        };
        let bracket = Bracket::new(0.0, 8.0, 0.01).unwrap();
        let err = bisect_with(bracket, &options, threshold(0.0)).unwrap_err();
        assert!(matches!(
            err,
            AppError::SearchNotConverged {
                tf_min,
                tf_max,
                iterations: 3
            } if tf_min == 0.0 && tf_max == 1.0
        ));
    }

    #[test]
    fn oracle_errors_propagate() {
        let bracket = Bracket::new(0.0, 1.0, 0.1).unwrap();
        let err = bisect_with(bracket, &SearchOptions::default(), |_, _: Option<&Verdict>| {
            Err(AppError::Model("bad horizon".into()))
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Model(_)));
    }

    #[test]
    fn bad_brackets_are_rejected() {
        assert!(Bracket::new(1.0, 1.0, 0.1).is_err());
        assert!(Bracket::new(-1.0, 1.0, 0.1).is_err());
        assert!(Bracket::new(0.0, 1.0, 0.0).is_err());
        assert!(Bracket::new(0.0, f64::INFINITY, 0.1).is_err());
        let options = SearchOptions {
            max_iterations: 0,
            ..SearchOptions::default()
        };
        let bracket = Bracket::new(0.0, 1.0, 0.1).unwrap();
        assert!(matches!(
            bisect_with(bracket, &options, threshold(0.5)),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn warm_start_passes_last_optimal() {
        let options = SearchOptions {
            warm_start: true,
            ..SearchOptions::default()
        };
        let mut warm_seen = Vec::new();
        let bracket = Bracket::new(0.0, 1.0, 0.2).unwrap();
        bisect_with(bracket, &options, |tf, warm: Option<&Verdict>| {
            warm_seen.push(warm.is_some());
            Ok(Verdict(if tf >= 0.4 {
                TerminationStatus::Optimal
            } else {
                TerminationStatus::Infeasible
            }))
        })
        .unwrap();
        assert!(!warm_seen[0]);
        assert!(warm_seen[1..].iter().all(|&w| w));
    }

    #[test]
    fn progress_reports_each_solve() {
        let mut events = Vec::new();
        let mut cb = |e: SearchProgressEvent| events.push(e);
        let bracket = Bracket::new(0.0, 1.0, 0.1).unwrap();
        let out = bisect_with_progress(
            bracket,
            &SearchOptions::default(),
            threshold(0.3),
            Some(&mut cb),
        )
        .unwrap();
        let solving = events
            .iter()
            .filter(|e| e.stage == SearchStage::Solving)
            .count();
        assert_eq!(solving, out.iterations);
        let last = events.last().unwrap();
        assert_eq!(last.stage, SearchStage::Converged);
        assert!(last.width() < 0.1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn halves_every_step(
                tf_min in 0.0..5.0f64,
                width in 0.05..10.0f64,
                ratio in 5.0..5000.0f64,
                cut in 0.0..1.0f64,
            ) {
                let tf_max = tf_min + width;
                let tol = width / ratio;
                let t = tf_min + cut * width;
                let bracket = Bracket::new(tf_min, tf_max, tol).unwrap();
                let out = bisect_with(bracket, &SearchOptions::default(), threshold(t)).unwrap();

                let bound = ratio.log2().floor() as usize + 1;
                prop_assert!(out.iterations <= bound, "{} > {}", out.iterations, bound);
                prop_assert!(out.tf_max - out.tf_min < tol);
                prop_assert!(out.tf_star >= t);
                prop_assert!(out.tf_star - t.max(tf_min) < 2.0 * tol + 1e-12);
                for trial in &out.trials {
                    if trial.status.is_infeasible() {
                        prop_assert!(trial.tf < out.tf_star);
                    }
                }
            }
        }
    }
}
