//! Wall-clock helpers for solver caps and run summaries.

use std::time::{Duration, Instant};

/// A started timer with a label for diagnostics.
#[derive(Clone, Debug)]
pub struct Stopwatch {
    label: &'static str,
    start: Instant,
}

impl Stopwatch {
    /// Create and start a stopwatch.
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Elapsed time in seconds.
    pub fn elapsed_s(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Optional wall-clock budget.
///
/// `Deadline::none()` never expires, so callers can check unconditionally.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn after(budget: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    pub fn none() -> Self {
        Self::after(None)
    }

    pub fn expired(&self) -> bool {
        match self.budget {
            Some(budget) => self.start.elapsed() >= budget,
            None => false,
        }
    }

    pub fn elapsed_s(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_deadline_never_expires() {
        let d = Deadline::none();
        assert!(!d.expired());
    }

    #[test]
    fn zero_budget_expires_immediately() {
        let d = Deadline::after(Some(Duration::ZERO));
        assert!(d.expired());
    }

    #[test]
    fn stopwatch_is_monotone() {
        let w = Stopwatch::start("test");
        let a = w.elapsed_s();
        let b = w.elapsed_s();
        assert!(b >= a);
        assert_eq!(w.label(), "test");
    }
}
