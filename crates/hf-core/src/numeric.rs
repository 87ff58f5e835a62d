use crate::{HfError, HfResult};

/// Floating point type used throughout the system
pub type Real = f64;

/// Absolute/relative tolerance pair
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> HfResult<Real> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(HfError::NonFinite { what, value: v })
    }
}

/// `n + 1` uniformly spaced points covering `[0, tf]`.
///
/// The last point is exactly `tf` so terminal constraints see the horizon
/// end without round-off.
pub fn uniform_grid(tf: Real, n: usize) -> HfResult<Vec<Real>> {
    ensure_finite(tf, "horizon")?;
    if tf <= 0.0 {
        return Err(HfError::InvalidArg {
            what: "horizon must be positive",
        });
    }
    if n == 0 {
        return Err(HfError::InvalidArg {
            what: "grid needs at least one interval",
        });
    }
    let dt = tf / n as Real;
    let mut grid: Vec<Real> = (0..=n).map(|i| i as Real * dt).collect();
    grid[n] = tf;
    Ok(grid)
}

/// Clamp `v` into `[lower, upper]`; infinite ends are open.
pub fn project(v: Real, lower: Real, upper: Real) -> Real {
    v.max(lower).min(upper)
}

/// Infinity norm; zero for an empty slice.
pub fn inf_norm(v: &[Real]) -> Real {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

/// Linear interpolation of `(xs, ys)` at `x`, clamped to the end values.
///
/// `xs` must be sorted ascending and the same length as `ys`.
pub fn interp_linear(xs: &[Real], ys: &[Real], x: Real) -> HfResult<Real> {
    if xs.is_empty() || xs.len() != ys.len() {
        return Err(HfError::InvalidArg {
            what: "interpolation table",
        });
    }
    if x <= xs[0] {
        return Ok(ys[0]);
    }
    let last = xs.len() - 1;
    if x >= xs[last] {
        return Ok(ys[last]);
    }
    let hi = xs.partition_point(|&xi| xi <= x);
    let lo = hi - 1;
    let span = xs[hi] - xs[lo];
    if span <= 0.0 {
        return Ok(ys[lo]);
    }
    let w = (x - xs[lo]) / span;
    Ok(ys[lo] + w * (ys[hi] - ys[lo]))
}
