//! Node-by-node values of a solved (or partially solved) model.

use crate::error::{SolverError, SolverResult};
use hf_core::interp_linear;
use serde::{Deserialize, Serialize};

/// Node times plus one column of values per declared variable.
///
/// Columns follow the model's declaration order; time-invariant
/// coefficients repeat the same value on every node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    names: Vec<String>,
    times: Vec<f64>,
    columns: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn from_columns(
        names: Vec<String>,
        times: Vec<f64>,
        columns: Vec<Vec<f64>>,
    ) -> SolverResult<Self> {
        if names.len() != columns.len() {
            return Err(SolverError::DimensionMismatch {
                what: "trajectory columns".into(),
                expected: names.len(),
                got: columns.len(),
            });
        }
        if let Some(bad) = columns.iter().find(|c| c.len() != times.len()) {
            return Err(SolverError::DimensionMismatch {
                what: "trajectory column length".into(),
                expected: times.len(),
                got: bad.len(),
            });
        }
        if times.windows(2).any(|w| w[0] > w[1]) {
            return Err(SolverError::ProblemSetup {
                what: "trajectory times must be ascending".into(),
            });
        }
        Ok(Self {
            names,
            times,
            columns,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let k = self.names.iter().position(|n| n == name)?;
        Some(&self.columns[k])
    }

    pub fn value(&self, name: &str, node: usize) -> Option<f64> {
        self.column(name)?.get(node).copied()
    }

    pub fn final_value(&self, name: &str) -> Option<f64> {
        self.column(name)?.last().copied()
    }

    /// `(time, [(name, value)])` for every node in order.
    pub fn rows(&self) -> impl Iterator<Item = (f64, Vec<(&str, f64)>)> + '_ {
        self.times.iter().enumerate().map(move |(i, &t)| {
            let values = self
                .names
                .iter()
                .zip(&self.columns)
                .map(|(n, c)| (n.as_str(), c[i]))
                .collect();
            (t, values)
        })
    }

    /// Value of `name` at normalized time `s ∈ [0, 1]`, linearly
    /// interpolated between nodes.
    pub fn sample(&self, name: &str, s: f64) -> Option<f64> {
        let column = self.column(name)?;
        let end = *self.times.last()?;
        let start = self.times[0];
        let span = end - start;
        if span <= 0.0 {
            return column.first().copied();
        }
        interp_linear(&self.times, column, start + s * span).ok()
    }

    /// Same variables sampled on `times`, mapping both horizons onto
    /// `[0, 1]`.
    pub fn resample(&self, times: &[f64]) -> SolverResult<Self> {
        let Some((&first, &last)) = times.first().zip(times.last()) else {
            return Err(SolverError::ProblemSetup {
                what: "cannot resample onto an empty grid".into(),
            });
        };
        let span = last - first;
        let columns = self
            .names
            .iter()
            .map(|name| {
                times
                    .iter()
                    .map(|&t| {
                        let s = if span > 0.0 { (t - first) / span } else { 0.0 };
                        self.sample(name, s).unwrap_or(f64::NAN)
                    })
                    .collect()
            })
            .collect();
        Self::from_columns(self.names.clone(), times.to_vec(), columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp() -> Trajectory {
        Trajectory::from_columns(
            vec!["x".into(), "k".into()],
            vec![0.0, 1.0, 2.0],
            vec![vec![0.0, 2.0, 4.0], vec![7.0, 7.0, 7.0]],
        )
        .unwrap()
    }

    #[test]
    fn lookups_by_name() {
        let t = ramp();
        assert_eq!(t.len(), 3);
        assert_eq!(t.column("x"), Some(&[0.0, 2.0, 4.0][..]));
        assert_eq!(t.value("k", 1), Some(7.0));
        assert_eq!(t.final_value("x"), Some(4.0));
        assert_eq!(t.column("missing"), None);
        assert_eq!(t.value("x", 9), None);
    }

    #[test]
    fn rows_follow_declaration_order() {
        let traj = ramp();
        let rows: Vec<_> = traj.rows().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], (1.0, vec![("x", 2.0), ("k", 7.0)]));
    }

    #[test]
    fn resampling_uses_normalized_time() {
        // Same shape on a horizon twice as long.
        let r = ramp().resample(&[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(r.len(), 5);
        assert_relative_eq!(r.value("x", 1).unwrap(), 1.0);
        assert_relative_eq!(r.final_value("x").unwrap(), 4.0);
        assert_relative_eq!(r.value("k", 3).unwrap(), 7.0);
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let err = Trajectory::from_columns(vec!["x".into()], vec![0.0, 1.0], vec![vec![0.0]]);
        assert!(matches!(err, Err(SolverError::DimensionMismatch { .. })));
        assert!(ramp().resample(&[]).is_err());
    }
}
