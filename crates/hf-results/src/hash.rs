//! Content-based hashing for run IDs.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex SHA-256 of the serialized request, the experiment name and the solver
/// version. Identical requests map to the same run directory.
pub fn compute_run_id<R: Serialize>(request: &R, experiment: &str, solver_version: &str) -> String {
    let mut hasher = Sha256::new();

    let request_json = serde_json::to_string(request).unwrap_or_default();
    hasher.update(request_json.as_bytes());
    hasher.update(experiment.as_bytes());
    hasher.update(solver_version.as_bytes());

    let result = hasher.finalize();
    format!("{:x}", result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Request {
        regime: &'static str,
        tf: f64,
    }

    #[test]
    fn hash_stability() {
        let req = Request {
            regime: "high",
            tf: 2.0,
        };
        let a = compute_run_id(&req, "optimize", "v1");
        let b = compute_run_id(&req, "optimize", "v1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_differs_for_different_inputs() {
        let base = Request {
            regime: "high",
            tf: 2.0,
        };
        let other = Request {
            regime: "low",
            tf: 2.0,
        };
        let id = compute_run_id(&base, "optimize", "v1");
        assert_ne!(id, compute_run_id(&other, "optimize", "v1"));
        assert_ne!(id, compute_run_id(&base, "search", "v1"));
        assert_ne!(id, compute_run_id(&base, "optimize", "v2"));
    }
}
