//! Result data types.

use serde::{Deserialize, Serialize};

pub type RunId = String;

/// Summary of one persisted solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    /// Experiment that produced the run (`optimize`, `search`, ...).
    pub experiment: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formulation: Option<String>,
    pub tf: f64,
    pub n_nodes: usize,
    pub status: String,
    pub objective: Option<f64>,
    pub solver: String,
    /// Column names of every [`TrajectorySample`], in order.
    pub variables: Vec<String>,
}

/// Variable values at one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub time: f64,
    pub values: Vec<f64>,
}

/// Current UTC time in RFC 3339, as stored in manifests.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
