//! YAML study configuration.

use crate::error::{AppError, AppResult};
use crate::search::{IndeterminatePolicy, SearchOptions};
use hf_model::{CarParams, Formulation, HammerParams, ObjectiveKind, Stiffness};
use hf_solver::AlConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bisection settings for `search` runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub tf_min: f64,
    pub tf_max: f64,
    pub tol: f64,
    pub max_iterations: usize,
    pub policy: IndeterminatePolicy,
    pub warm_start: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tf_min: 0.0,
            tf_max: 3.0,
            tol: 1e-2,
            max_iterations: 64,
            policy: IndeterminatePolicy::default(),
            warm_start: false,
        }
    }
}

impl SearchConfig {
    pub fn options(&self) -> SearchOptions {
        SearchOptions {
            policy: self.policy,
            max_iterations: self.max_iterations,
            warm_start: self.warm_start,
        }
    }
}

/// Car maneuver horizon and grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarConfig {
    pub params: CarParams,
    pub tf: f64,
    pub n_nodes: usize,
}

impl Default for CarConfig {
    fn default() -> Self {
        Self {
            params: CarParams::default(),
            tf: 50.0,
            n_nodes: 50,
        }
    }
}

/// Everything one study needs, read from a single YAML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub params: HammerParams,
    pub stiffness: Vec<Stiffness>,
    pub formulation: Formulation,
    /// Overrides the formulation's default objective.
    pub objective: Option<ObjectiveKind>,
    pub solver: AlConfig,
    pub n_nodes: usize,
    pub tf: f64,
    pub search: SearchConfig,
    pub car: CarConfig,
    pub output_dir: PathBuf,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            params: HammerParams::default(),
            stiffness: Stiffness::ALL.to_vec(),
            formulation: Formulation::Direct,
            objective: None,
            solver: AlConfig::default(),
            n_nodes: 200,
            tf: 2.0,
            search: SearchConfig::default(),
            car: CarConfig::default(),
            output_dir: PathBuf::from("runs"),
        }
    }
}

impl StudyConfig {
    /// Read and validate a study file.
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| AppError::ConfigFileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content)?;
        tracing::debug!(path = %path.display(), "loaded study config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> AppResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> AppResult<String> {
        serde_yaml::to_string(self).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Objective actually used for `formulation`.
    pub fn objective_for(&self, formulation: Formulation) -> ObjectiveKind {
        self.objective
            .unwrap_or_else(|| formulation.default_objective())
    }

    pub fn validate(&self) -> AppResult<()> {
        self.params
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        if self.stiffness.is_empty() {
            return Err(AppError::Config("at least one stiffness regime is required".into()));
        }
        if self.n_nodes == 0 || self.car.n_nodes == 0 {
            return Err(AppError::Config("n_nodes must be at least 1".into()));
        }
        for (name, tf) in [("tf", self.tf), ("car.tf", self.car.tf)] {
            if !(tf.is_finite() && tf > 0.0) {
                return Err(AppError::Config(format!("{name} must be positive, got {tf}")));
            }
        }
        let s = &self.search;
        if !(s.tf_min.is_finite() && s.tf_max.is_finite() && 0.0 <= s.tf_min && s.tf_min < s.tf_max)
        {
            return Err(AppError::Config(format!(
                "search interval [{}, {}] must satisfy 0 <= tf_min < tf_max",
                s.tf_min, s.tf_max
            )));
        }
        if !(s.tol.is_finite() && s.tol > 0.0) {
            return Err(AppError::Config(format!("search tol must be positive, got {}", s.tol)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = StudyConfig::from_yaml("{}").unwrap();
        assert_eq!(config, StudyConfig::default());
        assert_eq!(config.stiffness.len(), 3);
    }

    #[test]
    fn partial_override() {
        let yaml = r#"
params:
  h_mass: 0.8
  tracking:
    damping: 0.25
    gap_rate_limit: 0.05
stiffness: [high_stiffness, variable]
formulation: tracking
objective:
  weighted_terminal_velocity: { hammer: 1.0, base: 0.5 }
n_nodes: 50
search:
  tol: 0.05
  policy: treat_as_infeasible
"#;
        let config = StudyConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.params.h_mass, 0.8);
        assert_eq!(config.params.w_min, HammerParams::default().w_min);
        assert_eq!(config.params.tracking.damping, 0.25);
        assert_eq!(config.stiffness, vec![Stiffness::High, Stiffness::Variable]);
        assert_eq!(config.formulation, Formulation::Tracking);
        assert_eq!(
            config.objective_for(Formulation::Tracking),
            ObjectiveKind::WeightedTerminalVelocity {
                hammer: 1.0,
                base: 0.5
            }
        );
        assert_eq!(config.n_nodes, 50);
        assert_eq!(config.search.tol, 0.05);
        assert_eq!(config.search.policy, IndeterminatePolicy::TreatAsInfeasible);
        assert_eq!(config.search.tf_max, 3.0);
    }

    #[test]
    fn shipped_study_file_parses() {
        let config = StudyConfig::from_yaml(include_str!("../../../config/hammering.yml")).unwrap();
        assert_eq!(config.params, HammerParams::default());
        assert_eq!(config.car.params, CarParams::default());
        assert_eq!(config.solver.max_wall_time, Some(120.0));
        assert!(config.search.warm_start);
    }

    #[test]
    fn default_objective_follows_formulation() {
        let config = StudyConfig::default();
        assert_eq!(
            config.objective_for(Formulation::Direct),
            ObjectiveKind::TerminalHammerVelocity
        );
        assert_eq!(
            config.objective_for(Formulation::Flat),
            Formulation::Flat.default_objective()
        );
    }

    #[test]
    fn invalid_documents_are_config_errors() {
        for yaml in [
            "n_nodes: [1, 2",
            "n_nodes: 0",
            "stiffness: []",
            "stiffness: [medium]",
            "params: { w_min: 0.1, w_max: 0.05 }",
            "search: { tf_min: 2.0, tf_max: 1.0 }",
            "search: { tol: 0.0 }",
        ] {
            assert!(
                matches!(StudyConfig::from_yaml(yaml), Err(AppError::Config(_))),
                "{yaml}"
            );
        }
    }

    #[test]
    fn yaml_round_trip_is_stable() {
        let config = StudyConfig::default();
        let back = StudyConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
