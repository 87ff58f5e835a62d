//! Run storage API.
//!
//! Layout: `<root>/<run_id>/manifest.json` plus
//! `<root>/<run_id>/trajectory.jsonl` (one [`TrajectorySample`] per line).

use crate::types::{RunManifest, TrajectorySample};
use crate::{ResultsError, ResultsResult};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct RunStore {
    root_dir: PathBuf,
}

impl RunStore {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root_dir.join(run_id)
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.run_dir(run_id).join("manifest.json").exists()
    }

    pub fn save_run(
        &self,
        manifest: &RunManifest,
        samples: &[TrajectorySample],
    ) -> ResultsResult<()> {
        if let Some(bad) = samples
            .iter()
            .find(|s| s.values.len() != manifest.variables.len())
        {
            return Err(ResultsError::Malformed {
                message: format!(
                    "sample at t={} has {} values, manifest names {}",
                    bad.time,
                    bad.values.len(),
                    manifest.variables.len()
                ),
            });
        }

        let run_dir = self.run_dir(&manifest.run_id);
        fs::create_dir_all(&run_dir)?;

        let manifest_json = serde_json::to_string_pretty(manifest)?;
        fs::write(run_dir.join("manifest.json"), manifest_json)?;

        let mut content = String::new();
        for sample in samples {
            content.push_str(&serde_json::to_string(sample)?);
            content.push('\n');
        }
        fs::write(run_dir.join("trajectory.jsonl"), content)?;

        Ok(())
    }

    pub fn load_manifest(&self, run_id: &str) -> ResultsResult<RunManifest> {
        let path = self.run_dir(run_id).join("manifest.json");
        if !path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn load_trajectory(&self, run_id: &str) -> ResultsResult<Vec<TrajectorySample>> {
        let path = self.run_dir(run_id).join("trajectory.jsonl");
        if !path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let content = fs::read_to_string(path)?;
        let mut samples = Vec::new();
        for line in content.lines() {
            if !line.trim().is_empty() {
                samples.push(serde_json::from_str(line)?);
            }
        }
        Ok(samples)
    }

    /// Manifests of every stored run, optionally filtered by experiment,
    /// ordered by timestamp then run id.
    pub fn list_runs(&self, experiment: Option<&str>) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = Vec::new();
        if !self.root_dir.exists() {
            return Ok(runs);
        }

        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                let run_id = entry.file_name().to_string_lossy().to_string();
                if let Ok(manifest) = self.load_manifest(&run_id)
                    && experiment.is_none_or(|e| manifest.experiment == e)
                {
                    runs.push(manifest);
                }
            }
        }
        runs.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Ok(runs)
    }

    pub fn delete_run(&self, run_id: &str) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id);
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        Ok(())
    }
}
