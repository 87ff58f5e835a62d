//! CSV export of stored trajectories.

use crate::types::TrajectorySample;
use crate::{ResultsError, ResultsResult};
use std::fs;
use std::path::Path;

/// `time,<var...>` header followed by one line per sample.
pub fn to_csv_string(variables: &[String], samples: &[TrajectorySample]) -> ResultsResult<String> {
    let mut csv = String::from("time");
    for name in variables {
        csv.push(',');
        csv.push_str(name);
    }
    csv.push('\n');
    for (i, sample) in samples.iter().enumerate() {
        if sample.values.len() != variables.len() {
            return Err(ResultsError::Malformed {
                message: format!(
                    "sample {i} has {} values for {} columns",
                    sample.values.len(),
                    variables.len()
                ),
            });
        }
        csv.push_str(&sample.time.to_string());
        for v in &sample.values {
            csv.push(',');
            csv.push_str(&v.to_string());
        }
        csv.push('\n');
    }
    Ok(csv)
}

pub fn write_csv(
    path: &Path,
    variables: &[String],
    samples: &[TrajectorySample],
) -> ResultsResult<()> {
    let csv = to_csv_string(variables, samples)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, csv)?;
    Ok(())
}
