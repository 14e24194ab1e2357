//! Observation streams and outcome reports on disk.
//!
//! Streams are JSON arrays, either of numbers (a scalar stream) or of
//! arrays of numbers (a vector stream). Reports are pretty-printed
//! `ExperimentOutcome` JSON.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use crate::experiment::ExperimentOutcome;
use crate::types::Observation;

#[derive(Deserialize)]
#[serde(untagged)]
enum StreamFile {
    Scalars(Vec<f64>),
    Vectors(Vec<Observation>),
}

impl From<StreamFile> for Vec<Observation> {
    fn from(file: StreamFile) -> Self {
        match file {
            StreamFile::Scalars(values) => values.into_iter().map(|v| vec![v]).collect(),
            StreamFile::Vectors(rows) => rows,
        }
    }
}

/// Parse a stream from JSON text.
pub fn parse_observations(json: &str) -> Result<Vec<Observation>> {
    let file: StreamFile = serde_json::from_str(json)
        .context("Expected a JSON array of numbers or of number arrays")?;
    let observations: Vec<Observation> = file.into();

    if let Some(first) = observations.first() {
        let dimension = first.len();
        if dimension == 0 {
            bail!("Observations must have at least one component");
        }
        if let Some(index) = observations.iter().position(|o| o.len() != dimension) {
            bail!(
                "Observation {index} has {} components, expected {dimension}",
                observations[index].len()
            );
        }
    }
    Ok(observations)
}

/// Load an observation stream from a JSON file.
pub fn load_observations(path: impl AsRef<Path>) -> Result<Vec<Observation>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read observations from {}", path.display()))?;
    let observations = parse_observations(&json)
        .with_context(|| format!("Failed to parse observations from {}", path.display()))?;

    info!(
        path = %path.display(),
        count = observations.len(),
        dimension = observations.first().map(Vec::len).unwrap_or(0),
        "Observations loaded"
    );
    Ok(observations)
}

/// Write an experiment outcome as pretty JSON, creating parent directories.
pub fn save_outcome(outcome: &ExperimentOutcome, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json =
        serde_json::to_string_pretty(outcome).context("Failed to serialise experiment outcome")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    debug!(path = %path.display(), run_id = %outcome.run_id, "Report saved");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
