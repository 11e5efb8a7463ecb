//! JSON exporter for replicate batches.

use crate::runner::{BatchSummary, ReplicateResult};
use metapop_env::{MetapopError, Params, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Complete batch export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Model name
    pub model: String,

    /// Scenario name
    pub scenario: String,

    /// Base seed used
    pub seed: u64,

    /// Parameters every replicate ran with
    pub params: Params,

    pub summary: BatchSummary,

    /// Per-replicate trajectories
    pub replicates: Vec<ReplicateResult>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(model: &str, scenario: &str, seed: u64, params: Params, replicates: Vec<ReplicateResult>) -> Self {
        Self {
            model: model.to_string(),
            scenario: scenario.to_string(),
            seed,
            params,
            summary: BatchSummary::of(&replicates),
            replicates,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| MetapopError::Serialization(e.to_string()))
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
