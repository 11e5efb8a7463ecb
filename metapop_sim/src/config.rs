//! Harness configuration, loadable from JSON.

use crate::scenarios::ScenarioId;
use metapop_env::{MetapopError, Params, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a batch of replicate runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed; replicate `i` runs with `seed + i`
    pub seed: u64,

    /// Number of independent runs
    pub replicates: usize,

    /// Scenario name (see `ScenarioId`)
    pub scenario: String,

    /// Patches per side (lattice) or in total (ring)
    pub size: usize,

    /// Engine and event parameters, merged over the model defaults
    pub params: Params,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            replicates: 1,
            scenario: ScenarioId::Ring.name().to_string(),
            size: 10,
            params: Params::new(),
        }
    }
}

impl SimConfig {
    /// Reads a config file; absent fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| MetapopError::Serialization(e.to_string()))
    }

    pub fn scenario_id(&self) -> Result<ScenarioId> {
        self.scenario.parse().map_err(MetapopError::Configuration)
    }

    /// Checks the values a run cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.replicates == 0 {
            return Err(MetapopError::configuration("At least one replicate is required"));
        }
        if self.size == 0 {
            return Err(MetapopError::configuration("Network size must be positive"));
        }
        self.scenario_id().map(|_| ())
    }
}
