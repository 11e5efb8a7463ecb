//! Recorded results of a single run.

use metapop_core::{Patch, PatchGraph};
use metapop_env::PatchId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Full patch state at one recorded time. Edges are not included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Recording-interval boundary (or the start time for the first record)
    pub time: f64,

    /// Deep copy of every patch's compartments and attributes
    pub patches: BTreeMap<PatchId, Patch>,
}

impl Snapshot {
    pub fn capture(time: f64, graph: &PatchGraph) -> Self {
        Self {
            time,
            patches: graph.snapshot(),
        }
    }

    /// Total of one compartment over all patches.
    pub fn total(&self, compartment: &str) -> u64 {
        self.patches
            .values()
            .filter_map(|p| p.compartments.get(compartment))
            .sum()
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The equilibrium predicate held
    Equilibrium,

    /// Total propensity reached zero before equilibrium
    Exhausted,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Equilibrium => write!(f, "equilibrium"),
            Termination::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Time-ordered snapshots of one run plus how it ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub records: Vec<Snapshot>,
    pub termination: Termination,

    /// Simulated time when the loop stopped
    pub end_time: f64,

    /// Number of events performed
    pub events_fired: u64,
}

impl Trajectory {
    pub fn times(&self) -> Vec<f64> {
        self.records.iter().map(|s| s.time).collect()
    }

    pub fn last(&self) -> Option<&Snapshot> {
        self.records.last()
    }
}
