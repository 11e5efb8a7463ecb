//! Replicate runner - executes independent runs in parallel.

use crate::context::SeededStream;
use crate::dynamics::Dynamics;
use crate::model::Model;
use crate::trajectory::{Termination, Trajectory};
use metapop_core::PatchGraph;
use metapop_env::{Params, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Result of one replicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateResult {
    /// Replicate index
    pub replicate: usize,

    /// Seed used
    pub seed: u64,

    pub trajectory: Trajectory,
}

/// Aggregate view over a batch of replicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub replicates: usize,

    /// Replicates that stopped because total propensity hit zero
    pub exhausted: usize,

    pub mean_events_fired: f64,
    pub mean_end_time: f64,
}

impl BatchSummary {
    pub fn of(results: &[ReplicateResult]) -> Self {
        let n = results.len().max(1) as f64;
        Self {
            replicates: results.len(),
            exhausted: results
                .iter()
                .filter(|r| r.trajectory.termination == Termination::Exhausted)
                .count(),
            mean_events_fired: results.iter().map(|r| r.trajectory.events_fired as f64).sum::<f64>() / n,
            mean_end_time: results.iter().map(|r| r.trajectory.end_time).sum::<f64>() / n,
        }
    }
}

/// Runs independent replicates of one model.
///
/// Every replicate builds its own prototype, engine and `SeededStream`
/// (seed `base + i`), so nothing is shared between threads.
pub struct ReplicateRunner<M> {
    /// Model cloned into each replicate
    model: M,

    /// Base seed
    seed: u64,

    /// Number of replicates
    replicates: usize,

    /// Parameters handed to every run
    params: Params,
}

impl<M: Model + Clone> ReplicateRunner<M> {
    /// Creates a new replicate runner.
    pub fn new(model: M, seed: u64, replicates: usize) -> Self {
        Self {
            model,
            seed,
            replicates,
            params: Params::new(),
        }
    }

    /// Sets the parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn seed_for(&self, replicate: usize) -> u64 {
        self.seed.wrapping_add(replicate as u64)
    }

    /// Runs one replicate on a freshly built network.
    pub fn run_one<F>(&self, replicate: usize, build_network: &F) -> Result<ReplicateResult>
    where
        F: Fn() -> Result<PatchGraph>,
    {
        let seed = self.seed_for(replicate);
        let mut dynamics = Dynamics::new(self.model.clone())?;
        dynamics.set_network_prototype(build_network()?)?;
        let trajectory = dynamics.simulate(&self.params, &mut SeededStream::new(seed))?;

        info!(
            "Replicate {} (seed={}): {} after {} events, t={:.3}",
            replicate, seed, trajectory.termination, trajectory.events_fired, trajectory.end_time
        );
        Ok(ReplicateResult {
            replicate,
            seed,
            trajectory,
        })
    }

    /// Runs every replicate in parallel. Results are in replicate order.
    pub fn run<F>(&self, build_network: F) -> Result<Vec<ReplicateResult>>
    where
        F: Fn() -> Result<PatchGraph> + Sync,
    {
        info!(
            "Starting {} replicates of {} (seed={})",
            self.replicates,
            self.model.name(),
            self.seed
        );
        (0..self.replicates)
            .into_par_iter()
            .map(|i| self.run_one(i, &build_network))
            .collect()
    }
}
