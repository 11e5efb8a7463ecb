//! Collaborator trait supplying a run's events, seeding and predicates.

use metapop_core::{Event, PatchGraph};
use metapop_env::{Params, PatchId, RandomStream, Result};

/// What a concrete simulation plugs into `Dynamics`.
///
/// The engine owns the loop; a model decides which events exist, how the
/// freshly prepared network and each newly active patch are populated, which
/// patches get tracked, and when the run has reached equilibrium.
pub trait Model: Send + Sync + 'static {
    /// Label used in logs and exports.
    fn name(&self) -> &str;

    /// Builds the event list. Called once per engine; order fixes the rate-table columns.
    fn create_events(&self) -> Vec<Box<dyn Event>>;

    /// Applies initial compartment, attribute and edge values to a prepared graph.
    ///
    /// Runs before the engine registers its change handler.
    fn seed_network(&self, graph: &mut PatchGraph, params: &Params, rng: &mut dyn RandomStream) -> Result<()>;

    /// Activation predicate: whether `patch` should enter the rate table.
    fn patch_is_active(&self, _graph: &PatchGraph, _patch: PatchId) -> Result<bool> {
        Ok(true)
    }

    /// Populates a patch that has just become active.
    ///
    /// Called once per patch, at set-up for the initial active set and after
    /// the event that activated it during a run. Changes made here go through
    /// the change handler, so the patch's row reflects them before the next draw.
    fn seed_activated_patch(
        &self,
        _graph: &mut PatchGraph,
        _patch: PatchId,
        _params: &Params,
        _rng: &mut dyn RandomStream,
    ) -> Result<()> {
        Ok(())
    }

    /// Checked at the top of every loop iteration.
    fn at_equilibrium(&self, time: f64, max_time: f64, _graph: &PatchGraph) -> bool {
        time >= max_time
    }
}
