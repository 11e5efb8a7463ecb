//! The event abstraction - a rate function plus a state mutation.

use crate::network::PatchGraph;
use metapop_env::{MetapopError, Params, PatchId, RandomStream, Result};

/// A reaction that can fire at a patch.
///
/// Events hold no per-patch state. They carry reaction constants taken from
/// the global parameter mapping, read the graph to produce a rate, and
/// mutate it only through `update_patch` / `update_edge` when fired.
pub trait Event: Send + Sync {
    /// Short label for logs and error messages.
    fn name(&self) -> String;

    /// Parameter keys this event consumes.
    ///
    /// Lets configuration code discover which names to provide.
    fn reaction_parameters(&self) -> Vec<&str>;

    /// Picks this event's constants out of `params`, ignoring unrelated keys.
    ///
    /// Fails with `MissingParameter` if a required key is absent.
    fn set_parameters(&mut self, params: &Params) -> Result<()>;

    /// Rate of this event at `patch` given the current graph state.
    ///
    /// Must be non-negative and exactly 0 wherever the event cannot apply.
    fn calculate_rate_at_patch(&self, graph: &PatchGraph, patch: PatchId) -> Result<f64>;

    /// Applies the event's mutation at `patch`.
    ///
    /// May touch several patches; relies on the graph's invariant checks rather
    /// than validating beforehand.
    fn perform(&self, graph: &mut PatchGraph, patch: PatchId, rng: &mut dyn RandomStream) -> Result<()>;
}

/// Returns a configured constant or a `MissingParameter` error naming its key.
pub(crate) fn configured(value: Option<f64>, key: &str) -> Result<f64> {
    value.ok_or_else(|| MetapopError::missing(key))
}

/// Restricts an event to patches of a single type.
///
/// Outside the type the rate is 0, so the engine never selects it there.
pub struct PatchTypeEvent<E> {
    patch_type: String,
    inner: E,
}

impl<E: Event> PatchTypeEvent<E> {
    pub fn new(patch_type: &str, inner: E) -> Self {
        Self {
            patch_type: patch_type.to_string(),
            inner,
        }
    }

    pub fn patch_type(&self) -> &str {
        &self.patch_type
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: Event> Event for PatchTypeEvent<E> {
    fn name(&self) -> String {
        format!("{}@{}", self.inner.name(), self.patch_type)
    }

    fn reaction_parameters(&self) -> Vec<&str> {
        self.inner.reaction_parameters()
    }

    fn set_parameters(&mut self, params: &Params) -> Result<()> {
        self.inner.set_parameters(params)
    }

    fn calculate_rate_at_patch(&self, graph: &PatchGraph, patch: PatchId) -> Result<f64> {
        if graph.patch_type(patch)? != Some(self.patch_type.as_str()) {
            return Ok(0.0);
        }
        self.inner.calculate_rate_at_patch(graph, patch)
    }

    fn perform(&self, graph: &mut PatchGraph, patch: PatchId, rng: &mut dyn RandomStream) -> Result<()> {
        self.inner.perform(graph, patch, rng)
    }
}

/// Builder helpers available on every event.
pub trait EventExt: Event + Sized {
    /// Wraps this event so it only fires at patches of `patch_type`.
    fn restricted_to(self, patch_type: &str) -> PatchTypeEvent<Self> {
        PatchTypeEvent::new(patch_type, self)
    }

    /// Boxes this event for storage alongside other kinds.
    fn boxed(self) -> Box<dyn Event>
    where
        Self: 'static,
    {
        Box::new(self)
    }
}

impl<E: Event> EventExt for E {}
