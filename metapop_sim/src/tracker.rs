//! Keeps the rate table in step with the working graph.

use crate::model::Model;
use metapop_core::{ActivePatches, ChangeHandler, Event, PatchChange, PatchGraph, RateTable};
use metapop_env::{MetapopError, PatchId, Result};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Rate table plus the activation state behind its rows.
pub struct RateTracker<M: Model> {
    model: Arc<M>,
    events: Arc<Vec<Box<dyn Event>>>,
    table: RateTable,
    active: ActivePatches,
    // Activated but not yet handed to the model's seeding hook
    activated: Vec<PatchId>,
}

impl<M: Model> RateTracker<M> {
    pub fn new(model: Arc<M>, events: Arc<Vec<Box<dyn Event>>>) -> Self {
        let table = RateTable::new(events.len());
        Self {
            model,
            events,
            table,
            active: ActivePatches::new(),
            activated: Vec::new(),
        }
    }

    pub fn table(&self) -> &RateTable {
        &self.table
    }

    pub fn active(&self) -> &ActivePatches {
        &self.active
    }

    /// Every event's rate at `patch`, in column order.
    pub fn rates_at(&self, graph: &PatchGraph, patch: PatchId) -> Result<Vec<f64>> {
        let mut rates = Vec::with_capacity(self.events.len());
        for event in self.events.iter() {
            let rate = event.calculate_rate_at_patch(graph, patch)?;
            if !rate.is_finite() || rate < 0.0 {
                return Err(MetapopError::InvalidRate {
                    event: event.name(),
                    patch,
                    rate,
                });
            }
            rates.push(rate);
        }
        Ok(rates)
    }

    /// Gives `patch` a row if the model's activation predicate now holds.
    ///
    /// Returns true if the patch became active by this call.
    pub fn activate(&mut self, graph: &PatchGraph, patch: PatchId) -> Result<bool> {
        if self.active.is_active(patch) || !self.model.patch_is_active(graph, patch)? {
            return Ok(false);
        }
        let rates = self.rates_at(graph, patch)?;
        if let Some(row) = self.active.activate(patch) {
            self.table.push_row(&rates);
            self.activated.push(patch);
            debug!("Activated patch {} at row {}", patch, row);
        }
        Ok(true)
    }

    /// Drains the patches activated since the last call, in activation order.
    pub fn take_activated(&mut self) -> Vec<PatchId> {
        std::mem::take(&mut self.activated)
    }

    /// Recomputes the row of an active patch, or tries to activate it.
    pub fn refresh(&mut self, graph: &PatchGraph, patch: PatchId) -> Result<()> {
        match self.active.row_of(patch) {
            Some(row) => {
                let rates = self.rates_at(graph, patch)?;
                self.table.set_row(row, &rates);
                Ok(())
            }
            None => self.activate(graph, patch).map(|_| ()),
        }
    }

    /// Picks the (patch, event index) cell for a target on `[0, total)`.
    pub fn select(&self, target: f64) -> Option<(PatchId, usize)> {
        let (row, col) = self.table.select(target)?;
        let patch = self.active.patch_at(row)?;
        Some((patch, col))
    }
}

/// Registers a shared tracker as the graph's change handler.
pub struct TrackerHandle<M: Model>(pub Rc<RefCell<RateTracker<M>>>);

impl<M: Model> ChangeHandler for TrackerHandle<M> {
    fn on_change(&mut self, graph: &PatchGraph, change: &PatchChange<'_>) -> Result<()> {
        self.0.borrow_mut().refresh(graph, change.patch)
    }
}
