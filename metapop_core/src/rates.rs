//! Rate table and monotonic patch activation.
//!
//! # Layout
//!
//! The table is patch-major: row `r` belongs to the `r`-th activated patch,
//! column `c` to the `c`-th event. A flat index decodes as
//! `row = flat / num_events`, `col = flat % num_events`.

use metapop_env::{select_weighted, PatchId};
use serde::Serialize;

/// Propensities for every (active patch, event) cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateTable {
    num_events: usize,
    values: Vec<f64>,
}

impl RateTable {
    pub fn new(num_events: usize) -> Self {
        Self {
            num_events,
            values: Vec::new(),
        }
    }

    pub fn num_events(&self) -> usize {
        self.num_events
    }

    pub fn num_rows(&self) -> usize {
        if self.num_events == 0 {
            0
        } else {
            self.values.len() / self.num_events
        }
    }

    /// Appends a row and returns its index.
    ///
    /// # Panics
    ///
    /// If `rates` does not hold one entry per event.
    pub fn push_row(&mut self, rates: &[f64]) -> usize {
        assert_eq!(rates.len(), self.num_events, "row width must match event count");
        let row = self.num_rows();
        self.values.extend_from_slice(rates);
        row
    }

    /// Overwrites an existing row.
    pub fn set_row(&mut self, row: usize, rates: &[f64]) {
        let start = row * self.num_events;
        self.values[start..start + self.num_events].copy_from_slice(rates);
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.num_events + col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.num_events;
        &self.values[start..start + self.num_events]
    }

    /// Sum of every cell (the total propensity).
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn as_flat(&self) -> &[f64] {
        &self.values
    }

    /// Splits a flat index into `(row, col)`.
    pub fn decode(&self, flat: usize) -> (usize, usize) {
        (flat / self.num_events, flat % self.num_events)
    }

    /// Finds the cell where the running sum first exceeds `target`.
    ///
    /// `target` is expected on `[0, total)`. Zero cells are never returned;
    /// a target at or past the total falls back to the last positive cell.
    pub fn select(&self, target: f64) -> Option<(usize, usize)> {
        select_weighted(&self.values, target).map(|flat| self.decode(flat))
    }
}

/// Activation order of patches. Append-only: there is no deactivation.
#[derive(Debug, Clone, Default)]
pub struct ActivePatches {
    order: Vec<PatchId>,
    rows: Vec<Option<usize>>,
}

impl ActivePatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `patch` active and returns its new row, or `None` if it already was.
    pub fn activate(&mut self, patch: PatchId) -> Option<usize> {
        if self.is_active(patch) {
            return None;
        }
        if self.rows.len() <= patch.index() {
            self.rows.resize(patch.index() + 1, None);
        }
        let row = self.order.len();
        self.order.push(patch);
        self.rows[patch.index()] = Some(row);
        Some(row)
    }

    pub fn row_of(&self, patch: PatchId) -> Option<usize> {
        self.rows.get(patch.index()).copied().flatten()
    }

    pub fn patch_at(&self, row: usize) -> Option<PatchId> {
        self.order.get(row).copied()
    }

    pub fn is_active(&self, patch: PatchId) -> bool {
        self.row_of(patch).is_some()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Active patches in row order.
    pub fn iter(&self) -> impl Iterator<Item = PatchId> + '_ {
        self.order.iter().copied()
    }
}
