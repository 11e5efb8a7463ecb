//! Random-stream abstraction handed explicitly to every stochastic step.

/// Source of uniform random numbers for one simulation run.
///
/// The engine and the events never reach for a global generator: every draw
/// goes through the stream passed into the run, so a run is reproducible from
/// its seed and parallel runs never share state.
///
/// # Implementations
///
/// - **Production**: `EntropyStream` - seeded from OS entropy
/// - **Simulation**: `SeededStream` - ChaCha8 seeded from a 64-bit value
pub trait RandomStream {
    /// Returns a uniform sample on `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    /// Returns the stream's seed (for logging/debugging).
    ///
    /// Unseeded streams return 0.
    fn seed(&self) -> u64;

    /// Samples an exponential waiting time for the given total rate.
    ///
    /// Uses `-ln(u) / rate` with `u` on `(0, 1]`.
    fn exponential(&mut self, rate: f64) -> f64 {
        let u = 1.0 - self.next_f64();
        -u.ln() / rate
    }

    /// Draws an index with probability proportional to its weight.
    ///
    /// Zero-weight entries are never selected. Returns `None` when no weight is
    /// positive.
    fn choose_weighted(&mut self, weights: &[f64]) -> Option<usize> {
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if total <= 0.0 {
            return None;
        }
        select_weighted(weights, self.next_f64() * total)
    }
}

/// Returns the index where the running sum of positive weights first exceeds
/// `target`.
///
/// Non-positive weights are skipped. A `target` at or past the total falls
/// back to the last positive entry; `None` when there is none.
pub fn select_weighted(weights: &[f64], target: f64) -> Option<usize> {
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (idx, &weight) in weights.iter().enumerate() {
        if weight <= 0.0 {
            continue;
        }
        cumulative += weight;
        last_positive = Some(idx);
        if target < cumulative {
            return Some(idx);
        }
    }
    // Rounding can leave target a hair above the final sum
    last_positive
}
