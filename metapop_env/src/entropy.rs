//! Production random stream seeded from OS entropy.

use crate::RandomStream;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Unseeded stream for one-off production runs.
///
/// Every instance draws fresh OS entropy, so two streams never agree. Use
/// `SeededStream` from `metapop_sim` when a run must be reproducible.
pub struct EntropyStream {
    rng: StdRng,
}

impl EntropyStream {
    /// Creates a new stream from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for EntropyStream {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomStream for EntropyStream {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}
