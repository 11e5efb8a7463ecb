//! MetapopPy Core - Patch Networks and Events for Stochastic Metapopulations
//!
//! This library holds the pieces a Gillespie run is assembled from:
//! 1. **Patch network**: `PatchGraph`, an arena of patches and edges carrying
//!    integer compartments and real attributes, with a single synchronous
//!    change handler
//! 2. **Events**: the `Event` trait and the standard kinds built on it
//! 3. **Rate bookkeeping**: `RateTable` and the append-only `ActivePatches`

pub mod event;
pub mod events;
pub mod network;
pub mod rates;
pub mod selection;

// Re-export key types for convenience
pub use event::{Event, EventExt, PatchTypeEvent};
pub use events::{Change, Infect, Ingest, Move, Translocate};
pub use network::{handler_fn, ChangeHandler, Edge, Patch, PatchChange, PatchGraph};
pub use rates::{ActivePatches, RateTable};
pub use selection::NameSelection;

#[cfg(test)]
pub(crate) mod testing {
    use metapop_env::RandomStream;

    /// Replays a fixed cycle of uniforms.
    pub struct ScriptedStream {
        values: Vec<f64>,
        next: usize,
    }

    impl ScriptedStream {
        pub fn new(values: &[f64]) -> Self {
            Self {
                values: values.to_vec(),
                next: 0,
            }
        }

        pub fn constant(value: f64) -> Self {
            Self::new(&[value])
        }
    }

    impl RandomStream for ScriptedStream {
        fn next_f64(&mut self) -> f64 {
            let value = self.values[self.next % self.values.len()];
            self.next += 1;
            value
        }

        fn seed(&self) -> u64 {
            0
        }
    }
}
