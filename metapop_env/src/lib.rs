//! MetapopPy Environment Layer
//!
//! This crate holds the vocabulary every other MetapopPy crate speaks:
//! - Errors (`MetapopError`) and the `Result` alias
//! - Patch identifiers (`PatchId`)
//! - The configuration mapping (`Params`)
//! - Randomness (`RandomStream`)
//!
//! # Core Concept: Explicit Random Streams
//!
//! A stochastic run never touches a global generator. The harness hands a
//! stream to the engine, the engine hands it to every event it fires, and a
//! run becomes reproducible from its seed alone.
//!
//! # Example
//!
//! ```ignore
//! use metapop_env::{Params, RandomStream};
//!
//! fn waiting_time<R: RandomStream>(rng: &mut R, total_rate: f64) -> f64 {
//!     rng.exponential(total_rate)
//! }
//! ```

mod entropy;
mod error;
mod stream;
mod types;

pub use entropy::EntropyStream;
pub use error::{MetapopError, Result};
pub use stream::{select_weighted, RandomStream};
pub use types::{Params, PatchId};
