//! MetapopPy Simulation Engine and Harness
//!
//! This crate runs stochastic dynamics over a `metapop_core` patch network
//! with the Gillespie direct method, and hosts the harness around it.
//!
//! # Core Principle: One Owner Per Run
//!
//! A run owns its working graph, rate table and random stream outright:
//! - **Graph**: a fresh copy of the prototype, prepared and seeded per run
//! - **Rates**: kept current by the graph's change handler, synchronously
//! - **Randomness**: an explicit `RandomStream`, never a global generator
//!
//! Replicates therefore share nothing and run in parallel.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                ReplicateRunner (rayon)                │
//! │  ┌─────────────────────────────────────────────────┐  │
//! │  │ Dynamics<M: Model>                              │  │
//! │  │                                                 │  │
//! │  │  PatchGraph ──change handler──► RateTracker     │  │
//! │  │      ▲                              │           │  │
//! │  │      └──── Event::perform ◄── draw (dt, cell)   │  │
//! │  └─────────────────────────────────────────────────┘  │
//! │                  │ Trajectory (snapshots)             │
//! │                  ▼                                    │
//! │              SimExport (JSON)                         │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use metapop_sim::{Dynamics, SeededStream, SirModel, SIR_COMPARTMENTS};
//! use metapop_sim::scenarios::ring;
//!
//! let mut dynamics = Dynamics::new(SirModel)?;
//! dynamics.set_network_prototype(ring(SIR_COMPARTMENTS, 10)?)?;
//! let trajectory = dynamics.simulate(&SirModel::default_params(), &mut SeededStream::new(42))?;
//! ```

mod config;
mod context;
pub mod dynamics;
mod exporter;
mod model;
mod models;
mod runner;
pub mod scenarios;
mod tracker;
mod trajectory;

pub use config::SimConfig;
pub use context::{SeededStream, StreamRng};
pub use dynamics::Dynamics;
pub use exporter::SimExport;
pub use model::Model;
pub use models::{SirModel, SIR_COMPARTMENTS};
pub use runner::{BatchSummary, ReplicateResult, ReplicateRunner};
pub use scenarios::ScenarioId;
pub use tracker::RateTracker;
pub use trajectory::{Snapshot, Termination, Trajectory};
