//! Error types shared by every MetapopPy crate.

use crate::types::PatchId;
use thiserror::Error;

/// Errors raised while building, configuring or running a simulation.
///
/// All of these are fatal: the engine never retries, clamps or skips an
/// invalid state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetapopError {
    /// Missing/invalid prototype, no events, no active patches, zero initial propensity
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A compartment would drop below zero
    #[error("Compartment {compartment} at patch {patch} cannot drop below zero ({value} + {delta})")]
    InvariantViolation {
        patch: PatchId,
        compartment: String,
        value: u64,
        delta: i64,
    },

    /// An event's reaction constant is absent from the parameters
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// A compartment count, or a sum of counts, left the `u64` range
    #[error("Compartment {compartment} at patch {patch} overflowed")]
    Overflow { patch: PatchId, compartment: String },

    /// Patch id not present in the graph
    #[error("Unknown patch: {0}")]
    UnknownPatch(PatchId),

    /// No edge joins the two patches
    #[error("No edge between {0} and {1}")]
    UnknownEdge(PatchId, PatchId),

    /// Compartment or attribute name not declared on the graph/patch
    #[error("Unknown {kind}: {name}")]
    UnknownName { kind: &'static str, name: String },

    /// An event produced a negative or non-finite rate
    #[error("Event {event} produced invalid rate {rate} at patch {patch}")]
    InvalidRate {
        event: String,
        patch: PatchId,
        rate: f64,
    },

    /// File access failed (harness only)
    #[error("I/O error: {0}")]
    Io(String),

    /// Config or export (de)serialization failed (harness only)
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MetapopError {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a missing-parameter error for the given key.
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingParameter(key.into())
    }

    /// Creates an unknown-compartment error.
    pub fn unknown_compartment(name: impl Into<String>) -> Self {
        Self::UnknownName {
            kind: "compartment",
            name: name.into(),
        }
    }

    /// Creates an unknown-attribute error.
    pub fn unknown_attribute(name: impl Into<String>) -> Self {
        Self::UnknownName {
            kind: "attribute",
            name: name.into(),
        }
    }
}

impl From<std::io::Error> for MetapopError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result alias used across the workspace.
pub type Result<T, E = MetapopError> = std::result::Result<T, E>;
