//! Common types for MetapopPy simulations.

use crate::error::{MetapopError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a patch within one graph.
///
/// Ids are handed out by the graph in insertion order and stay stable for the
/// graph's lifetime, so a prototype and all of its copies agree on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchId(pub usize);

impl PatchId {
    /// Returns the arena index behind this id.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for PatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Open set of named numeric parameters passed from a harness to an engine.
///
/// Holds both reserved engine keys (start time, max time, record interval)
/// and per-event reaction constants. Events pick out their own keys and
/// ignore everything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, f64>);

impl Params {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    /// Returns the value for `key` or a `MissingParameter` error.
    pub fn require(&self, key: &str) -> Result<f64> {
        self.get(key).ok_or_else(|| MetapopError::missing(key))
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Copies every entry of `other` over this set (other wins).
    pub fn merge(&mut self, other: &Params) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), *value);
        }
    }

    /// Iterates over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
