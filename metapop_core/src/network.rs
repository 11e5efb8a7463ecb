//! The patch network - compartments, attributes and change propagation.
//!
//! A `PatchGraph` is authored once as a prototype (topology plus declared
//! compartment/attribute names) and cloned for every run. The working copy is
//! mutated only through `update_patch` / `update_edge`, which enforce the
//! non-negative compartment invariant and then notify the single registered
//! `ChangeHandler` synchronously.

use crate::selection::NameSelection;
use metapop_env::{MetapopError, PatchId, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Population and environment state of one patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Optional type tag restricting which events may fire here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,

    /// Sub-population counts by compartment name (never negative)
    pub compartments: BTreeMap<String, u64>,

    /// Environmental values by attribute name
    pub attributes: BTreeMap<String, f64>,
}

/// An undirected edge between two patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Endpoints in insertion order
    pub ends: (PatchId, PatchId),

    /// Edge values by attribute name
    pub attributes: BTreeMap<String, f64>,
}

impl Edge {
    /// Returns the endpoint opposite `patch`.
    pub fn other(&self, patch: PatchId) -> PatchId {
        if self.ends.0 == patch {
            self.ends.1
        } else {
            self.ends.0
        }
    }
}

/// Description of one committed mutation, passed to the change handler.
///
/// Edge mutations are reported to both endpoints through `attributes`;
/// `edge_attributes` is kept for handlers that want to distinguish them but
/// the graph itself never fills it.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchChange<'a> {
    pub patch: PatchId,
    pub compartments: Vec<&'a str>,
    pub attributes: Vec<&'a str>,
    pub edge_attributes: Vec<&'a str>,
}

/// Callback invoked after every committed graph mutation.
///
/// Runs synchronously inside `update_patch` / `update_edge`; an error returned
/// here is propagated to the caller of the update.
pub trait ChangeHandler {
    fn on_change(&mut self, graph: &PatchGraph, change: &PatchChange<'_>) -> Result<()>;
}

impl<F> ChangeHandler for F
where
    F: FnMut(&PatchGraph, &PatchChange<'_>) -> Result<()>,
{
    fn on_change(&mut self, graph: &PatchGraph, change: &PatchChange<'_>) -> Result<()> {
        self(graph, change)
    }
}

/// Boxes a closure as a change handler.
pub fn handler_fn<F>(f: F) -> Box<dyn ChangeHandler>
where
    F: FnMut(&PatchGraph, &PatchChange<'_>) -> Result<()> + 'static,
{
    Box::new(f)
}

/// Graph of patches and edges with declared compartment/attribute names.
pub struct PatchGraph {
    compartments: Vec<String>,
    patch_attributes: Vec<String>,
    edge_attributes: Vec<String>,

    /// Present on typed graphs: attribute names each patch type carries
    attributes_by_type: Option<BTreeMap<String, Vec<String>>>,

    patches: Vec<Patch>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<(PatchId, usize)>>,
    edge_lookup: HashMap<(PatchId, PatchId), usize>,
    patches_by_type: BTreeMap<String, Vec<PatchId>>,

    handler: Option<Box<dyn ChangeHandler>>,
}

fn edge_key(u: PatchId, v: PatchId) -> (PatchId, PatchId) {
    if u <= v {
        (u, v)
    } else {
        (v, u)
    }
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

impl PatchGraph {
    /// Creates an empty graph where every patch carries every declared name.
    pub fn new(compartments: &[&str], patch_attributes: &[&str], edge_attributes: &[&str]) -> Self {
        Self {
            compartments: owned(compartments),
            patch_attributes: owned(patch_attributes),
            edge_attributes: owned(edge_attributes),
            attributes_by_type: None,
            patches: Vec::new(),
            edges: Vec::new(),
            adjacency: Vec::new(),
            edge_lookup: HashMap::new(),
            patches_by_type: BTreeMap::new(),
            handler: None,
        }
    }

    /// Creates an empty typed graph.
    ///
    /// Each patch must be given a type before `prepare`, and only carries the
    /// attributes listed for its type (patches of unlisted types carry none).
    pub fn typed(
        compartments: &[&str],
        attributes_by_type: &[(&str, &[&str])],
        edge_attributes: &[&str],
    ) -> Self {
        let mut all_attributes: Vec<String> = Vec::new();
        let mut by_type = BTreeMap::new();
        for (patch_type, attributes) in attributes_by_type {
            for attribute in attributes.iter() {
                if !all_attributes.iter().any(|a| a == attribute) {
                    all_attributes.push(attribute.to_string());
                }
            }
            by_type.insert(patch_type.to_string(), owned(attributes));
        }

        let mut graph = Self::new(compartments, &[], edge_attributes);
        graph.patch_attributes = all_attributes;
        graph.attributes_by_type = Some(by_type);
        graph
    }

    /// Returns true if this graph restricts attributes by patch type.
    pub fn is_typed(&self) -> bool {
        self.attributes_by_type.is_some()
    }

    pub fn compartments(&self) -> &[String] {
        &self.compartments
    }

    pub fn patch_attributes(&self) -> &[String] {
        &self.patch_attributes
    }

    pub fn edge_attributes(&self) -> &[String] {
        &self.edge_attributes
    }

    // ── Topology ──────────────────────────────────────────────────────

    /// Adds a patch and returns its id.
    pub fn add_patch(&mut self) -> PatchId {
        let id = PatchId(self.patches.len());
        let mut patch = Patch::default();
        self.zero_patch(&mut patch);
        self.patches.push(patch);
        self.adjacency.push(Vec::new());
        id
    }

    /// Adds `count` patches and returns their ids.
    pub fn add_patches(&mut self, count: usize) -> Vec<PatchId> {
        (0..count).map(|_| self.add_patch()).collect()
    }

    /// Adds a patch with the given type tag.
    pub fn add_typed_patch(&mut self, patch_type: &str) -> PatchId {
        let id = self.add_patch();
        self.assign_type(id.index(), patch_type);
        id
    }

    /// Joins two patches. Adding an existing edge again is a no-op.
    pub fn add_edge(&mut self, u: PatchId, v: PatchId) -> Result<()> {
        self.index_of(u)?;
        self.index_of(v)?;
        if u == v {
            return Err(MetapopError::configuration(format!(
                "Self-loop at patch {} is not allowed",
                u
            )));
        }
        let key = edge_key(u, v);
        if self.edge_lookup.contains_key(&key) {
            return Ok(());
        }

        let attributes = self
            .edge_attributes
            .iter()
            .map(|a| (a.clone(), 0.0))
            .collect();
        let idx = self.edges.len();
        self.edges.push(Edge {
            ends: (u, v),
            attributes,
        });
        self.edge_lookup.insert(key, idx);
        self.adjacency[u.index()].push((v, idx));
        self.adjacency[v.index()].push((u, idx));
        Ok(())
    }

    /// Assigns a type tag to a patch.
    ///
    /// On typed graphs the patch's attributes are reset to the names its new
    /// type declares.
    pub fn set_patch_type(&mut self, patch: PatchId, patch_type: &str) -> Result<()> {
        let idx = self.index_of(patch)?;
        self.assign_type(idx, patch_type);
        Ok(())
    }

    fn assign_type(&mut self, idx: usize, patch_type: &str) {
        let id = PatchId(idx);
        if let Some(old) = self.patches[idx].patch_type.take() {
            if let Some(ids) = self.patches_by_type.get_mut(&old) {
                ids.retain(|p| *p != id);
            }
        }
        self.patches[idx].patch_type = Some(patch_type.to_string());
        self.patches_by_type
            .entry(patch_type.to_string())
            .or_default()
            .push(id);

        if self.is_typed() {
            let mut patch = std::mem::take(&mut self.patches[idx]);
            patch.attributes = self.declared_attributes_for(patch.patch_type.as_deref());
            self.patches[idx] = patch;
        }
    }

    pub fn patch_type(&self, patch: PatchId) -> Result<Option<&str>> {
        Ok(self.patch(patch)?.patch_type.as_deref())
    }

    /// Returns the ids of all patches with the given type (empty if none).
    pub fn patches_by_type(&self, patch_type: &str) -> &[PatchId] {
        self.patches_by_type
            .get(patch_type)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Iterates over all patch ids in insertion order.
    pub fn patch_ids(&self) -> impl Iterator<Item = PatchId> + '_ {
        (0..self.patches.len()).map(PatchId)
    }

    pub fn patch(&self, patch: PatchId) -> Result<&Patch> {
        self.patches
            .get(patch.index())
            .ok_or(MetapopError::UnknownPatch(patch))
    }

    pub fn edge(&self, u: PatchId, v: PatchId) -> Result<&Edge> {
        self.edge_lookup
            .get(&edge_key(u, v))
            .map(|idx| &self.edges[*idx])
            .ok_or(MetapopError::UnknownEdge(u, v))
    }

    /// Iterates over `(neighbour, edge)` pairs incident to `patch`.
    pub fn neighbours(&self, patch: PatchId) -> impl Iterator<Item = (PatchId, &Edge)> + '_ {
        self.adjacency
            .get(patch.index())
            .into_iter()
            .flatten()
            .map(move |(n, idx)| (*n, &self.edges[*idx]))
    }

    fn index_of(&self, patch: PatchId) -> Result<usize> {
        if patch.index() < self.patches.len() {
            Ok(patch.index())
        } else {
            Err(MetapopError::UnknownPatch(patch))
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────

    /// Resets every compartment and attribute to zero.
    ///
    /// Typed graphs are validated first: every patch must carry a type, and
    /// the type index is rebuilt.
    pub fn prepare(&mut self) -> Result<()> {
        if self.is_typed() {
            if let Some(untyped) = self.patches.iter().position(|p| p.patch_type.is_none()) {
                return Err(MetapopError::configuration(format!(
                    "Patch {} must be assigned a patch type",
                    PatchId(untyped)
                )));
            }
        }

        self.patches_by_type.clear();
        for (idx, patch) in self.patches.iter().enumerate() {
            if let Some(patch_type) = &patch.patch_type {
                self.patches_by_type
                    .entry(patch_type.clone())
                    .or_default()
                    .push(PatchId(idx));
            }
        }

        let mut patches = std::mem::take(&mut self.patches);
        for patch in patches.iter_mut() {
            self.zero_patch(patch);
        }
        self.patches = patches;

        for edge in self.edges.iter_mut() {
            edge.attributes = self
                .edge_attributes
                .iter()
                .map(|a| (a.clone(), 0.0))
                .collect();
        }
        debug!(
            "Prepared graph: {} patches, {} edges, {} compartments",
            self.patches.len(),
            self.edges.len(),
            self.compartments.len()
        );
        Ok(())
    }

    fn zero_patch(&self, patch: &mut Patch) {
        patch.compartments = self.compartments.iter().map(|c| (c.clone(), 0)).collect();
        patch.attributes = self.declared_attributes_for(patch.patch_type.as_deref());
    }

    fn declared_attributes_for(&self, patch_type: Option<&str>) -> BTreeMap<String, f64> {
        let names: &[String] = match (&self.attributes_by_type, patch_type) {
            (None, _) => &self.patch_attributes,
            (Some(by_type), Some(t)) => by_type.get(t).map(|v| v.as_slice()).unwrap_or(&[]),
            (Some(_), None) => &[],
        };
        names.iter().map(|a| (a.clone(), 0.0)).collect()
    }

    /// Registers the change handler, replacing any previous one.
    pub fn set_handler(&mut self, handler: Box<dyn ChangeHandler>) {
        self.handler = Some(handler);
    }

    /// Removes the change handler.
    pub fn clear_handler(&mut self) {
        self.handler = None;
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    // ── Accessors ─────────────────────────────────────────────────────

    /// Returns a compartment count, or the sum over a list of compartments.
    pub fn get_compartment_value<S: NameSelection + ?Sized>(
        &self,
        patch: PatchId,
        names: &S,
    ) -> Result<u64> {
        let record = self.patch(patch)?;
        let mut total = 0u64;
        names.try_for_each_name(&mut |name| {
            let value = record
                .compartments
                .get(name)
                .ok_or_else(|| MetapopError::unknown_compartment(name))?;
            total = total.checked_add(*value).ok_or_else(|| MetapopError::Overflow {
                patch,
                compartment: name.to_string(),
            })?;
            Ok(())
        })?;
        Ok(total)
    }

    /// Returns an attribute value, or the sum over a list of attributes.
    pub fn get_attribute_value<S: NameSelection + ?Sized>(
        &self,
        patch: PatchId,
        names: &S,
    ) -> Result<f64> {
        let record = self.patch(patch)?;
        let mut total = 0.0;
        names.try_for_each_name(&mut |name| {
            total += record
                .attributes
                .get(name)
                .ok_or_else(|| MetapopError::unknown_attribute(name))?;
            Ok(())
        })?;
        Ok(total)
    }

    pub fn get_edge_attribute(&self, u: PatchId, v: PatchId, name: &str) -> Result<f64> {
        self.edge(u, v)?
            .attributes
            .get(name)
            .copied()
            .ok_or_else(|| MetapopError::unknown_attribute(name))
    }

    /// Deep copy of every patch's state, keyed by id.
    pub fn snapshot(&self) -> BTreeMap<PatchId, Patch> {
        self.patches
            .iter()
            .enumerate()
            .map(|(idx, p)| (PatchId(idx), p.clone()))
            .collect()
    }

    // ── Mutators ──────────────────────────────────────────────────────

    /// Applies additive compartment and attribute deltas to a patch.
    ///
    /// All-or-nothing: if any compartment would go negative (or a name is not
    /// declared on the patch) nothing is applied and the handler is not
    /// called. On success the handler is called once with the changed names.
    pub fn update_patch(
        &mut self,
        patch: PatchId,
        compartment_deltas: &[(&str, i64)],
        attribute_deltas: &[(&str, f64)],
    ) -> Result<()> {
        let idx = self.index_of(patch)?;
        let record = &self.patches[idx];

        let mut staged: Vec<(&str, u64)> = Vec::with_capacity(compartment_deltas.len());
        for &(name, delta) in compartment_deltas {
            let current = match staged.iter().find(|(n, _)| *n == name) {
                Some((_, value)) => *value,
                None => *record
                    .compartments
                    .get(name)
                    .ok_or_else(|| MetapopError::unknown_compartment(name))?,
            };
            let next = current as i128 + delta as i128;
            if next < 0 {
                debug!("Rejected update at patch {}: {} {} {:+}", patch, name, current, delta);
                return Err(MetapopError::InvariantViolation {
                    patch,
                    compartment: name.to_string(),
                    value: current,
                    delta,
                });
            }
            let next = u64::try_from(next).map_err(|_| MetapopError::Overflow {
                patch,
                compartment: name.to_string(),
            })?;
            match staged.iter_mut().find(|(n, _)| *n == name) {
                Some(entry) => entry.1 = next,
                None => staged.push((name, next)),
            }
        }
        for &(name, _) in attribute_deltas {
            if !record.attributes.contains_key(name) {
                return Err(MetapopError::unknown_attribute(name));
            }
        }

        let record = &mut self.patches[idx];
        for (name, value) in staged {
            if let Some(slot) = record.compartments.get_mut(name) {
                *slot = value;
            }
        }
        for &(name, delta) in attribute_deltas {
            if let Some(slot) = record.attributes.get_mut(name) {
                *slot += delta;
            }
        }

        let change = PatchChange {
            patch,
            compartments: compartment_deltas.iter().map(|(n, _)| *n).collect(),
            attributes: attribute_deltas.iter().map(|(n, _)| *n).collect(),
            edge_attributes: Vec::new(),
        };
        self.notify(&change)
    }

    /// Applies additive deltas to an edge's attributes.
    ///
    /// The handler is called for `u` then `v`, with the changed edge attribute
    /// names reported as attribute changes.
    pub fn update_edge(&mut self, u: PatchId, v: PatchId, attribute_deltas: &[(&str, f64)]) -> Result<()> {
        let idx = *self
            .edge_lookup
            .get(&edge_key(u, v))
            .ok_or(MetapopError::UnknownEdge(u, v))?;
        let edge = &mut self.edges[idx];
        for &(name, _) in attribute_deltas {
            if !edge.attributes.contains_key(name) {
                return Err(MetapopError::unknown_attribute(name));
            }
        }
        for &(name, delta) in attribute_deltas {
            if let Some(slot) = edge.attributes.get_mut(name) {
                *slot += delta;
            }
        }

        let names: Vec<&str> = attribute_deltas.iter().map(|(n, _)| *n).collect();
        for endpoint in [u, v] {
            let change = PatchChange {
                patch: endpoint,
                compartments: Vec::new(),
                attributes: names.clone(),
                edge_attributes: Vec::new(),
            };
            self.notify(&change)?;
        }
        Ok(())
    }

    fn notify(&mut self, change: &PatchChange<'_>) -> Result<()> {
        match self.handler.take() {
            Some(mut handler) => {
                let result = handler.on_change(self, change);
                if self.handler.is_none() {
                    self.handler = Some(handler);
                }
                result
            }
            None => Ok(()),
        }
    }
}

impl Clone for PatchGraph {
    /// Deep copy of topology and state. The handler is not carried over.
    fn clone(&self) -> Self {
        Self {
            compartments: self.compartments.clone(),
            patch_attributes: self.patch_attributes.clone(),
            edge_attributes: self.edge_attributes.clone(),
            attributes_by_type: self.attributes_by_type.clone(),
            patches: self.patches.clone(),
            edges: self.edges.clone(),
            adjacency: self.adjacency.clone(),
            edge_lookup: self.edge_lookup.clone(),
            patches_by_type: self.patches_by_type.clone(),
            handler: None,
        }
    }
}

impl std::fmt::Debug for PatchGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchGraph")
            .field("compartments", &self.compartments)
            .field("patch_attributes", &self.patch_attributes)
            .field("edge_attributes", &self.edge_attributes)
            .field("patches", &self.patches.len())
            .field("edges", &self.edges.len())
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
