//! Standard event kinds.
//!
//! - `Change`: mass-action conversion (or removal) of one unit
//! - `Infect`: mass-action contact between susceptible and infectious counts
//! - `Ingest`: saturating (Michaelis-Menten) uptake of a substrate, optionally infecting the actor
//! - `Move`: transfer of one unit to a neighbour chosen by edge weight
//! - `Translocate`: carrier (plus carried cargo) transfer to a neighbour of a given type

use crate::event::{configured, Event};
use crate::network::PatchGraph;
use metapop_env::{MetapopError, Params, PatchId, RandomStream, Result};

/// Neighbours of `patch` that may receive a transfer, with their weights.
fn eligible_neighbours(
    graph: &PatchGraph,
    patch: PatchId,
    destination_type: Option<&str>,
    weight_attribute: Option<&str>,
) -> Result<Vec<(PatchId, f64)>> {
    let mut candidates = Vec::new();
    for (neighbour, edge) in graph.neighbours(patch) {
        if let Some(wanted) = destination_type {
            if graph.patch_type(neighbour)? != Some(wanted) {
                continue;
            }
        }
        let weight = match weight_attribute {
            Some(name) => *edge
                .attributes
                .get(name)
                .ok_or_else(|| MetapopError::unknown_attribute(name))?,
            None => 1.0,
        };
        candidates.push((neighbour, weight));
    }
    Ok(candidates)
}

fn has_destination(candidates: &[(PatchId, f64)]) -> bool {
    candidates.iter().any(|(_, w)| *w > 0.0)
}

fn choose_destination(
    event: &dyn Event,
    graph: &PatchGraph,
    patch: PatchId,
    destination_type: Option<&str>,
    weight_attribute: Option<&str>,
    rng: &mut dyn RandomStream,
) -> Result<PatchId> {
    let candidates = eligible_neighbours(graph, patch, destination_type, weight_attribute)?;
    let weights: Vec<f64> = candidates.iter().map(|(_, w)| *w).collect();
    rng.choose_weighted(&weights)
        .map(|idx| candidates[idx].0)
        .ok_or_else(|| {
            MetapopError::configuration(format!(
                "{} has no eligible destination from patch {}",
                event.name(),
                patch
            ))
        })
}

// ── Change ───────────────────────────────────────────────────────────

/// Mass-action conversion: rate `k * count(from)`, moves one unit `from -> to`.
#[derive(Debug, Clone)]
pub struct Change {
    from: String,
    to: Option<String>,
    key: String,
    rate: Option<f64>,
}

impl Change {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: Some(to.to_string()),
            key: format!("{}_to_{}_rate", from, to),
            rate: None,
        }
    }

    /// A change that removes the unit instead of converting it.
    pub fn removal(from: &str) -> Self {
        Self {
            from: from.to_string(),
            to: None,
            key: format!("{}_removal_rate", from),
            rate: None,
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }
}

impl Event for Change {
    fn name(&self) -> String {
        match &self.to {
            Some(to) => format!("change({}->{})", self.from, to),
            None => format!("removal({})", self.from),
        }
    }

    fn reaction_parameters(&self) -> Vec<&str> {
        vec![self.key.as_str()]
    }

    fn set_parameters(&mut self, params: &Params) -> Result<()> {
        self.rate = Some(params.require(&self.key)?);
        Ok(())
    }

    fn calculate_rate_at_patch(&self, graph: &PatchGraph, patch: PatchId) -> Result<f64> {
        let k = configured(self.rate, &self.key)?;
        Ok(k * graph.get_compartment_value(patch, &self.from)? as f64)
    }

    fn perform(&self, graph: &mut PatchGraph, patch: PatchId, _rng: &mut dyn RandomStream) -> Result<()> {
        let mut deltas = vec![(self.from.as_str(), -1)];
        if let Some(to) = &self.to {
            deltas.push((to.as_str(), 1));
        }
        graph.update_patch(patch, &deltas, &[])
    }
}

// ── Infect ───────────────────────────────────────────────────────────

/// Mass-action infection: rate `beta * S * sum(infectious)`, moves one unit
/// `susceptible -> result`.
#[derive(Debug, Clone)]
pub struct Infect {
    susceptible: String,
    infectious: Vec<String>,
    result: String,
    key: String,
    rate: Option<f64>,
}

impl Infect {
    pub fn new(susceptible: &str, infectious: &[&str], result: &str) -> Self {
        Self {
            susceptible: susceptible.to_string(),
            infectious: infectious.iter().map(|c| c.to_string()).collect(),
            result: result.to_string(),
            key: format!("{}_infection_rate", susceptible),
            rate: None,
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }
}

impl Event for Infect {
    fn name(&self) -> String {
        format!("infect({}->{})", self.susceptible, self.result)
    }

    fn reaction_parameters(&self) -> Vec<&str> {
        vec![self.key.as_str()]
    }

    fn set_parameters(&mut self, params: &Params) -> Result<()> {
        self.rate = Some(params.require(&self.key)?);
        Ok(())
    }

    fn calculate_rate_at_patch(&self, graph: &PatchGraph, patch: PatchId) -> Result<f64> {
        let beta = configured(self.rate, &self.key)?;
        let susceptible = graph.get_compartment_value(patch, &self.susceptible)? as f64;
        let infectious = graph.get_compartment_value(patch, &self.infectious)? as f64;
        Ok(beta * susceptible * infectious)
    }

    fn perform(&self, graph: &mut PatchGraph, patch: PatchId, _rng: &mut dyn RandomStream) -> Result<()> {
        graph.update_patch(
            patch,
            &[(self.susceptible.as_str(), -1), (self.result.as_str(), 1)],
            &[],
        )
    }
}

// ── Ingest ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Infection {
    infected_actor: String,
    cargo: String,
}

/// Saturating uptake: rate `k * actor * B / (B + K)` where `B` sums the
/// substrate compartments.
///
/// Firing consumes one substrate unit, picked in proportion to each
/// substrate's count. If infection is configured, the actor then becomes its
/// infected form with probability `p` and gains one unit of intracellular
/// cargo.
#[derive(Debug, Clone)]
pub struct Ingest {
    actor: String,
    substrates: Vec<String>,
    infection: Option<Infection>,
    rate_key: String,
    half_sat_key: String,
    probability_key: String,
    rate: Option<f64>,
    half_sat: Option<f64>,
    infection_probability: Option<f64>,
}

impl Ingest {
    /// Keys are `<prefix>_rate`, `<prefix>_half_sat` and, once infection is
    /// configured, `<prefix>_infection_probability`.
    pub fn new(prefix: &str, actor: &str, substrates: &[&str]) -> Self {
        Self {
            actor: actor.to_string(),
            substrates: substrates.iter().map(|s| s.to_string()).collect(),
            infection: None,
            rate_key: format!("{}_rate", prefix),
            half_sat_key: format!("{}_half_sat", prefix),
            probability_key: format!("{}_infection_probability", prefix),
            rate: None,
            half_sat: None,
            infection_probability: None,
        }
    }

    /// Overrides the infection-probability key, e.g. to share one
    /// probability between several ingestion events.
    pub fn with_probability_key(mut self, key: &str) -> Self {
        self.probability_key = key.to_string();
        self
    }

    pub fn infecting(mut self, infected_actor: &str, cargo: &str) -> Self {
        self.infection = Some(Infection {
            infected_actor: infected_actor.to_string(),
            cargo: cargo.to_string(),
        });
        self
    }
}

impl Event for Ingest {
    fn name(&self) -> String {
        format!("ingest({})", self.actor)
    }

    fn reaction_parameters(&self) -> Vec<&str> {
        let mut keys = vec![self.rate_key.as_str(), self.half_sat_key.as_str()];
        if self.infection.is_some() {
            keys.push(self.probability_key.as_str());
        }
        keys
    }

    fn set_parameters(&mut self, params: &Params) -> Result<()> {
        self.rate = Some(params.require(&self.rate_key)?);
        self.half_sat = Some(params.require(&self.half_sat_key)?);
        if self.infection.is_some() {
            self.infection_probability = Some(params.require(&self.probability_key)?);
        }
        Ok(())
    }

    fn calculate_rate_at_patch(&self, graph: &PatchGraph, patch: PatchId) -> Result<f64> {
        let k = configured(self.rate, &self.rate_key)?;
        let half_sat = configured(self.half_sat, &self.half_sat_key)?;
        let actor = graph.get_compartment_value(patch, &self.actor)?;
        let substrate = graph.get_compartment_value(patch, &self.substrates)? as f64;
        if actor == 0 || substrate == 0.0 {
            return Ok(0.0);
        }
        Ok(k * actor as f64 * (substrate / (substrate + half_sat)))
    }

    fn perform(&self, graph: &mut PatchGraph, patch: PatchId, rng: &mut dyn RandomStream) -> Result<()> {
        let mut weights = Vec::with_capacity(self.substrates.len());
        for substrate in &self.substrates {
            weights.push(graph.get_compartment_value(patch, substrate)? as f64);
        }
        let chosen = rng.choose_weighted(&weights).ok_or_else(|| {
            MetapopError::configuration(format!("{} has no substrate at patch {}", self.name(), patch))
        })?;

        let mut deltas = vec![(self.substrates[chosen].as_str(), -1)];
        if let Some(infection) = &self.infection {
            let p = configured(self.infection_probability, &self.probability_key)?;
            if rng.next_f64() < p {
                deltas.push((self.actor.as_str(), -1));
                deltas.push((infection.infected_actor.as_str(), 1));
                deltas.push((infection.cargo.as_str(), 1));
            }
        }
        graph.update_patch(patch, &deltas, &[])
    }
}

// ── Move ─────────────────────────────────────────────────────────────

/// Neighbour transfer: rate `k * count` while the patch has a neighbour with
/// positive weight; moves one unit to a neighbour drawn in proportion to an
/// edge attribute (uniformly when none is named).
#[derive(Debug, Clone)]
pub struct Move {
    compartment: String,
    weight_attribute: Option<String>,
    key: String,
    rate: Option<f64>,
}

impl Move {
    pub fn new(compartment: &str) -> Self {
        Self {
            compartment: compartment.to_string(),
            weight_attribute: None,
            key: format!("{}_move_rate", compartment),
            rate: None,
        }
    }

    pub fn weighted_by(mut self, edge_attribute: &str) -> Self {
        self.weight_attribute = Some(edge_attribute.to_string());
        self
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }
}

impl Event for Move {
    fn name(&self) -> String {
        format!("move({})", self.compartment)
    }

    fn reaction_parameters(&self) -> Vec<&str> {
        vec![self.key.as_str()]
    }

    fn set_parameters(&mut self, params: &Params) -> Result<()> {
        self.rate = Some(params.require(&self.key)?);
        Ok(())
    }

    fn calculate_rate_at_patch(&self, graph: &PatchGraph, patch: PatchId) -> Result<f64> {
        let k = configured(self.rate, &self.key)?;
        let count = graph.get_compartment_value(patch, &self.compartment)?;
        if count == 0 {
            return Ok(0.0);
        }
        let candidates = eligible_neighbours(graph, patch, None, self.weight_attribute.as_deref())?;
        if !has_destination(&candidates) {
            return Ok(0.0);
        }
        Ok(k * count as f64)
    }

    fn perform(&self, graph: &mut PatchGraph, patch: PatchId, rng: &mut dyn RandomStream) -> Result<()> {
        let destination = choose_destination(self, graph, patch, None, self.weight_attribute.as_deref(), rng)?;
        graph.update_patch(patch, &[(self.compartment.as_str(), -1)], &[])?;
        graph.update_patch(destination, &[(self.compartment.as_str(), 1)], &[])
    }
}

// ── Translocate ──────────────────────────────────────────────────────

/// Carrier translocation between patch roles.
///
/// Rate is `k * count(carrier) * attribute(patch)` (attribute factor 1 when
/// none is named) while an eligible destination exists. Firing moves one
/// carrier, plus `round(cargo / carriers)` units of its cargo, to a neighbour
/// of the destination type drawn by edge weight.
#[derive(Debug, Clone)]
pub struct Translocate {
    carrier: String,
    cargo: Option<String>,
    destination_type: Option<String>,
    rate_attribute: Option<String>,
    weight_attribute: Option<String>,
    key: String,
    rate: Option<f64>,
}

impl Translocate {
    pub fn new(carrier: &str) -> Self {
        Self {
            carrier: carrier.to_string(),
            cargo: None,
            destination_type: None,
            rate_attribute: None,
            weight_attribute: None,
            key: format!("{}_translocation_rate", carrier),
            rate: None,
        }
    }

    /// Compartment carried along with each carrier.
    pub fn carrying(mut self, cargo: &str) -> Self {
        self.cargo = Some(cargo.to_string());
        self
    }

    /// Only neighbours of this patch type receive the carrier.
    pub fn towards(mut self, patch_type: &str) -> Self {
        self.destination_type = Some(patch_type.to_string());
        self
    }

    /// Patch attribute scaling the rate (e.g. lymphatic drainage).
    pub fn scaled_by(mut self, patch_attribute: &str) -> Self {
        self.rate_attribute = Some(patch_attribute.to_string());
        self
    }

    /// Edge attribute weighting the destination draw (e.g. perfusion).
    pub fn weighted_by(mut self, edge_attribute: &str) -> Self {
        self.weight_attribute = Some(edge_attribute.to_string());
        self
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }
}

impl Event for Translocate {
    fn name(&self) -> String {
        match &self.destination_type {
            Some(t) => format!("translocate({}->{})", self.carrier, t),
            None => format!("translocate({})", self.carrier),
        }
    }

    fn reaction_parameters(&self) -> Vec<&str> {
        vec![self.key.as_str()]
    }

    fn set_parameters(&mut self, params: &Params) -> Result<()> {
        self.rate = Some(params.require(&self.key)?);
        Ok(())
    }

    fn calculate_rate_at_patch(&self, graph: &PatchGraph, patch: PatchId) -> Result<f64> {
        let k = configured(self.rate, &self.key)?;
        let carriers = graph.get_compartment_value(patch, &self.carrier)?;
        if carriers == 0 {
            return Ok(0.0);
        }
        let candidates = eligible_neighbours(
            graph,
            patch,
            self.destination_type.as_deref(),
            self.weight_attribute.as_deref(),
        )?;
        if !has_destination(&candidates) {
            return Ok(0.0);
        }
        let scale = match &self.rate_attribute {
            Some(attribute) => graph.get_attribute_value(patch, attribute)?,
            None => 1.0,
        };
        Ok(k * carriers as f64 * scale)
    }

    fn perform(&self, graph: &mut PatchGraph, patch: PatchId, rng: &mut dyn RandomStream) -> Result<()> {
        let destination = choose_destination(
            self,
            graph,
            patch,
            self.destination_type.as_deref(),
            self.weight_attribute.as_deref(),
            rng,
        )?;

        let mut leaving = vec![(self.carrier.as_str(), -1i64)];
        let mut arriving = vec![(self.carrier.as_str(), 1i64)];
        if let Some(cargo) = &self.cargo {
            let carriers = graph.get_compartment_value(patch, &self.carrier)?;
            let carried = graph.get_compartment_value(patch, cargo)?;
            let moved = if carriers == 0 {
                0
            } else {
                (carried as f64 / carriers as f64).round() as i64
            };
            leaving.push((cargo.as_str(), -moved));
            arriving.push((cargo.as_str(), moved));
        }

        graph.update_patch(patch, &leaving, &[])?;
        graph.update_patch(destination, &arriving, &[])
    }
}
