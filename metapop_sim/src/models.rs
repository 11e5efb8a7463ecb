//! Demonstration models.

use crate::context::StreamRng;
use crate::model::Model;
use crate::scenarios::MOBILITY;
use metapop_core::{Change, Event, EventExt, Infect, Move, PatchGraph};
use metapop_env::{MetapopError, Params, PatchId, RandomStream, Result};
use rand_distr::{Distribution, Poisson};

pub const SIR_COMPARTMENTS: &[&str] = &["S", "I", "R"];

/// Seeding keys read by `SirModel`
pub const SUSCEPTIBLE_MEAN: &str = "initial_susceptible_mean";
pub const INITIAL_INFECTED: &str = "initial_infected";
pub const INFECTION_LOCATION: &str = "initial_infection_location";
pub const EDGE_MOBILITY: &str = "edge_mobility";

/// Susceptible / infected / recovered epidemic with movement between patches.
///
/// The network is seeded with the initial infecteds at one patch (index
/// `initial_infection_location`, default 0) and a uniform edge mobility. Each
/// patch draws its susceptibles from a Poisson distribution when it becomes
/// active. Equilibrium is reached at the maximum time or once no infected
/// individuals remain.
#[derive(Debug, Clone, Copy, Default)]
pub struct SirModel;

impl SirModel {
    /// Reaction constants with plausible defaults, for the CLI.
    pub fn default_params() -> Params {
        Params::new()
            .with("S_infection_rate", 0.002)
            .with("I_to_R_rate", 0.1)
            .with("S_move_rate", 0.01)
            .with("I_move_rate", 0.01)
            .with("R_move_rate", 0.01)
            .with(SUSCEPTIBLE_MEAN, 100.0)
            .with(INITIAL_INFECTED, 1.0)
            .with(INFECTION_LOCATION, 0.0)
            .with(EDGE_MOBILITY, 1.0)
    }
}

fn count_param(params: &Params, key: &str, default: f64) -> Result<f64> {
    let value = params.get(key).unwrap_or(default);
    if !value.is_finite() || value < 0.0 {
        return Err(MetapopError::configuration(format!(
            "{} must be a non-negative number, got {}",
            key, value
        )));
    }
    Ok(value)
}

impl Model for SirModel {
    fn name(&self) -> &str {
        "sir"
    }

    fn create_events(&self) -> Vec<Box<dyn Event>> {
        let mut events = vec![
            Infect::new("S", &["I"], "I").boxed(),
            Change::new("I", "R").boxed(),
        ];
        for compartment in SIR_COMPARTMENTS {
            events.push(Move::new(compartment).weighted_by(MOBILITY).boxed());
        }
        events
    }

    fn seed_network(&self, graph: &mut PatchGraph, params: &Params, _rng: &mut dyn RandomStream) -> Result<()> {
        let infected = count_param(params, INITIAL_INFECTED, 1.0)?.round() as i64;
        let location = count_param(params, INFECTION_LOCATION, 0.0)?;
        let mobility = count_param(params, EDGE_MOBILITY, 1.0)?;

        if location.fract() != 0.0 {
            return Err(MetapopError::configuration(format!(
                "{} must be a patch index, got {}",
                INFECTION_LOCATION, location
            )));
        }
        graph.update_patch(PatchId(location as usize), &[("I", infected)], &[])?;

        let mut edges = Vec::new();
        for patch in graph.patch_ids() {
            for (neighbour, _) in graph.neighbours(patch) {
                if neighbour > patch {
                    edges.push((patch, neighbour));
                }
            }
        }
        for (u, v) in edges {
            graph.update_edge(u, v, &[(MOBILITY, mobility)])?;
        }
        Ok(())
    }

    fn seed_activated_patch(
        &self,
        graph: &mut PatchGraph,
        patch: PatchId,
        params: &Params,
        rng: &mut dyn RandomStream,
    ) -> Result<()> {
        let mean = count_param(params, SUSCEPTIBLE_MEAN, 100.0)?;
        if mean == 0.0 {
            return Ok(());
        }
        let poisson = Poisson::new(mean)
            .map_err(|e| MetapopError::configuration(format!("{}: {}", SUSCEPTIBLE_MEAN, e)))?;
        let susceptible = poisson.sample(&mut StreamRng(&mut *rng)) as i64;
        graph.update_patch(patch, &[("S", susceptible)], &[])
    }

    fn at_equilibrium(&self, time: f64, max_time: f64, graph: &PatchGraph) -> bool {
        if time >= max_time {
            return true;
        }
        let infected: u64 = graph
            .patch_ids()
            .filter_map(|p| graph.get_compartment_value(p, "I").ok())
            .sum();
        infected == 0
    }
}
