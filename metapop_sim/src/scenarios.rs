//! Demonstration network topologies.

use metapop_core::PatchGraph;
use metapop_env::{MetapopError, Result};

/// Edge attribute carried by every demonstration network
pub const MOBILITY: &str = "mobility";

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// One isolated patch (well-mixed population)
    SinglePatch,

    /// Patches joined in a cycle
    Ring,

    /// Square grid with four-neighbour edges
    Lattice,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![ScenarioId::SinglePatch, ScenarioId::Ring, ScenarioId::Lattice]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SinglePatch => "single_patch",
            ScenarioId::Ring => "ring",
            ScenarioId::Lattice => "lattice",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SinglePatch => "Single well-mixed patch, size ignored",
            ScenarioId::Ring => "N patches in a cycle, unit mobility on every edge",
            ScenarioId::Lattice => "N x N grid, unit mobility between orthogonal neighbours",
        }
    }

    /// Builds the unprepared prototype for this scenario.
    pub fn build_network(&self, compartments: &[&str], size: usize) -> Result<PatchGraph> {
        match self {
            ScenarioId::SinglePatch => Ok(single_patch(compartments)),
            ScenarioId::Ring => ring(compartments, size),
            ScenarioId::Lattice => lattice(compartments, size, size),
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_patch" | "singlepatch" | "single" => Ok(ScenarioId::SinglePatch),
            "ring" | "cycle" => Ok(ScenarioId::Ring),
            "lattice" | "grid" => Ok(ScenarioId::Lattice),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

pub fn single_patch(compartments: &[&str]) -> PatchGraph {
    let mut graph = PatchGraph::new(compartments, &[], &[MOBILITY]);
    graph.add_patch();
    graph
}

pub fn ring(compartments: &[&str], n: usize) -> Result<PatchGraph> {
    if n == 0 {
        return Err(MetapopError::configuration("Ring needs at least one patch"));
    }
    let mut graph = PatchGraph::new(compartments, &[], &[MOBILITY]);
    let ids = graph.add_patches(n);
    if n > 1 {
        for i in 0..n {
            graph.add_edge(ids[i], ids[(i + 1) % n])?;
        }
    }
    Ok(graph)
}

pub fn lattice(compartments: &[&str], width: usize, height: usize) -> Result<PatchGraph> {
    if width == 0 || height == 0 {
        return Err(MetapopError::configuration("Lattice needs at least one patch"));
    }
    let mut graph = PatchGraph::new(compartments, &[], &[MOBILITY]);
    let ids = graph.add_patches(width * height);
    for y in 0..height {
        for x in 0..width {
            let here = ids[y * width + x];
            if x + 1 < width {
                graph.add_edge(here, ids[y * width + x + 1])?;
            }
            if y + 1 < height {
                graph.add_edge(here, ids[(y + 1) * width + x])?;
            }
        }
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use metapop_env::PatchId;

    #[test]
    fn test_scenario_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
            assert_eq!(id.to_string(), id.name());
        }
        assert_eq!("GRID".parse::<ScenarioId>(), Ok(ScenarioId::Lattice));
        assert!("torus".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_ring_topology() {
        let graph = ring(&["S"], 5).unwrap();
        assert_eq!(graph.len(), 5);
        assert_eq!(graph.edge_count(), 5);
        for p in graph.patch_ids() {
            assert_eq!(graph.neighbours(p).count(), 2);
        }

        assert_eq!(ring(&["S"], 2).unwrap().edge_count(), 1);
        assert_eq!(ring(&["S"], 1).unwrap().edge_count(), 0);
        assert!(ring(&["S"], 0).is_err());
    }

    #[test]
    fn test_lattice_topology() {
        let graph = lattice(&["S"], 3, 2).unwrap();
        assert_eq!(graph.len(), 6);
        // 2 rows of 2 horizontal edges, 3 vertical edges
        assert_eq!(graph.edge_count(), 7);
        assert_eq!(graph.neighbours(PatchId(0)).count(), 2);
        assert_eq!(graph.neighbours(PatchId(1)).count(), 3);
        assert!(graph.edge(PatchId(1), PatchId(4)).is_ok());
        assert!(graph.edge(PatchId(2), PatchId(3)).is_err());
    }

    #[test]
    fn test_build_network_by_scenario() {
        let single = ScenarioId::SinglePatch.build_network(&["S", "I"], 9).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(ScenarioId::Lattice.build_network(&["S"], 4).unwrap().len(), 16);
        assert_eq!(single.edge_attributes(), &[MOBILITY.to_string()]);
    }
}
