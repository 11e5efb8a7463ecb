//! Gillespie dynamics over a patch network.
//!
//! # Lifecycle
//!
//! ```text
//! new(model) ─► set_network_prototype ─► configure(params)
//!                                            │
//!      ┌─────────────────────────────────────┘
//!      ▼
//!   set_up(params, rng) ─► run(rng) ─► tear_down()
//! ```
//!
//! `simulate` performs the last four steps and always tears down.
//!
//! # Loop
//!
//! Each `step` draws a waiting time `dt = -ln(u) / total`, picks one
//! (patch, event) cell in proportion to its rate, performs the event (the
//! graph's change handler updates the affected rows synchronously), seeds any
//! patch the event activated, advances time, and records a snapshot for every
//! interval boundary crossed. `run` steps until equilibrium or exhaustion.

use crate::model::Model;
use crate::tracker::{RateTracker, TrackerHandle};
use crate::trajectory::{Snapshot, Termination, Trajectory};
use metapop_core::{Event, PatchGraph, RateTable};
use metapop_env::{MetapopError, Params, PatchId, RandomStream, Result};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Reserved parameter keys read by `configure`.
pub const INITIAL_TIME: &str = "initial_time";
pub const MAX_TIME: &str = "max_time";
pub const RECORD_INTERVAL: &str = "record_interval";

pub const DEFAULT_START_TIME: f64 = 0.0;
pub const DEFAULT_MAX_TIME: f64 = 100.0;
pub const DEFAULT_RECORD_INTERVAL: f64 = 1.0;

/// Slack when counting how many boundaries fit before the maximum time.
const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// Stochastic simulation engine for one model.
///
/// Reusable: after `tear_down` a fresh copy of the prototype backs the next run.
pub struct Dynamics<M: Model> {
    model: Arc<M>,
    events: Arc<Vec<Box<dyn Event>>>,
    prototype: Option<PatchGraph>,

    start_time: f64,
    max_time: f64,
    record_interval: f64,

    // Per-run state, present between set_up and tear_down
    graph: Option<PatchGraph>,
    tracker: Option<Rc<RefCell<RateTracker<M>>>>,
    run_params: Params,
    time: f64,
    next_boundary: u64,
    last_boundary: u64,
    events_fired: u64,
    records: Vec<Snapshot>,
}

fn check_timing(start_time: f64, max_time: f64, record_interval: f64) -> Result<()> {
    if !record_interval.is_finite() || record_interval <= 0.0 {
        return Err(MetapopError::configuration(format!(
            "Record interval must be positive, got {}",
            record_interval
        )));
    }
    if max_time.is_nan() || max_time < start_time {
        return Err(MetapopError::configuration(format!(
            "Maximum time {} precedes start time {}",
            max_time, start_time
        )));
    }
    Ok(())
}

/// Time of the `k`-th recording boundary. The last one never passes `max_time`.
fn boundary_time(start_time: f64, record_interval: f64, max_time: f64, k: u64) -> f64 {
    (start_time + k as f64 * record_interval).min(max_time)
}

/// Hands every patch activated since the last call to the model's seeding hook.
///
/// Seeding goes through the graph's update methods, so the change handler
/// refreshes the seeded rows (and activates any patch the seeding reaches).
fn seed_activated<M: Model>(
    model: &M,
    graph: &mut PatchGraph,
    tracker: &RefCell<RateTracker<M>>,
    params: &Params,
    rng: &mut dyn RandomStream,
) -> Result<()> {
    loop {
        let pending = tracker.borrow_mut().take_activated();
        if pending.is_empty() {
            return Ok(());
        }
        for patch in pending {
            model.seed_activated_patch(graph, patch, params, rng)?;
        }
    }
}

impl<M: Model> Dynamics<M> {
    /// Creates an engine for `model`. Fails if the model defines no events.
    pub fn new(model: M) -> Result<Self> {
        let events = model.create_events();
        if events.is_empty() {
            return Err(MetapopError::configuration(format!(
                "Model {} defines no events",
                model.name()
            )));
        }
        Ok(Self {
            model: Arc::new(model),
            events: Arc::new(events),
            prototype: None,
            start_time: DEFAULT_START_TIME,
            max_time: DEFAULT_MAX_TIME,
            record_interval: DEFAULT_RECORD_INTERVAL,
            graph: None,
            tracker: None,
            run_params: Params::new(),
            time: DEFAULT_START_TIME,
            next_boundary: 1,
            last_boundary: 0,
            events_fired: 0,
            records: Vec::new(),
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn events(&self) -> &[Box<dyn Event>] {
        &self.events
    }

    /// Every parameter key the events consume.
    pub fn reaction_parameters(&self) -> Vec<&str> {
        self.events.iter().flat_map(|e| e.reaction_parameters()).collect()
    }

    /// Sets the graph every run starts from a copy of.
    pub fn set_network_prototype(&mut self, mut graph: PatchGraph) -> Result<()> {
        if graph.is_empty() {
            return Err(MetapopError::configuration("Network prototype has no patches"));
        }
        graph.clear_handler();
        self.prototype = Some(graph);
        Ok(())
    }

    pub fn network_prototype(&self) -> Option<&PatchGraph> {
        self.prototype.as_ref()
    }

    pub fn set_start_time(&mut self, time: f64) {
        self.start_time = time;
    }

    pub fn set_maximum_time(&mut self, time: f64) {
        self.max_time = time;
        if self.graph.is_some() {
            self.last_boundary = self.boundary_count();
        }
    }

    pub fn set_record_interval(&mut self, interval: f64) {
        self.record_interval = interval;
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn maximum_time(&self) -> f64 {
        self.max_time
    }

    pub fn record_interval(&self) -> f64 {
        self.record_interval
    }

    /// Reads reserved timing keys and hands `params` to every event.
    ///
    /// Timing is only committed once every event accepted its parameters.
    pub fn configure(&mut self, params: &Params) -> Result<()> {
        if self.prototype.is_none() {
            return Err(MetapopError::configuration("No network prototype set"));
        }
        let start_time = params.get(INITIAL_TIME).unwrap_or(self.start_time);
        let max_time = params.get(MAX_TIME).unwrap_or(self.max_time);
        let record_interval = params.get(RECORD_INTERVAL).unwrap_or(self.record_interval);
        check_timing(start_time, max_time, record_interval)?;

        let events = Arc::get_mut(&mut self.events)
            .ok_or_else(|| MetapopError::configuration("Cannot reconfigure events during a run"))?;
        for event in events.iter_mut() {
            event.set_parameters(params)?;
        }

        self.start_time = start_time;
        self.max_time = max_time;
        self.record_interval = record_interval;
        info!(
            "Configured {} with {} events (t={}..{}, interval={})",
            self.model.name(),
            self.events.len(),
            self.start_time,
            self.max_time,
            self.record_interval
        );
        Ok(())
    }

    /// Builds the working graph and the initial rate table.
    ///
    /// Nothing is kept if any step fails.
    pub fn set_up(&mut self, params: &Params, rng: &mut dyn RandomStream) -> Result<()> {
        check_timing(self.start_time, self.max_time, self.record_interval)?;
        let prototype = self
            .prototype
            .as_ref()
            .ok_or_else(|| MetapopError::configuration("No network prototype set"))?;
        let mut graph = prototype.clone();
        graph.prepare()?;
        self.model.seed_network(&mut graph, params, rng)?;

        let tracker = Rc::new(RefCell::new(RateTracker::new(
            Arc::clone(&self.model),
            Arc::clone(&self.events),
        )));
        graph.set_handler(Box::new(TrackerHandle(Rc::clone(&tracker))));
        for patch in graph.patch_ids() {
            tracker.borrow_mut().activate(&graph, patch)?;
        }
        seed_activated(&*self.model, &mut graph, &*tracker, params, rng)?;

        let (active, total) = {
            let tracker = tracker.borrow();
            (tracker.active().len(), tracker.table().total())
        };
        if active == 0 {
            return Err(MetapopError::configuration("No patches are active"));
        }
        if total <= 0.0 {
            return Err(MetapopError::configuration(
                "Total rate is zero at set-up, no events possible",
            ));
        }
        info!(
            "Set up {}: {} of {} patches active, total rate {:.4}",
            self.model.name(),
            active,
            graph.len(),
            total
        );

        self.time = self.start_time;
        self.next_boundary = 1;
        self.last_boundary = self.boundary_count();
        self.events_fired = 0;
        self.records = vec![Snapshot::capture(self.start_time, &graph)];
        self.run_params = params.clone();
        self.graph = Some(graph);
        self.tracker = Some(tracker);
        Ok(())
    }

    /// Number of interval boundaries after the start time, up to the maximum time.
    fn boundary_count(&self) -> u64 {
        let span = (self.max_time - self.start_time) / self.record_interval;
        (span + BOUNDARY_TOLERANCE).floor().max(0.0) as u64
    }

    /// Fires one event, or reports why the run is over.
    ///
    /// Returns `Some(termination)` without drawing when the model is at
    /// equilibrium or no event can fire. The rate table matches the graph
    /// whenever this returns.
    pub fn step(&mut self, rng: &mut dyn RandomStream) -> Result<Option<Termination>> {
        let (graph, tracker) = match (self.graph.as_mut(), self.tracker.as_ref()) {
            (Some(graph), Some(tracker)) => (graph, &**tracker),
            _ => return Err(MetapopError::configuration("Dynamics not set up")),
        };
        if self.model.at_equilibrium(self.time, self.max_time, graph) {
            return Ok(Some(Termination::Equilibrium));
        }

        let total = tracker.borrow().table().total();
        if total <= 0.0 {
            return Ok(Some(Termination::Exhausted));
        }
        let dt = rng.exponential(total);
        let target = rng.next_f64() * total;
        // Borrow must end before perform: the change handler re-borrows
        let chosen = tracker.borrow().select(target);
        let (patch, event) = match chosen {
            Some(cell) => cell,
            None => return Ok(Some(Termination::Exhausted)),
        };

        trace!("t={:.4} firing {} at patch {}", self.time, self.events[event].name(), patch);
        self.events[event].perform(graph, patch, rng)?;
        seed_activated(&*self.model, graph, tracker, &self.run_params, rng)?;
        self.events_fired += 1;
        self.time += dt;

        while self.next_boundary <= self.last_boundary {
            let boundary = boundary_time(self.start_time, self.record_interval, self.max_time, self.next_boundary);
            if self.time < boundary {
                break;
            }
            debug!("Recording snapshot at t={}", boundary);
            self.records.push(Snapshot::capture(boundary, graph));
            self.next_boundary += 1;
        }
        Ok(None)
    }

    /// Runs the loop until equilibrium or exhaustion.
    pub fn run(&mut self, rng: &mut dyn RandomStream) -> Result<Trajectory> {
        let termination = loop {
            if let Some(termination) = self.step(rng)? {
                break termination;
            }
        };

        info!(
            "Run of {} ended ({}) at t={:.4} after {} events",
            self.model.name(),
            termination,
            self.time,
            self.events_fired
        );
        Ok(Trajectory {
            records: std::mem::take(&mut self.records),
            termination,
            end_time: self.time,
            events_fired: self.events_fired,
        })
    }

    /// Drops the working graph and rate bookkeeping.
    pub fn tear_down(&mut self) {
        self.graph = None;
        self.tracker = None;
        self.run_params = Params::new();
        self.records.clear();
        self.events_fired = 0;
        self.time = self.start_time;
    }

    /// Configures, sets up, runs and tears down in one call.
    pub fn simulate(&mut self, params: &Params, rng: &mut dyn RandomStream) -> Result<Trajectory> {
        let outcome = self.run_once(params, rng);
        self.tear_down();
        outcome
    }

    fn run_once(&mut self, params: &Params, rng: &mut dyn RandomStream) -> Result<Trajectory> {
        self.configure(params)?;
        self.set_up(params, rng)?;
        self.run(rng)
    }

    // ── Introspection ────────────────────────────────────────────────

    /// The working graph, between `set_up` and `tear_down`.
    pub fn network(&self) -> Option<&PatchGraph> {
        self.graph.as_ref()
    }

    /// Copy of the current rate table.
    pub fn rate_table(&self) -> Option<RateTable> {
        self.tracker.as_ref().map(|t| t.borrow().table().clone())
    }

    /// Active patches in row order.
    pub fn active_patches(&self) -> Vec<PatchId> {
        self.tracker
            .as_ref()
            .map(|t| t.borrow().active().iter().collect())
            .unwrap_or_default()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn events_fired(&self) -> u64 {
        self.events_fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SeededStream;
    use approx::assert_relative_eq;
    use metapop_core::{Change, EventExt, Infect, Move};
    use proptest::prelude::*;

    /// Replays a fixed cycle of uniforms.
    struct ScriptedStream {
        values: Vec<f64>,
        next: usize,
    }

    impl ScriptedStream {
        fn new(values: &[f64]) -> Self {
            Self {
                values: values.to_vec(),
                next: 0,
            }
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

    /// Uniform that makes `exponential(total)` return `dt`.
    fn uniform_for(dt: f64, total: f64) -> f64 {
        1.0 - (-dt * total).exp()
    }

    struct Sir {
        initial: Vec<(usize, i64, i64)>,
        track_infected_only: bool,
        susceptible_on_activation: i64,
    }

    impl Sir {
        fn single(s: i64, i: i64) -> Self {
            Self {
                initial: vec![(0, s, i)],
                track_infected_only: false,
                susceptible_on_activation: 0,
            }
        }
    }

    impl Model for Sir {
        fn name(&self) -> &str {
            "sir"
        }

        fn create_events(&self) -> Vec<Box<dyn Event>> {
            vec![
                Infect::new("S", &["I"], "I").boxed(),
                Change::new("I", "R").boxed(),
                Move::new("I").boxed(),
            ]
        }

        fn seed_network(&self, graph: &mut PatchGraph, _: &Params, _: &mut dyn RandomStream) -> Result<()> {
            for &(idx, s, i) in &self.initial {
                graph.update_patch(PatchId(idx), &[("S", s), ("I", i)], &[])?;
            }
            Ok(())
        }

        fn patch_is_active(&self, graph: &PatchGraph, patch: PatchId) -> Result<bool> {
            if !self.track_infected_only {
                return Ok(true);
            }
            Ok(graph.get_compartment_value(patch, "I")? > 0)
        }

        fn seed_activated_patch(
            &self,
            graph: &mut PatchGraph,
            patch: PatchId,
            _: &Params,
            _: &mut dyn RandomStream,
        ) -> Result<()> {
            graph.update_patch(patch, &[("S", self.susceptible_on_activation)], &[])
        }
    }

    fn params(beta: f64, gamma: f64, mobility: f64) -> Params {
        Params::new()
            .with("S_infection_rate", beta)
            .with("I_to_R_rate", gamma)
            .with("I_move_rate", mobility)
    }

    fn sir_graph(patches: usize) -> PatchGraph {
        let mut graph = PatchGraph::new(&["S", "I", "R"], &[], &[]);
        let ids = graph.add_patches(patches);
        for pair in ids.windows(2) {
            graph.add_edge(pair[0], pair[1]).unwrap();
        }
        graph
    }

    fn engine(model: Sir, patches: usize) -> Dynamics<Sir> {
        let mut dynamics = Dynamics::new(model).unwrap();
        dynamics.set_network_prototype(sir_graph(patches)).unwrap();
        dynamics
    }

    fn assert_rates_consistent(dynamics: &Dynamics<Sir>) {
        let graph = dynamics.network().unwrap();
        let table = dynamics.rate_table().unwrap();
        let mut expected_total = 0.0;
        for (row, patch) in dynamics.active_patches().into_iter().enumerate() {
            for (col, event) in dynamics.events().iter().enumerate() {
                let rate = event.calculate_rate_at_patch(graph, patch).unwrap();
                assert_eq!(table.get(row, col), rate, "stale rate for {} at {}", event.name(), patch);
                expected_total += rate;
            }
        }
        assert_relative_eq!(table.total(), expected_total, epsilon = 1e-12);
    }

    #[test]
    fn test_infection_step_updates_row() {
        let beta = 0.01;
        let mut dynamics = engine(Sir::single(100, 1), 1);
        let p = params(beta, 0.0, 0.0);
        dynamics.configure(&p).unwrap();
        dynamics.set_up(&p, &mut ScriptedStream::new(&[0.5])).unwrap();

        let table = dynamics.rate_table().unwrap();
        assert_relative_eq!(table.get(0, 0), beta * 100.0 * 1.0);
        assert_eq!(table.get(0, 1), 0.0);

        // One infection then stop: the first dt overshoots max_time
        dynamics.set_maximum_time(1.0);
        let total = beta * 100.0;
        let trajectory = dynamics
            .run(&mut ScriptedStream::new(&[uniform_for(5.0, total), 0.3]))
            .unwrap();

        assert_eq!(trajectory.events_fired, 1);
        assert_eq!(trajectory.termination, Termination::Equilibrium);
        let graph = dynamics.network().unwrap();
        assert_eq!(graph.get_compartment_value(PatchId(0), "S").unwrap(), 99);
        assert_eq!(graph.get_compartment_value(PatchId(0), "I").unwrap(), 2);
        assert_eq!(graph.get_compartment_value(PatchId(0), "R").unwrap(), 0);
        assert_relative_eq!(dynamics.rate_table().unwrap().get(0, 0), beta * 99.0 * 2.0);
        assert_rates_consistent(&dynamics);
    }

    #[test]
    fn test_zero_total_rate_rejected_at_set_up() {
        let mut dynamics = engine(Sir::single(100, 1), 1);
        let p = params(0.0, 0.0, 0.0);
        let mut rng = ScriptedStream::new(&[0.5]);

        let err = dynamics.simulate(&p, &mut rng).unwrap_err();

        assert!(matches!(err, MetapopError::Configuration(_)));
        assert!(dynamics.network().is_none());
    }

    #[test]
    fn test_no_active_patch_rejected() {
        let model = Sir {
            initial: vec![(0, 10, 0)],
            track_infected_only: true,
            susceptible_on_activation: 0,
        };
        let mut dynamics = engine(model, 2);
        let p = params(1.0, 1.0, 1.0);
        dynamics.configure(&p).unwrap();

        let err = dynamics.set_up(&p, &mut ScriptedStream::new(&[0.5])).unwrap_err();
        assert_eq!(err, MetapopError::configuration("No patches are active"));
    }

    #[test]
    fn test_configuration_errors() {
        assert!(matches!(
            Dynamics::new(Sir::single(1, 1)).unwrap().configure(&Params::new()),
            Err(MetapopError::Configuration(_))
        ));

        let mut dynamics = engine(Sir::single(1, 1), 1);
        assert_eq!(
            dynamics.configure(&Params::new()).unwrap_err(),
            MetapopError::missing("S_infection_rate")
        );
        assert!(matches!(
            dynamics.configure(&params(1.0, 1.0, 1.0).with(RECORD_INTERVAL, 0.0)),
            Err(MetapopError::Configuration(_))
        ));
        assert!(matches!(
            dynamics.set_network_prototype(PatchGraph::new(&["S"], &[], &[])),
            Err(MetapopError::Configuration(_))
        ));
    }

    #[test]
    fn test_large_jump_records_every_boundary() {
        let mut dynamics = engine(Sir::single(1000, 1), 1);
        // Recovery disabled; a single infection never exhausts S here
        let beta = 0.001;
        let p = params(beta, 0.0, 0.0).with(MAX_TIME, 7.5).with(RECORD_INTERVAL, 1.0);
        let mut rng = ScriptedStream::new(&[0.5]);
        dynamics.configure(&p).unwrap();
        dynamics.set_up(&p, &mut rng).unwrap();

        let first_total = beta * 1000.0;
        let second_total = beta * 999.0 * 2.0;
        let mut rng = ScriptedStream::new(&[
            uniform_for(0.5, first_total),
            0.5,
            uniform_for(6.8, second_total),
            0.5,
            0.999_999,
            0.5,
        ]);
        let trajectory = dynamics.run(&mut rng).unwrap();

        assert_eq!(trajectory.events_fired, 3);
        assert_eq!(trajectory.times(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(trajectory.records[0].total("I"), 1);
        for snapshot in &trajectory.records[1..] {
            assert_eq!(snapshot.total("I"), 3);
            assert_eq!(snapshot.patches, trajectory.records[1].patches);
        }
        // The last event happened after t=7 and is not recorded
        assert_eq!(dynamics.network().unwrap().get_compartment_value(PatchId(0), "I").unwrap(), 4);
        assert!(trajectory.end_time >= 7.5);
    }

    #[test]
    fn test_boundary_at_max_time_is_recorded() {
        let mut dynamics = engine(Sir::single(0, 1000), 1);
        let p = params(0.0, 1.0, 0.0).with(MAX_TIME, 0.3).with(RECORD_INTERVAL, 0.1);
        // Recovery only, dt of roughly 0.01 per event
        let mut rng = ScriptedStream::new(&[uniform_for(0.01, 1000.0), 0.5]);

        let trajectory = dynamics.simulate(&p, &mut rng).unwrap();

        assert_eq!(trajectory.termination, Termination::Equilibrium);
        assert!(trajectory.end_time >= 0.3);
        assert_eq!(trajectory.times(), vec![0.0, 0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_failed_configure_keeps_timing() {
        let mut dynamics = engine(Sir::single(1, 1), 1);
        dynamics.configure(&params(1.0, 1.0, 1.0).with(MAX_TIME, 5.0)).unwrap();

        let incomplete = Params::new().with(MAX_TIME, 9.0).with(RECORD_INTERVAL, 0.5).with("S_infection_rate", 1.0);
        assert_eq!(dynamics.configure(&incomplete).unwrap_err(), MetapopError::missing("I_to_R_rate"));

        assert_eq!(dynamics.maximum_time(), 5.0);
        assert_eq!(dynamics.record_interval(), DEFAULT_RECORD_INTERVAL);
    }

    #[test]
    fn test_activated_patch_is_seeded() {
        let model = Sir {
            initial: vec![(0, 0, 1)],
            track_infected_only: true,
            susceptible_on_activation: 7,
        };
        let mut dynamics = engine(model, 2);
        let p = params(0.5, 0.0, 1.0).with(MAX_TIME, 1.0);
        dynamics.configure(&p).unwrap();
        dynamics.set_up(&p, &mut ScriptedStream::new(&[0.5])).unwrap();

        // Patch 0 is seeded at set-up, patch 1 stays inactive and empty
        let graph = dynamics.network().unwrap();
        assert_eq!(graph.get_compartment_value(PatchId(0), "S").unwrap(), 7);
        assert_eq!(graph.get_compartment_value(PatchId(1), "S").unwrap(), 0);
        assert_eq!(dynamics.rate_table().unwrap().row(0), &[3.5, 0.0, 1.0]);

        // 0.9 of the total lands on the move cell
        dynamics
            .run(&mut ScriptedStream::new(&[uniform_for(3.0, 4.5), 0.9, 0.5]))
            .unwrap();

        assert_eq!(dynamics.active_patches(), vec![PatchId(0), PatchId(1)]);
        let graph = dynamics.network().unwrap();
        assert_eq!(graph.get_compartment_value(PatchId(1), "S").unwrap(), 7);
        assert_eq!(graph.get_compartment_value(PatchId(1), "I").unwrap(), 1);
        assert_eq!(dynamics.rate_table().unwrap().row(1), &[3.5, 0.0, 1.0]);
        assert_rates_consistent(&dynamics);
    }

    #[test]
    fn test_snapshots_are_deep_copies() {
        let mut dynamics = engine(Sir::single(50, 5), 1);
        let p = params(0.0, 1.0, 0.0).with(MAX_TIME, 1000.0);
        let trajectory = dynamics
            .simulate(&p, &mut ScriptedStream::new(&[0.3, 0.6, 0.9]))
            .unwrap();

        // Recovery only: all five recover and the run exhausts
        assert_eq!(trajectory.termination, Termination::Exhausted);
        assert_eq!(trajectory.events_fired, 5);
        assert_eq!(trajectory.records[0].total("I"), 5);
        assert_eq!(trajectory.records[0].total("R"), 0);
        assert_eq!(trajectory.last().unwrap().total("R") + trajectory.last().unwrap().total("I"), 5);
        assert!(dynamics.network().is_none());
    }

    #[test]
    fn test_lazy_activation_on_move() {
        let model = Sir {
            initial: vec![(0, 0, 1)],
            track_infected_only: true,
            susceptible_on_activation: 0,
        };
        let mut dynamics = engine(model, 2);
        let p = params(0.0, 0.0, 1.0).with(MAX_TIME, 1.0);
        let mut rng = ScriptedStream::new(&[0.5]);
        dynamics.configure(&p).unwrap();
        dynamics.set_up(&p, &mut rng).unwrap();
        assert_eq!(dynamics.active_patches(), vec![PatchId(0)]);

        dynamics
            .run(&mut ScriptedStream::new(&[uniform_for(3.0, 1.0), 0.5]))
            .unwrap();

        assert_eq!(dynamics.active_patches(), vec![PatchId(0), PatchId(1)]);
        let table = dynamics.rate_table().unwrap();
        assert_eq!(table.row(0), &[0.0, 0.0, 0.0]);
        assert_eq!(table.row(1), &[0.0, 0.0, 1.0]);
        assert_rates_consistent(&dynamics);
    }

    #[test]
    fn test_rates_stay_consistent_across_steps() {
        let model = Sir {
            initial: vec![(0, 30, 3), (2, 20, 0)],
            track_infected_only: false,
            susceptible_on_activation: 0,
        };
        let mut dynamics = engine(model, 4);
        let p = params(0.05, 0.3, 0.4).with(MAX_TIME, 2.0);
        let mut rng = ScriptedStream::new(&[0.21, 0.73, 0.05, 0.88, 0.47, 0.62, 0.34]);
        dynamics.configure(&p).unwrap();
        dynamics.set_up(&p, &mut rng).unwrap();
        assert_rates_consistent(&dynamics);

        dynamics.run(&mut rng).unwrap();

        assert_rates_consistent(&dynamics);
        let graph = dynamics.network().unwrap();
        let population: u64 = graph
            .patch_ids()
            .map(|p| graph.get_compartment_value(p, &["S", "I", "R"]).unwrap())
            .sum();
        assert_eq!(population, 53);
    }

    #[test]
    fn test_engine_reusable_after_tear_down() {
        let mut dynamics = engine(Sir::single(20, 2), 1);
        let p = params(0.1, 0.5, 0.0).with(MAX_TIME, 5.0);

        let first = dynamics.simulate(&p, &mut ScriptedStream::new(&[0.4, 0.7])).unwrap();
        let second = dynamics.simulate(&p, &mut ScriptedStream::new(&[0.4, 0.7])).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.records[0].total("S"), 20);
    }

    #[test]
    fn test_rates_consistent_after_every_step() {
        let model = Sir {
            initial: vec![(1, 0, 2)],
            track_infected_only: true,
            susceptible_on_activation: 15,
        };
        let mut dynamics = engine(model, 4);
        let p = params(0.05, 0.2, 0.6).with(MAX_TIME, 50.0);
        let mut rng = SeededStream::new(11);
        dynamics.configure(&p).unwrap();
        dynamics.set_up(&p, &mut rng).unwrap();
        assert_rates_consistent(&dynamics);

        let mut steps = 0;
        while dynamics.step(&mut rng).unwrap().is_none() {
            assert_rates_consistent(&dynamics);
            steps += 1;
        }
        assert_eq!(steps, dynamics.events_fired());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]
        #[test]
        fn prop_rates_match_state_at_every_step(seed in any::<u64>(), max_time in 0.1f64..3.0) {
            let model = Sir {
                initial: vec![(0, 40, 2), (1, 25, 1)],
                track_infected_only: false,
                susceptible_on_activation: 0,
            };
            let mut dynamics = engine(model, 3);
            let p = params(0.02, 0.4, 0.3).with(MAX_TIME, max_time);
            let mut rng = SeededStream::new(seed);
            dynamics.configure(&p).unwrap();
            dynamics.set_up(&p, &mut rng).unwrap();

            while dynamics.step(&mut rng).unwrap().is_none() {
                assert_rates_consistent(&dynamics);
            }
            let trajectory = dynamics.run(&mut rng).unwrap();

            for snapshot in &trajectory.records {
                prop_assert_eq!(snapshot.total("S") + snapshot.total("I") + snapshot.total("R"), 68);
            }
        }
    }
}
