//! One simulated world.
//!
//! The `Simulator` owns the track network, the depots with their sidings
//! and vehicles, the signal blocks and the occupancy horizons, and advances
//! them all in a single serial tick loop.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

use crate::config::{ConfigResult, SimConfig};
use crate::depot::Depot;
use crate::error::SimResult;
use crate::network::TrackNetwork;
use crate::occupancy::OccupancyHorizons;
use crate::record::{Persist, Record};
use crate::schedule::TimeScale;
use crate::siding::Siding;
use crate::signal::SignalBlocks;
use crate::types::{BlockId, DepotId, Millis, SegmentKey};
use crate::vehicle::VehicleSnapshot;

/// Statistics collected by the simulator.
#[derive(Clone, Debug, Default)]
pub struct SimulatorStats {
    /// Total number of ticks executed
    pub ticks_executed: u64,
    /// Total number of vehicle ticks
    pub vehicle_ticks: u64,
    /// Vehicle ticks skipped because of bad path data
    pub vehicle_failures: u64,
    /// Signal block claims refused because another vehicle held the block
    pub block_rejections: u64,
    /// Total number of vehicles dispatched
    pub departures_dispatched: u64,
    /// Total path-search steps spent on route generation
    pub path_search_steps: u64,
}

/// A single world.
///
/// # Example
///
/// ```ignore
/// let mut simulator = Simulator::new(network, TimeScale::default(), 7);
/// simulator.add_depot(depot);
/// simulator.generate_by_depot_name("");
/// simulator.run_for(60_000);
/// ```
pub struct Simulator {
    network: TrackNetwork,
    depots: Vec<Depot>,
    signals: SignalBlocks,
    horizons: OccupancyHorizons,
    scale: TimeScale,
    rng: ChaCha8Rng,
    /// Real clock, starting at the time scale's start
    current_millis: Millis,
    tick_millis: Millis,
    path_steps_per_tick: usize,
    stats: SimulatorStats,
}

impl Simulator {
    /// Creates an empty world.
    ///
    /// # Arguments
    /// * `network` - Track topology
    /// * `scale` - Game-day timing; its `start_millis` starts the clock
    /// * `seed` - Seed of the siding shuffle used when writing departures
    pub fn new(network: TrackNetwork, scale: TimeScale, seed: u64) -> Self {
        Self {
            network,
            depots: Vec::new(),
            signals: SignalBlocks::new(),
            horizons: OccupancyHorizons::default(),
            scale,
            rng: ChaCha8Rng::seed_from_u64(seed),
            current_millis: scale.start_millis,
            tick_millis: 50,
            path_steps_per_tick: 16,
            stats: SimulatorStats::default(),
        }
    }

    /// Sets the tick length used by [`Simulator::step`].
    pub fn with_tick_millis(mut self, tick_millis: Millis) -> Self {
        self.tick_millis = tick_millis.max(1);
        self
    }

    /// Sets the path-search steps each depot may take per tick.
    pub fn with_path_steps_per_tick(mut self, steps: usize) -> Self {
        self.path_steps_per_tick = steps.max(1);
        self
    }

    /// Sets the number of occupancy horizons.
    pub fn with_horizons(mut self, count: usize) -> Self {
        self.horizons = OccupancyHorizons::new(count);
        self
    }

    /// Builds a world from a validated configuration.
    pub fn from_config(config: &SimConfig) -> ConfigResult<Self> {
        config.validate()?;
        let params = &config.simulation;

        let mut network = TrackNetwork::new();
        for track in &config.network.tracks {
            network.add_track(track.from, track.to, track.length, track.track(), track.bidirectional);
        }
        for platform in &config.network.platforms {
            if network.link(&platform.a, &platform.b).is_none() && network.link(&platform.b, &platform.a).is_none() {
                tracing::warn!("Platform {} to {} is not on any track", platform.a, platform.b);
            }
            network.add_platform(platform.a, platform.b, platform.dwell_millis);
        }

        let scale = TimeScale {
            millis_per_game_day: params.millis_per_game_day,
            starting_game_day_percentage: params.starting_game_day_percentage,
            start_millis: params.start_millis,
        };
        let mut simulator = Simulator::new(network, scale, params.seed)
            .with_tick_millis(params.tick_millis)
            .with_path_steps_per_tick(params.path_steps_per_tick)
            .with_horizons(params.occupancy_horizons);

        for depot_config in &config.depots {
            let mut depot = Depot::new(
                depot_config.id,
                depot_config.name.clone(),
                depot_config.transport_mode,
                depot_config.settings.clone(),
            );
            depot.set_waypoints(depot_config.waypoints.clone());
            for siding in &depot_config.sidings {
                depot.add_siding(Siding::new(
                    siding.id,
                    siding.name.clone(),
                    siding.entry,
                    siding.exit,
                    siding.vehicle_params(depot_config.transport_mode),
                    siding.max_vehicles,
                    params.millis_per_game_day,
                ));
            }
            simulator.add_depot(depot);
        }

        for block in &config.signal_blocks {
            for &(a, b) in &block.segments {
                simulator.signals.add(block.color, SegmentKey::new(a, b));
            }
        }

        tracing::info!(
            depots = simulator.depots.len(),
            tracks = simulator.network.track_count(),
            signal_blocks = simulator.signals.len(),
            "Simulator built from configuration"
        );
        Ok(simulator)
    }

    pub fn add_depot(&mut self, depot: Depot) {
        self.depots.push(depot);
    }

    pub fn network(&self) -> &TrackNetwork {
        &self.network
    }

    pub fn depots(&self) -> &[Depot] {
        &self.depots
    }

    pub fn depot(&self, id: DepotId) -> Option<&Depot> {
        self.depots.iter().find(|depot| depot.id() == id)
    }

    pub fn depot_mut(&mut self, id: DepotId) -> Option<&mut Depot> {
        self.depots.iter_mut().find(|depot| depot.id() == id)
    }

    pub fn signals(&self) -> &SignalBlocks {
        &self.signals
    }

    pub fn signals_mut(&mut self) -> &mut SignalBlocks {
        &mut self.signals
    }

    pub fn horizons(&self) -> &OccupancyHorizons {
        &self.horizons
    }

    pub fn time_scale(&self) -> &TimeScale {
        &self.scale
    }

    /// Returns the current real clock.
    pub fn current_millis(&self) -> Millis {
        self.current_millis
    }

    pub fn tick_millis(&self) -> Millis {
        self.tick_millis
    }

    /// Returns the simulator statistics.
    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    /// Starts route generation for every depot whose name contains
    /// `filter`, ignoring case. An empty filter matches every depot.
    /// Returns the number of depots that started.
    pub fn generate_by_depot_name(&mut self, filter: &str) -> usize {
        let filter = filter.to_lowercase();
        let steps = self.path_steps_per_tick;
        self.depots
            .iter_mut()
            .filter(|depot| depot.name().to_lowercase().contains(&filter))
            .map(|depot| depot.generate_main_route(steps))
            .filter(|&started| started)
            .count()
    }

    /// Advances the world by `millis`.
    ///
    /// Each tick:
    /// 1. Rotates the occupancy horizons and decays signal block counters
    /// 2. Steps route generation of every depot
    /// 3. Dispatches departures whose offsets fall in `[now, now + millis)`
    /// 4. Ticks every vehicle, which writes its claims and occupies the
    ///    signal blocks covering them
    pub fn tick(&mut self, millis: Millis) {
        self.horizons.rotate();
        self.signals.reset_occupied();

        for depot in &mut self.depots {
            let generation = depot.tick(&self.network, &self.scale, &mut self.rng);
            self.stats.path_search_steps += generation.path_search_steps;
        }

        let from = self.current_millis - 1;
        let to = from + millis;
        for depot in &mut self.depots {
            self.stats.departures_dispatched += depot.dispatch(from, to) as u64;
        }

        for depot in &mut self.depots {
            let vehicles = depot.tick_vehicles(millis, &mut self.horizons, &mut self.signals);
            self.stats.vehicle_ticks += vehicles.vehicle_ticks;
            self.stats.vehicle_failures += vehicles.failures;
            self.stats.block_rejections += vehicles.block_rejections;
        }

        self.current_millis += millis;
        self.stats.ticks_executed += 1;
    }

    /// Executes a single tick of the configured length.
    pub fn step(&mut self) {
        self.tick(self.tick_millis);
    }

    /// Runs ticks of the configured length until at least `duration`
    /// milliseconds have passed. Returns the number of ticks run.
    pub fn run_for(&mut self, duration: Millis) -> u64 {
        let end = self.current_millis + duration;
        let mut ticks = 0;
        while self.current_millis < end {
            self.step();
            ticks += 1;
        }
        ticks
    }

    /// Runs a specific number of ticks.
    pub fn run_steps(&mut self, steps: u64) {
        for _ in 0..steps {
            self.step();
        }
    }

    /// Snapshots of every vehicle of every depot.
    pub fn vehicle_snapshots(&self) -> Vec<VehicleSnapshot> {
        self.depots
            .iter()
            .flat_map(Depot::sidings)
            .flat_map(Siding::snapshots)
            .collect()
    }

    /// Occupied flag of every signal block.
    pub fn signal_block_status(&self) -> BTreeMap<BlockId, bool> {
        self.signals.status()
    }

    /// Flattens signal blocks and every siding's departures and vehicles.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record
            .put_i64("current_millis", self.current_millis)
            .put_record("signal_blocks", self.signals.to_record())
            .put_records(
                "sidings",
                self.depots
                    .iter()
                    .flat_map(Depot::sidings)
                    .map(Siding::to_record),
            );
        record
    }

    /// Restores state written by [`Simulator::to_record`]. Sidings are
    /// matched by id; stored sidings that no longer exist are skipped.
    pub fn restore_from_record(&mut self, record: &Record) -> SimResult<()> {
        self.current_millis = record.get_i64("current_millis", self.current_millis);
        if record.contains("signal_blocks") {
            self.signals = SignalBlocks::from_record(&record.get_record("signal_blocks"))?;
        }
        for stored in record.get_records("sidings") {
            let id = stored.require_u64("id")?;
            let siding = self
                .depots
                .iter_mut()
                .flat_map(Depot::sidings_mut)
                .find(|siding| siding.id() == id);
            match siding {
                Some(siding) => siding.restore_from_record(&stored)?,
                None => tracing::warn!(siding = id, "Stored siding no longer exists"),
            }
        }
        Ok(())
    }

    /// Exports statistics from the simulator and all depots.
    pub fn export_stats(&self) -> serde_json::Value {
        let mut depot_stats = serde_json::Map::new();
        for depot in &self.depots {
            depot_stats.insert(depot.id().to_string(), depot.export_stats());
        }

        serde_json::json!({
            "simulator": {
                "current_millis": self.current_millis,
                "tick_millis": self.tick_millis,
                "ticks_executed": self.stats.ticks_executed,
                "vehicle_ticks": self.stats.vehicle_ticks,
                "vehicle_failures": self.stats.vehicle_failures,
                "block_rejections": self.stats.block_rejections,
                "departures_dispatched": self.stats.departures_dispatched,
                "path_search_steps": self.stats.path_search_steps,
                "depot_count": self.depots.len(),
                "track_count": self.network.track_count(),
                "signal_block_count": self.signals.len(),
            },
            "depots": depot_stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depot::DepotSettings;
    use crate::path::Track;
    use crate::types::{Position, TransportMode};
    use crate::vehicle::VehicleParams;

    fn p(x: i64) -> Position {
        Position::new(x, 0, 0)
    }

    fn simulator(departures: Vec<Millis>) -> Simulator {
        let mut network = TrackNetwork::new();
        let track = Track::new(0.02, true);
        network.add_track(p(40), p(100), None, track, true);
        network.add_track(p(100), p(1100), None, track, true);
        network.add_platform(p(100), p(1100), 20_000);

        let settings = DepotSettings {
            use_real_time: true,
            real_time_departures: departures,
            ..DepotSettings::default()
        };
        let mut depot = Depot::new(1, "Main Depot", TransportMode::Train, settings);
        depot.set_waypoints(vec![p(100), p(1100)]);
        depot.add_siding(Siding::new(
            1,
            "Siding 1",
            p(0),
            p(40),
            VehicleParams::default(),
            2,
            1_200_000,
        ));

        let mut simulator = Simulator::new(network, TimeScale::default(), 5).with_tick_millis(100);
        simulator.add_depot(depot);
        simulator
    }

    #[test]
    fn test_simulator_creation() {
        let simulator = simulator(vec![]);
        assert_eq!(simulator.current_millis(), 0);
        assert_eq!(simulator.tick_millis(), 100);
        assert_eq!(simulator.depots().len(), 1);
        assert!(simulator.depot(1).is_some());
        assert!(simulator.depot(2).is_none());
    }

    #[test]
    fn test_generate_by_depot_name() {
        let mut simulator = simulator(vec![]);
        assert_eq!(simulator.generate_by_depot_name("south"), 0);
        assert_eq!(simulator.generate_by_depot_name("MAIN"), 1);
        assert!(simulator.depots()[0].is_generating());
    }

    #[test]
    fn test_run_for() {
        let mut simulator = simulator(vec![]);
        let ticks = simulator.run_for(1000);
        assert_eq!(ticks, 10);
        assert_eq!(simulator.current_millis(), 1000);
        assert_eq!(simulator.stats().ticks_executed, 10);
        assert_eq!(simulator.stats().vehicle_ticks, 20);
    }

    #[test]
    fn test_departure_is_dispatched_and_moves() {
        let mut simulator = simulator(vec![1000]);
        simulator.generate_by_depot_name("");
        simulator.run_for(2000);

        assert_eq!(simulator.depots()[0].departure_count(), 1);
        assert_eq!(simulator.stats().departures_dispatched, 1);
        simulator.run_for(5000);

        let moving: Vec<_> = simulator
            .vehicle_snapshots()
            .into_iter()
            .filter(|snapshot| snapshot.on_route)
            .collect();
        assert_eq!(moving.len(), 1);
        assert!(moving[0].progress > 30.0);
        assert!(!moving[0].occupied.is_empty());
    }

    #[test]
    fn test_export_stats() {
        let mut simulator = simulator(vec![]);
        simulator.run_steps(5);

        let stats = simulator.export_stats();
        assert_eq!(stats["simulator"]["current_millis"], 500);
        assert_eq!(stats["simulator"]["ticks_executed"], 5);
        assert!(stats["depots"]["1"].is_object());
    }

    #[test]
    fn test_record_roundtrip() {
        let mut simulator = simulator(vec![0]);
        simulator.generate_by_depot_name("");
        simulator.run_for(3000);

        let record = simulator.to_record();
        let mut restored = simulator_with_route();
        restored.restore_from_record(&record).unwrap();
        assert_eq!(restored.current_millis(), simulator.current_millis());
        assert_eq!(
            restored.depots()[0].sidings()[0].departures(),
            simulator.depots()[0].sidings()[0].departures()
        );
    }

    fn simulator_with_route() -> Simulator {
        let mut simulator = simulator(vec![0]);
        simulator.generate_by_depot_name("");
        simulator.run_steps(50);
        simulator
    }
}
