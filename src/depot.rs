//! Depots: schedule settings, sidings and route generation.
//!
//! Route generation runs a few path-search steps per tick. It first
//! connects the depot's waypoints into the main route, then connects each
//! siding to the first waypoint and the last waypoint back to the siding,
//! and finally writes departures to the sidings.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SimResult;
use crate::network::TrackNetwork;
use crate::occupancy::OccupancyHorizons;
use crate::path::{AssemblyStatus, ConnectionDetails, RouteAssembler};
use crate::record::{Persist, Record};
use crate::schedule::{assign_departures, generate_departures, DepartureSource, TimeScale};
use crate::siding::{Siding, SidingTick};
use crate::signal::SignalBlocks;
use crate::types::{DepotId, Millis, Position, TransportMode, HOURS_PER_DAY};

/// Departure settings of a depot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DepotSettings {
    /// Use `real_time_departures` instead of frequencies
    #[serde(default)]
    pub use_real_time: bool,
    /// Loop the main route instead of returning to the siding
    #[serde(default)]
    pub repeat_infinitely: bool,
    /// Departures per game hour
    #[serde(default)]
    pub frequencies: [u32; HOURS_PER_DAY],
    /// Fixed real-time offsets
    #[serde(default)]
    pub real_time_departures: Vec<Millis>,
}

impl DepotSettings {
    /// Sets the frequency of one hour. Negative values become 0; hours
    /// outside the day are ignored.
    pub fn set_frequency(&mut self, hour: i64, frequency: i64) {
        if let Some(slot) = usize::try_from(hour).ok().and_then(|hour| self.frequencies.get_mut(hour)) {
            *slot = frequency.clamp(0, u32::MAX as i64) as u32;
        }
    }
}

impl Persist for DepotSettings {
    fn from_record(record: &Record) -> SimResult<Self> {
        let mut settings = DepotSettings {
            use_real_time: record.get_bool("use_real_time", false),
            repeat_infinitely: record.get_bool("repeat_infinitely", false),
            real_time_departures: record.get_i64_array("departures"),
            ..DepotSettings::default()
        };
        for (hour, frequency) in record.get_i64_array("frequencies").into_iter().enumerate() {
            settings.set_frequency(hour as i64, frequency);
        }
        Ok(settings)
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record
            .put_bool("use_real_time", self.use_real_time)
            .put_bool("repeat_infinitely", self.repeat_infinitely)
            .put_i64_array("departures", self.real_time_departures.iter().copied())
            .put_i64_array("frequencies", self.frequencies.iter().map(|&f| f as i64));
        record
    }
}

/// Route searches for one siding.
#[derive(Debug)]
struct SidingJob {
    siding: usize,
    outbound: RouteAssembler<Position>,
    inbound: Option<RouteAssembler<Position>>,
}

impl SidingJob {
    fn tick(&mut self, network: &TrackNetwork) -> (AssemblyStatus<Position>, Option<AssemblyStatus<Position>>) {
        let outbound = match self.outbound.status() {
            AssemblyStatus::InProgress => self.outbound.tick(network),
            done => done,
        };
        let inbound = self.inbound.as_mut().map(|assembler| match assembler.status() {
            AssemblyStatus::InProgress => assembler.tick(network),
            done => done,
        });
        (outbound, inbound)
    }

    fn steps_taken(&self) -> u64 {
        self.outbound.steps_taken() + self.inbound.as_ref().map_or(0, RouteAssembler::steps_taken)
    }
}

#[derive(Debug, Default)]
enum Generation {
    #[default]
    Idle,
    MainRoute(RouteAssembler<Position>),
    Sidings {
        main: Vec<ConnectionDetails<Position>>,
        jobs: Vec<SidingJob>,
    },
}

/// What happened during one depot tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DepotTick {
    pub path_search_steps: u64,
    /// Departures accepted, when route generation finished this tick
    pub departures_written: Option<usize>,
}

/// A depot and its sidings.
#[derive(Debug)]
pub struct Depot {
    id: DepotId,
    name: String,
    transport_mode: TransportMode,
    settings: DepotSettings,
    waypoints: Vec<Position>,
    sidings: Vec<Siding>,
    generation: Generation,
    steps_per_tick: usize,
    dispatched: u64,
    path_search_steps: u64,
}

impl Depot {
    pub fn new(id: DepotId, name: impl Into<String>, transport_mode: TransportMode, settings: DepotSettings) -> Self {
        Self {
            id,
            name: name.into(),
            transport_mode,
            settings,
            waypoints: Vec::new(),
            sidings: Vec::new(),
            generation: Generation::Idle,
            steps_per_tick: 1,
            dispatched: 0,
            path_search_steps: 0,
        }
    }

    pub fn id(&self) -> DepotId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport_mode(&self) -> TransportMode {
        self.transport_mode
    }

    pub fn settings(&self) -> &DepotSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut DepotSettings {
        &mut self.settings
    }

    pub fn set_frequency(&mut self, hour: i64, frequency: i64) {
        self.settings.set_frequency(hour, frequency);
    }

    pub fn waypoints(&self) -> &[Position] {
        &self.waypoints
    }

    pub fn set_waypoints(&mut self, waypoints: Vec<Position>) {
        self.waypoints = waypoints;
    }

    pub fn add_siding(&mut self, siding: Siding) {
        self.sidings.push(siding);
    }

    pub fn sidings(&self) -> &[Siding] {
        &self.sidings
    }

    pub fn sidings_mut(&mut self) -> &mut [Siding] {
        &mut self.sidings
    }

    /// Total vehicle slots over all sidings.
    pub fn vehicle_count(&self) -> usize {
        self.sidings.iter().map(Siding::max_vehicles).sum()
    }

    pub fn departure_count(&self) -> usize {
        self.sidings.iter().map(|siding| siding.departures().len()).sum()
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn path_search_steps(&self) -> u64 {
        self.path_search_steps
    }

    pub fn is_generating(&self) -> bool {
        !matches!(self.generation, Generation::Idle)
    }

    /// Starts route generation. Any generation in progress is dropped.
    ///
    /// Returns false, leaving the depot idle, when it has no sidings.
    pub fn generate_main_route(&mut self, steps_per_tick: usize) -> bool {
        if self.sidings.is_empty() {
            tracing::info!("No sidings in {}", self.name);
            self.generation = Generation::Idle;
            return false;
        }
        tracing::info!("Starting path generation for {}...", self.name);
        self.steps_per_tick = steps_per_tick.max(1);
        self.generation = Generation::MainRoute(RouteAssembler::new(self.waypoints.iter().copied(), self.steps_per_tick));
        true
    }

    /// Advances route generation, writing departures once every siding
    /// has its path.
    pub fn tick<R: Rng + ?Sized>(&mut self, network: &TrackNetwork, scale: &TimeScale, rng: &mut R) -> DepotTick {
        let mut result = DepotTick::default();
        match std::mem::take(&mut self.generation) {
            Generation::Idle => {}
            Generation::MainRoute(mut assembler) => {
                let before = assembler.steps_taken();
                let status = assembler.tick(network);
                result.path_search_steps = assembler.steps_taken() - before;
                match status {
                    AssemblyStatus::InProgress => self.generation = Generation::MainRoute(assembler),
                    AssemblyStatus::Complete(main) => self.start_siding_jobs(main),
                    AssemblyStatus::Failed { leg } => {
                        tracing::info!(leg, "Path not found for {}", self.name);
                    }
                }
            }
            Generation::Sidings { main, jobs } => {
                let before: u64 = jobs.iter().map(SidingJob::steps_taken).sum();
                let mut after = 0;
                let mut pending = Vec::with_capacity(jobs.len());
                for mut job in jobs {
                    let status = job.tick(network);
                    after += job.steps_taken();
                    match status {
                        (AssemblyStatus::InProgress, _) | (_, Some(AssemblyStatus::InProgress)) => pending.push(job),
                        (outbound, inbound) => self.finish_siding(network, &main, job.siding, outbound, inbound),
                    }
                }
                result.path_search_steps = after - before;

                if pending.is_empty() {
                    tracing::info!("Path generation complete for {}", self.name);
                    result.departures_written = Some(self.write_departures(scale, rng));
                } else {
                    self.generation = Generation::Sidings { main, jobs: pending };
                }
            }
        }
        self.path_search_steps += result.path_search_steps;
        result
    }

    fn start_siding_jobs(&mut self, main: Vec<ConnectionDetails<Position>>) {
        let (Some(&first), Some(&last)) = (self.waypoints.first(), self.waypoints.last()) else {
            tracing::info!("No waypoints in {}", self.name);
            return;
        };
        let steps = self.steps_per_tick;
        let repeat = self.settings.repeat_infinitely;
        let jobs = self
            .sidings
            .iter()
            .enumerate()
            .map(|(index, siding)| SidingJob {
                siding: index,
                outbound: RouteAssembler::new([siding.exit(), first], steps),
                inbound: (!repeat).then(|| RouteAssembler::new([last, siding.exit()], steps)),
            })
            .collect();
        self.generation = Generation::Sidings { main, jobs };
    }

    fn finish_siding(
        &mut self,
        network: &TrackNetwork,
        main: &[ConnectionDetails<Position>],
        index: usize,
        outbound: AssemblyStatus<Position>,
        inbound: Option<AssemblyStatus<Position>>,
    ) {
        let Some(&main_start) = self.waypoints.first() else {
            return;
        };
        let Some(siding) = self.sidings.get_mut(index) else {
            return;
        };
        let inbound = match inbound {
            None => Some(None),
            Some(AssemblyStatus::Complete(legs)) => Some(Some(legs)),
            Some(_) => None,
        };
        let built = match (outbound, inbound) {
            (AssemblyStatus::Complete(out_legs), Some(in_legs)) => {
                siding.build_path(network, &out_legs, main_start, main, in_legs.as_deref())
            }
            _ => {
                tracing::info!(siding = siding.name(), "No path between siding and main route");
                siding.clear_route();
                return;
            }
        };
        if let Err(error) = built {
            tracing::warn!(siding = siding.name(), %error, "Discarding siding path");
            siding.clear_route();
        }
    }

    /// Generates departures from the settings and assigns them to sidings.
    /// Returns the number accepted.
    pub fn write_departures<R: Rng + ?Sized>(&mut self, scale: &TimeScale, rng: &mut R) -> usize {
        let source = if self.transport_mode.continuous_movement() {
            DepartureSource::Continuous {
                vehicle_count: self.vehicle_count(),
            }
        } else if self.settings.use_real_time {
            DepartureSource::RealTime(&self.settings.real_time_departures)
        } else {
            DepartureSource::Frequency(&self.settings.frequencies)
        };
        let departures = generate_departures(source, scale);
        if departures.is_empty() {
            tracing::info!("No departures for {}", self.name);
        }

        let accepted = assign_departures(&departures, &mut self.sidings, rng);
        for siding in &mut self.sidings {
            siding.finish_departures();
        }
        tracing::info!(
            generated = departures.len(),
            accepted,
            "Departures written for {}",
            self.name
        );
        accepted
    }

    /// Dispatches departures crossed by the clock in `(from, to]`.
    pub fn dispatch(&mut self, from: Millis, to: Millis) -> usize {
        let started: usize = self.sidings.iter_mut().map(|siding| siding.dispatch(from, to)).sum();
        self.dispatched += started as u64;
        started
    }

    /// Ticks the vehicles of every siding.
    pub fn tick_vehicles(&mut self, millis: Millis, horizons: &mut OccupancyHorizons, signals: &mut SignalBlocks) -> SidingTick {
        let mut total = SidingTick::default();
        for siding in &mut self.sidings {
            let tick = siding.tick(millis, horizons, signals);
            total.vehicle_ticks += tick.vehicle_ticks;
            total.failures += tick.failures;
            total.block_rejections += tick.block_rejections;
        }
        total
    }

    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "sidings": self.sidings.len(),
            "vehicles": self.vehicle_count(),
            "departures": self.departure_count(),
            "dispatched": self.dispatched,
            "path_search_steps": self.path_search_steps,
            "generating": self.is_generating(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Track;
    use crate::vehicle::VehicleParams;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn p(x: i64) -> Position {
        Position::new(x, 0, 0)
    }

    fn network() -> TrackNetwork {
        let mut network = TrackNetwork::new();
        let track = Track::new(0.02, true);
        network.add_track(p(40), p(100), None, track, true);
        network.add_track(p(100), p(1100), None, track, true);
        network.add_platform(p(100), p(1100), 20_000);
        network
    }

    fn depot(settings: DepotSettings) -> Depot {
        let mut depot = Depot::new(1, "Depot", TransportMode::Train, settings);
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
        depot
    }

    fn run_generation(depot: &mut Depot) -> Option<usize> {
        let network = network();
        let scale = TimeScale::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(depot.generate_main_route(4));
        for _ in 0..1000 {
            if let Some(written) = depot.tick(&network, &scale, &mut rng).departures_written {
                return Some(written);
            }
            if !depot.is_generating() {
                return None;
            }
        }
        None
    }

    #[test]
    fn test_set_frequency_bounds() {
        let mut settings = DepotSettings::default();
        settings.set_frequency(3, -5);
        settings.set_frequency(4, 6);
        settings.set_frequency(24, 6);
        settings.set_frequency(-1, 6);
        assert_eq!(settings.frequencies[3], 0);
        assert_eq!(settings.frequencies[4], 6);
        assert_eq!(settings.frequencies.iter().sum::<u32>(), 6);
    }

    #[test]
    fn test_no_sidings() {
        let mut depot = Depot::new(1, "Empty", TransportMode::Train, DepotSettings::default());
        assert!(!depot.generate_main_route(4));
        assert!(!depot.is_generating());
    }

    #[test]
    fn test_generation_writes_departures() {
        let settings = DepotSettings {
            use_real_time: true,
            real_time_departures: vec![0, 300_000, 600_000],
            ..DepotSettings::default()
        };
        let mut depot = depot(settings);
        assert_eq!(run_generation(&mut depot), Some(3));
        assert!(depot.sidings()[0].has_route());
        assert_eq!(depot.departure_count(), 3);
        assert!(depot.path_search_steps() > 0);
    }

    #[test]
    fn test_unreachable_waypoint_stops_generation() {
        let mut depot = depot(DepotSettings::default());
        depot.set_waypoints(vec![p(100), p(9999)]);
        assert_eq!(run_generation(&mut depot), None);
        assert_eq!(depot.departure_count(), 0);
    }

    #[test]
    fn test_settings_record() {
        let mut settings = DepotSettings {
            repeat_infinitely: true,
            real_time_departures: vec![5, 10],
            ..DepotSettings::default()
        };
        settings.set_frequency(7, 3);
        let restored = DepotSettings::from_record(&settings.to_record()).unwrap();
        assert_eq!(restored, settings);
    }
}
