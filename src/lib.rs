//! # Railyard
//!
//! A deterministic rail network simulation: vehicles follow precomputed
//! paths, brake for each other and never overlap, while depots turn sparse
//! timetable settings into a per-vehicle departure schedule.
//!
//! ## Design Principles
//!
//! - **Incremental Work**: Path search and route generation run a bounded
//!   number of steps per tick, so one tick never stalls on a large network.
//! - **Occupancy Horizons**: Vehicles read the claims of the previous tick
//!   and write claims for the next one. Nothing is shared by reference.
//! - **Signal Blocks**: Connected segments of one color form a single zone
//!   that only one vehicle may hold.
//! - **One World, One Loop**: Each world ticks serially; separate worlds
//!   share nothing and may run in parallel.
//!
//! ## Features
//!
//! - `parallel` - Tick independent worlds in parallel using rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use railyard::{Depot, DepotSettings, Position, Siding, Simulator, TimeScale, Track, TrackNetwork, TransportMode, VehicleParams};
//!
//! let p = |x| Position::new(x, 0, 0);
//!
//! let mut network = TrackNetwork::new();
//! network.add_track(p(40), p(100), None, Track::new(0.02, true), true);
//! network.add_track(p(100), p(1100), None, Track::new(0.02, true), true);
//! network.add_platform(p(100), p(1100), 20_000);
//!
//! let settings = DepotSettings {
//!     use_real_time: true,
//!     real_time_departures: vec![1_000],
//!     ..DepotSettings::default()
//! };
//! let mut depot = Depot::new(1, "Shuttle", TransportMode::Train, settings);
//! depot.set_waypoints(vec![p(100), p(1100)]);
//! depot.add_siding(Siding::new(1, "Siding 1", p(0), p(40), VehicleParams::default(), 1, 1_200_000));
//!
//! let mut simulator = Simulator::new(network, TimeScale::default(), 7);
//! simulator.add_depot(depot);
//! simulator.generate_by_depot_name("shuttle");
//! simulator.run_for(10_000);
//!
//! let stats = simulator.export_stats();
//! println!("Dispatched: {}", stats["simulator"]["departures_dispatched"]);
//! ```
//!
//! ## Parallel Execution
//!
//! Enable the `parallel` feature to tick worlds on the rayon pool:
//!
//! ```rust,ignore
//! use railyard::parallel::Worlds;
//!
//! let mut worlds = Worlds::new().with_threads(4);
//! worlds.add(overworld);
//! worlds.add(nether);
//! worlds.run_for(60_000);
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use railyard::{SimConfig, Simulator};
//!
//! let config = SimConfig::from_yaml_file("world.yaml")?;
//! let mut simulator = Simulator::from_config(&config)?;
//! ```

pub mod types;
pub mod error;
pub mod record;
pub mod path;
pub mod network;
pub mod occupancy;
pub mod signal;
pub mod vehicle;
pub mod schedule;
pub mod siding;
pub mod depot;
pub mod simulator;
pub mod config;
pub mod stats;
pub mod parallel;

// Re-export commonly used types
pub use types::{BlockId, DepotId, Millis, Position, SegmentKey, SidingId, TransportMode, VehicleId};
pub use error::{SimError, SimResult};
pub use record::{Persist, Record};
pub use path::{AssemblyStatus, ConnectionDetails, ConnectionProvider, PathFinder, PathSegment, RouteAssembler, SearchStatus, Track};
pub use network::TrackNetwork;
pub use occupancy::{OccupancyHorizons, OccupancyMap};
pub use signal::{BlockColor, SignalBlock, SignalBlocks};
pub use vehicle::{Vehicle, VehicleParams, VehicleSnapshot, VehicleState};
pub use schedule::{DepartureSink, DepartureSource, TimeScale};
pub use siding::Siding;
pub use depot::{Depot, DepotSettings};
pub use simulator::{Simulator, SimulatorStats};
pub use config::{ConfigError, SimConfig, SimConfigBuilder};
pub use stats::{SimulationStats, StatsCollector, Timer};
pub use parallel::Worlds;

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging.
///
/// # Example
///
/// ```rust,ignore
/// railyard::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
