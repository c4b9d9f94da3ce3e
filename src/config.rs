//! Configuration system for the rail simulation.
//!
//! This module provides YAML/JSON configuration file support for defining
//! a world declaratively: its track network, depots with their sidings, and
//! signal blocks.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   tick_millis: 50
//!   millis_per_game_day: 1200000
//!   path_steps_per_tick: 16
//!   seed: 7
//!
//! network:
//!   tracks:
//!     - from: { x: 0, y: 0, z: 0 }
//!       to: { x: 500, y: 0, z: 0 }
//!       speed_limit_kmh: 80
//!   platforms:
//!     - a: { x: 0, y: 0, z: 0 }
//!       b: { x: 500, y: 0, z: 0 }
//!       dwell_millis: 20000
//!
//! depots:
//!   - id: 1
//!     name: Shuttle Depot
//!     waypoints: [{ x: 0, y: 0, z: 0 }, { x: 500, y: 0, z: 0 }]
//!     settings:
//!       use_real_time: true
//!       real_time_departures: [0, 120000]
//!     sidings:
//!       - id: 1
//!         name: Siding 1
//!         entry: { x: -60, y: 0, z: 0 }
//!         exit: { x: -10, y: 0, z: 0 }
//!         max_vehicles: 2
//!
//! signal_blocks:
//!   - color: red
//!     segments:
//!       - [{ x: 0, y: 0, z: 0 }, { x: 500, y: 0, z: 0 }]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::depot::DepotSettings;
use crate::occupancy::OccupancyHorizons;
use crate::path::Track;
use crate::signal::BlockColor;
use crate::types::{kmh_to_meters_per_millisecond, DepotId, Millis, Position, SidingId, TransportMode};
use crate::vehicle::{round_acceleration, VehicleParams, ACCELERATION_DEFAULT};

/// Largest siding id that still leaves room for the slot in a vehicle id.
pub const MAX_SIDING_ID: SidingId = (1 << 48) - 1;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Global simulation parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Length of one tick in milliseconds
    #[serde(default = "default_tick_millis")]
    pub tick_millis: Millis,

    /// Real milliseconds in one game day
    #[serde(default = "default_millis_per_game_day")]
    pub millis_per_game_day: Millis,

    /// Fraction of the game day elapsed at `start_millis`
    #[serde(default)]
    pub starting_game_day_percentage: f64,

    /// Real clock at simulation start
    #[serde(default)]
    pub start_millis: Millis,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path-search steps each depot may take per tick
    #[serde(default = "default_path_steps_per_tick")]
    pub path_steps_per_tick: usize,

    /// Seed of the siding shuffle
    #[serde(default)]
    pub seed: u64,

    /// Number of occupancy horizons kept
    #[serde(default = "default_occupancy_horizons")]
    pub occupancy_horizons: usize,
}

fn default_tick_millis() -> Millis {
    50
}

fn default_millis_per_game_day() -> Millis {
    1_200_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_path_steps_per_tick() -> usize {
    16
}

fn default_occupancy_horizons() -> usize {
    OccupancyHorizons::MIN_HORIZONS
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            millis_per_game_day: default_millis_per_game_day(),
            starting_game_day_percentage: 0.0,
            start_millis: 0,
            log_level: default_log_level(),
            path_steps_per_tick: default_path_steps_per_tick(),
            seed: 0,
            occupancy_horizons: default_occupancy_horizons(),
        }
    }
}

/// A piece of track.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackConfig {
    pub from: Position,
    pub to: Position,

    /// Length in meters; the straight-line distance when absent
    #[serde(default)]
    pub length: Option<f64>,

    #[serde(default = "default_speed_limit_kmh")]
    pub speed_limit_kmh: f64,

    #[serde(default = "default_true")]
    pub can_accelerate: bool,

    #[serde(default = "default_true")]
    pub bidirectional: bool,
}

fn default_speed_limit_kmh() -> f64 {
    80.0
}

fn default_true() -> bool {
    true
}

impl TrackConfig {
    pub fn track(&self) -> Track {
        Track::new(kmh_to_meters_per_millisecond(self.speed_limit_kmh), self.can_accelerate)
    }
}

/// A platform stop on an existing track.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub a: Position,
    pub b: Position,

    #[serde(default = "default_dwell_millis")]
    pub dwell_millis: Millis,
}

fn default_dwell_millis() -> Millis {
    20_000
}

/// Track topology.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub tracks: Vec<TrackConfig>,

    #[serde(default)]
    pub platforms: Vec<PlatformConfig>,
}

/// A siding and the vehicles parked in it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SidingConfig {
    /// Unique siding identifier, across all depots
    pub id: SidingId,

    #[serde(default)]
    pub name: String,

    /// Dead end of the siding
    pub entry: Position,

    /// End connected to the network
    pub exit: Position,

    #[serde(default = "default_max_vehicles")]
    pub max_vehicles: usize,

    /// Total length of all cars, in meters
    #[serde(default = "default_vehicle_length")]
    pub vehicle_length: f64,

    /// Acceleration in m/ms²
    #[serde(default = "default_acceleration")]
    pub acceleration: f64,

    #[serde(default)]
    pub manual_allowed: bool,

    #[serde(default)]
    pub max_manual_speed_kmh: f64,
}

fn default_max_vehicles() -> usize {
    1
}

fn default_vehicle_length() -> f64 {
    20.0
}

fn default_acceleration() -> f64 {
    ACCELERATION_DEFAULT
}

impl SidingConfig {
    /// Vehicle properties for a depot running `transport_mode`.
    pub fn vehicle_params(&self, transport_mode: TransportMode) -> VehicleParams {
        VehicleParams {
            rail_length: self.entry.distance(&self.exit),
            vehicle_length: self.vehicle_length,
            acceleration: round_acceleration(self.acceleration),
            transport_mode,
            manual_allowed: self.manual_allowed,
            max_manual_speed: kmh_to_meters_per_millisecond(self.max_manual_speed_kmh),
        }
    }

    /// Validates the siding configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.id > MAX_SIDING_ID {
            return Err(ConfigError::Validation(format!(
                "Siding ID {} exceeds {}",
                self.id, MAX_SIDING_ID
            )));
        }
        if self.entry == self.exit {
            return Err(ConfigError::Validation(format!(
                "Siding {} has the same entry and exit",
                self.id
            )));
        }
        if self.vehicle_length <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "Siding {} has a non-positive vehicle length",
                self.id
            )));
        }
        if self.vehicle_length > self.entry.distance(&self.exit) {
            tracing::warn!("Vehicles of siding {} are longer than the siding", self.id);
        }
        if self.max_vehicles == 0 {
            tracing::warn!("Siding {} has no vehicles", self.id);
        }
        Ok(())
    }
}

/// Configuration for a depot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DepotConfig {
    /// Unique depot identifier
    pub id: DepotId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub transport_mode: TransportMode,

    /// Platforms the main route visits, in order
    #[serde(default)]
    pub waypoints: Vec<Position>,

    #[serde(default)]
    pub settings: DepotSettings,

    #[serde(default)]
    pub sidings: Vec<SidingConfig>,
}

/// Configuration for one signal block color over a set of segments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignalBlockConfig {
    #[serde(default)]
    pub color: BlockColor,

    /// Segments as endpoint pairs
    #[serde(default)]
    pub segments: Vec<(Position, Position)>,
}

/// Complete simulation configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimConfig {
    /// Global simulation parameters
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Track topology
    #[serde(default)]
    pub network: NetworkConfig,

    /// Depot definitions
    #[serde(default)]
    pub depots: Vec<DepotConfig>,

    /// Signal block definitions
    #[serde(default)]
    pub signal_blocks: Vec<SignalBlockConfig>,
}

impl SimConfig {
    /// Creates a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let params = &self.simulation;
        if params.tick_millis <= 0 {
            return Err(ConfigError::Validation(format!(
                "tick_millis must be positive, got {}",
                params.tick_millis
            )));
        }
        if params.millis_per_game_day <= 0 {
            return Err(ConfigError::Validation(format!(
                "millis_per_game_day must be positive, got {}",
                params.millis_per_game_day
            )));
        }
        if !(0.0..=1.0).contains(&params.starting_game_day_percentage) {
            return Err(ConfigError::Validation(format!(
                "starting_game_day_percentage must be within 0..=1, got {}",
                params.starting_game_day_percentage
            )));
        }
        if params.log_level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Unknown log level `{}`",
                params.log_level
            )));
        }
        if params.occupancy_horizons < OccupancyHorizons::MIN_HORIZONS {
            return Err(ConfigError::Validation(format!(
                "At least {} occupancy horizons are needed, got {}",
                OccupancyHorizons::MIN_HORIZONS,
                params.occupancy_horizons
            )));
        }

        for track in &self.network.tracks {
            if track.from == track.to {
                return Err(ConfigError::Validation(format!(
                    "Track from {} loops back onto itself",
                    track.from
                )));
            }
            if track.speed_limit_kmh <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "Track {} to {} has a non-positive speed limit",
                    track.from, track.to
                )));
            }
            if track.length.is_some_and(|length| length <= 0.0) {
                return Err(ConfigError::Validation(format!(
                    "Track {} to {} has a non-positive length",
                    track.from, track.to
                )));
            }
        }

        // Validate depots and sidings have unique IDs
        let mut depot_ids = HashSet::new();
        let mut siding_ids = HashSet::new();
        for depot in &self.depots {
            if !depot_ids.insert(depot.id) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate depot ID: {}",
                    depot.id
                )));
            }
            if depot.sidings.is_empty() {
                tracing::warn!("Depot {} has no sidings", depot.id);
            }
            for siding in &depot.sidings {
                siding.validate()?;
                if !siding_ids.insert(siding.id) {
                    return Err(ConfigError::Validation(format!(
                        "Duplicate siding ID: {}",
                        siding.id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns the number of depots.
    pub fn depot_count(&self) -> usize {
        self.depots.len()
    }

    /// Returns the number of sidings over all depots.
    pub fn siding_count(&self) -> usize {
        self.depots.iter().map(|depot| depot.sidings.len()).sum()
    }

    /// Returns the number of configured tracks.
    pub fn track_count(&self) -> usize {
        self.network.tracks.len()
    }

    /// Finds a depot configuration by ID.
    pub fn find_depot(&self, id: DepotId) -> Option<&DepotConfig> {
        self.depots.iter().find(|depot| depot.id == id)
    }
}

/// Builder for creating SimConfig programmatically.
#[derive(Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tick length.
    pub fn tick_millis(mut self, millis: Millis) -> Self {
        self.config.simulation.tick_millis = millis;
        self
    }

    /// Sets the length of a game day in real milliseconds.
    pub fn millis_per_game_day(mut self, millis: Millis) -> Self {
        self.config.simulation.millis_per_game_day = millis;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Sets the path-search steps per tick.
    pub fn path_steps_per_tick(mut self, steps: usize) -> Self {
        self.config.simulation.path_steps_per_tick = steps;
        self
    }

    /// Sets the seed of the siding shuffle.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.simulation.seed = seed;
        self
    }

    /// Adds a bidirectional track with the default speed limit.
    pub fn add_track(mut self, from: Position, to: Position, speed_limit_kmh: f64) -> Self {
        self.config.network.tracks.push(TrackConfig {
            from,
            to,
            length: None,
            speed_limit_kmh,
            can_accelerate: true,
            bidirectional: true,
        });
        self
    }

    /// Adds a platform.
    pub fn add_platform(mut self, a: Position, b: Position, dwell_millis: Millis) -> Self {
        self.config.network.platforms.push(PlatformConfig { a, b, dwell_millis });
        self
    }

    /// Adds a depot configuration.
    pub fn add_depot(mut self, depot: DepotConfig) -> Self {
        self.config.depots.push(depot);
        self
    }

    /// Adds a signal block segment.
    pub fn add_signal_block(mut self, color: BlockColor, a: Position, b: Position) -> Self {
        match self.config.signal_blocks.iter_mut().find(|block| block.color == color) {
            Some(block) => block.segments.push((a, b)),
            None => self.config.signal_blocks.push(SignalBlockConfig {
                color,
                segments: vec![(a, b)],
            }),
        }
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
