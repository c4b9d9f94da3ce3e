//! Core type definitions for the rail simulation.
//!
//! This module defines the identifiers, positions and segment keys shared by
//! every subsystem, plus the time constants used by the scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds, used for tick lengths, dwell times and departure offsets.
pub type Millis = i64;

/// Unique identifier for a vehicle.
pub type VehicleId = u64;

/// Unique identifier for a siding.
pub type SidingId = u64;

/// Unique identifier for a depot.
pub type DepotId = u64;

/// Unique identifier for a signal block.
pub type BlockId = u64;

/// Identifier of the route a connection belongs to.
pub type RouteId = u64;

pub const MILLIS_PER_SECOND: Millis = 1000;
pub const MILLIS_PER_HOUR: Millis = 3_600_000;
pub const MILLIS_PER_DAY: Millis = 86_400_000;
pub const HOURS_PER_DAY: usize = 24;

/// An integer world position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Position {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Straight-line distance to another position.
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        let dz = (self.z - other.z) as f64;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Canonical identity of a track segment.
///
/// The two endpoints are stored in ascending order, so the same piece of
/// track has the same key no matter which direction it is travelled in.
/// Local coordinates along a segment are measured from `start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentKey {
    pub start: Position,
    pub end: Position,
}

impl SegmentKey {
    /// Creates a key from two endpoints in any order.
    pub fn new(a: Position, b: Position) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// Returns true if travelling from `from` runs against the canonical order.
    pub fn is_reversed_from(&self, from: Position) -> bool {
        from != self.start
    }

    /// Returns true if the two segments have at least one endpoint in common.
    pub fn shares_endpoint(&self, other: &SegmentKey) -> bool {
        self.start == other.start
            || self.start == other.end
            || self.end == other.start
            || self.end == other.end
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Kind of transport a depot operates.
///
/// Cable cars run in continuous movement: they never brake for stops and
/// are dispatched at a fixed stride instead of from a timetable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    #[default]
    Train,
    Boat,
    CableCar,
    Airplane,
}

impl TransportMode {
    pub fn continuous_movement(&self) -> bool {
        matches!(self, TransportMode::CableCar)
    }

    /// Speed used on segments that do not allow acceleration, in m/ms.
    pub fn default_speed(&self) -> f64 {
        let kmh = match self {
            TransportMode::Train => 20.0,
            TransportMode::Boat => 10.0,
            TransportMode::CableCar => 8.0,
            TransportMode::Airplane => 60.0,
        };
        kmh_to_meters_per_millisecond(kmh)
    }
}

/// Converts km/h into the m/ms unit used by vehicle motion.
pub fn kmh_to_meters_per_millisecond(kmh: f64) -> f64 {
    kmh / 3600.0
}
