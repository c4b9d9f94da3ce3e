//! Track occupancy by time horizon.
//!
//! Every tick, vehicles write the stretch of track they cover into the
//! *next* horizon, while reading both the previous tick's claims and those
//! already written this tick. Rotating the horizons at the start of a tick
//! replaces locking: readers and writers never share a map within a tick.
//!
//! Claims are spans in segment-local coordinates, measured from
//! [`SegmentKey::start`]. A signal block claims a segment as a whole.

use std::collections::HashMap;

use crate::types::{SegmentKey, VehicleId};

/// A stretch of one segment held by a vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OccupiedSpan {
    pub vehicle: VehicleId,
    /// Local coordinate where the span starts
    pub from: f64,
    /// Local coordinate where the span ends (`from <= to`)
    pub to: f64,
}

impl OccupiedSpan {
    pub fn intersects(&self, from: f64, to: f64) -> bool {
        self.from <= to && from <= self.to
    }
}

/// Claims made in one horizon, keyed by segment.
#[derive(Clone, Debug, Default)]
pub struct OccupancyMap {
    segments: HashMap<SegmentKey, Vec<OccupiedSpan>>,
}

impl OccupancyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the span between two local coordinates, given in any order.
    pub fn claim(&mut self, key: SegmentKey, vehicle: VehicleId, a: f64, b: f64) {
        let (from, to) = if a <= b { (a, b) } else { (b, a) };
        self.segments
            .entry(key)
            .or_default()
            .push(OccupiedSpan { vehicle, from, to });
    }

    /// Claims the whole segment.
    pub fn claim_whole(&mut self, key: SegmentKey, vehicle: VehicleId) {
        let spans = self.segments.entry(key).or_default();
        let already = spans
            .iter()
            .any(|span| span.vehicle == vehicle && span.from <= 0.0 && span.to == f64::INFINITY);
        if !already {
            spans.push(OccupiedSpan {
                vehicle,
                from: 0.0,
                to: f64::INFINITY,
            });
        }
    }

    pub fn spans(&self, key: &SegmentKey) -> &[OccupiedSpan] {
        self.segments.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First vehicle holding any part of the segment.
    pub fn holder(&self, key: &SegmentKey) -> Option<VehicleId> {
        self.spans(key).first().map(|span| span.vehicle)
    }

    /// Returns true if a vehicle other than `vehicle` holds part of the segment.
    pub fn is_held_by_other(&self, key: &SegmentKey, vehicle: VehicleId) -> bool {
        self.spans(key).iter().any(|span| span.vehicle != vehicle)
    }

    /// Segments with at least one claim.
    pub fn segments(&self) -> impl Iterator<Item = &SegmentKey> {
        self.segments.keys()
    }

    /// Segments claimed by the given vehicle.
    pub fn segments_of(&self, vehicle: VehicleId) -> Vec<SegmentKey> {
        let mut keys: Vec<SegmentKey> = self
            .segments
            .iter()
            .filter(|(_, spans)| spans.iter().any(|span| span.vehicle == vehicle))
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }
}

/// Ring of occupancy maps: index 0 holds the previous tick, index 1 the
/// tick being written.
#[derive(Clone, Debug)]
pub struct OccupancyHorizons {
    maps: Vec<OccupancyMap>,
}

impl OccupancyHorizons {
    pub const MIN_HORIZONS: usize = 2;

    /// Creates `count` horizons, never fewer than two.
    pub fn new(count: usize) -> Self {
        let count = count.max(Self::MIN_HORIZONS);
        Self {
            maps: (0..count).map(|_| OccupancyMap::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn maps(&self) -> &[OccupancyMap] {
        &self.maps
    }

    pub fn maps_mut(&mut self) -> &mut [OccupancyMap] {
        &mut self.maps
    }

    /// Claims from the previous tick.
    pub fn current(&self) -> &OccupancyMap {
        &self.maps[0]
    }

    /// Claims written during this tick.
    pub fn next(&self) -> &OccupancyMap {
        &self.maps[1]
    }

    pub fn next_mut(&mut self) -> &mut OccupancyMap {
        &mut self.maps[1]
    }

    /// Drops the oldest horizon and opens an empty one for writing.
    pub fn rotate(&mut self) {
        self.maps.remove(0);
        self.maps.push(OccupancyMap::new());
    }

    /// Holder of a segment in a given horizon.
    pub fn holder(&self, key: &SegmentKey, horizon: usize) -> Option<VehicleId> {
        self.maps.get(horizon).and_then(|map| map.holder(key))
    }

    /// Returns true if another vehicle holds the segment in any horizon.
    pub fn is_held_by_other(&self, key: &SegmentKey, vehicle: VehicleId) -> bool {
        self.maps.iter().any(|map| map.is_held_by_other(key, vehicle))
    }
}

impl Default for OccupancyHorizons {
    fn default() -> Self {
        Self::new(Self::MIN_HORIZONS)
    }
}
