//! Sidings: where vehicles park between trips.
//!
//! A siding owns a fixed roster of vehicle slots and the path they share.
//! The path runs out of the siding, along the depot's main route and back
//! in, or around the main route forever for repeating depots. The siding
//! accepts departures from the scheduler, gives each one to a slot, and
//! dispatches vehicles as the game-day clock crosses departure offsets.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::SimResult;
use crate::network::TrackNetwork;
use crate::occupancy::OccupancyHorizons;
use crate::path::{validate_path, ConnectionDetails, PathSegment, Track};
use crate::record::{Persist, Record};
use crate::schedule::{cyclic_difference, DepartureSink};
use crate::signal::SignalBlocks;
use crate::types::{Millis, Position, SidingId, VehicleId};
use crate::vehicle::{LoopIndices, Vehicle, VehicleParams, VehicleSnapshot, VehicleState};

/// Vehicle ids are the siding id shifted left by this, plus the slot.
const SLOT_BITS: u32 = 16;

/// Builds the id of the vehicle in a slot.
pub fn vehicle_id(siding: SidingId, slot: usize) -> VehicleId {
    (siding << SLOT_BITS) | slot as VehicleId
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct TimedSegment {
    start_distance: f64,
    end_distance: f64,
    speed: f64,
    start_time: f64,
}

/// Ideal travel times along a path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Timetable {
    segments: Vec<TimedSegment>,
    total_time: f64,
}

impl Timetable {
    /// Times each segment at its speed limit, plus dwell at its end.
    pub fn new(path: &[PathSegment], fallback_speed: f64) -> Self {
        let mut segments = Vec::with_capacity(path.len());
        let mut time = 0.0;
        for segment in path {
            let speed = if segment.track.can_accelerate && segment.track.speed_limit > 0.0 {
                segment.track.speed_limit
            } else {
                fallback_speed
            };
            segments.push(TimedSegment {
                start_distance: segment.start_distance,
                end_distance: segment.end_distance,
                speed,
                start_time: time,
            });
            if speed > 0.0 {
                time += segment.length() / speed;
            }
            time += segment.dwell_time as f64;
        }
        Self {
            segments,
            total_time: time,
        }
    }

    /// Time to reach `distance` from the start of the path.
    pub fn time_along_route(&self, distance: f64) -> f64 {
        let Some(last) = self.segments.len().checked_sub(1) else {
            return 0.0;
        };
        let index = self
            .segments
            .partition_point(|segment| segment.end_distance <= distance)
            .min(last);
        let segment = &self.segments[index];
        if segment.speed <= 0.0 {
            return segment.start_time;
        }
        let into = (distance - segment.start_distance).clamp(0.0, segment.end_distance - segment.start_distance);
        segment.start_time + into / segment.speed
    }

    /// Time for one full trip.
    pub fn round_trip(&self) -> Millis {
        self.total_time.round() as Millis
    }
}

/// Counters from one siding tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SidingTick {
    pub vehicle_ticks: u64,
    pub failures: u64,
    pub block_rejections: u64,
}

/// A siding and its vehicles.
#[derive(Debug)]
pub struct Siding {
    id: SidingId,
    name: String,
    entry: Position,
    exit: Position,
    params: VehicleParams,
    max_vehicles: usize,
    cycle_length: Millis,
    path: Arc<[PathSegment]>,
    loop_indices: Option<LoopIndices>,
    has_route: bool,
    timetable: Timetable,
    departures: Vec<Millis>,
    slots: Vec<usize>,
    vehicles: Vec<Vehicle>,
    times_along_route: BTreeMap<usize, Millis>,
}

impl Siding {
    /// Creates a siding with no route. Vehicles park between `entry` and
    /// `exit` and leave through `exit`.
    ///
    /// # Arguments
    /// * `id` - Unique siding id
    /// * `name` - Display name
    /// * `entry` - Dead end of the siding
    /// * `exit` - End connected to the network
    /// * `params` - Vehicle properties; `rail_length` is set from the endpoints
    /// * `max_vehicles` - Number of vehicle slots
    /// * `cycle_length` - Real milliseconds per game day
    pub fn new(
        id: SidingId,
        name: impl Into<String>,
        entry: Position,
        exit: Position,
        mut params: VehicleParams,
        max_vehicles: usize,
        cycle_length: Millis,
    ) -> Self {
        params.rail_length = entry.distance(&exit);
        let mut siding = Self {
            id,
            name: name.into(),
            entry,
            exit,
            params,
            max_vehicles,
            cycle_length,
            path: Arc::from(Vec::new()),
            loop_indices: None,
            has_route: false,
            timetable: Timetable::default(),
            departures: Vec::new(),
            slots: Vec::new(),
            vehicles: Vec::new(),
            times_along_route: BTreeMap::new(),
        };
        siding.install_path(vec![siding.siding_segment(0.0, false)], None, false);
        siding
    }

    pub fn id(&self) -> SidingId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exit(&self) -> Position {
        self.exit
    }

    pub fn max_vehicles(&self) -> usize {
        self.max_vehicles
    }

    pub fn has_route(&self) -> bool {
        self.has_route
    }

    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    pub fn departures(&self) -> &[Millis] {
        &self.departures
    }

    /// Slot serving each departure, by departure index.
    pub fn departure_slots(&self) -> &[usize] {
        &self.slots
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn vehicles_mut(&mut self) -> &mut [Vehicle] {
        &mut self.vehicles
    }

    pub fn timetable(&self) -> &Timetable {
        &self.timetable
    }

    /// Time along route of every trip under way, by departure index.
    pub fn times_along_route(&self) -> &BTreeMap<usize, Millis> {
        &self.times_along_route
    }

    fn siding_segment(&self, start_distance: f64, inbound: bool) -> PathSegment {
        let track = Track::new(self.params.transport_mode.default_speed(), false);
        let (from, to) = if inbound {
            (self.exit, self.entry)
        } else {
            (self.entry, self.exit)
        };
        PathSegment::new(
            start_distance,
            start_distance + self.params.rail_length,
            from,
            to,
            0,
            track,
        )
    }

    /// Builds the vehicle path from found legs.
    ///
    /// # Arguments
    /// * `network` - Network the legs were found on
    /// * `out_legs` - Legs from the siding exit to the first waypoint
    /// * `main_start` - First waypoint
    /// * `main_legs` - Legs of the main route
    /// * `in_legs` - Legs from the last waypoint back to the siding exit,
    ///   or `None` for a repeating route
    pub fn build_path(
        &mut self,
        network: &TrackNetwork,
        out_legs: &[ConnectionDetails<Position>],
        main_start: Position,
        main_legs: &[ConnectionDetails<Position>],
        in_legs: Option<&[ConnectionDetails<Position>]>,
    ) -> SimResult<()> {
        let mode = self.params.transport_mode;
        let Some(main_end) = main_legs.last().map(|leg| leg.node) else {
            tracing::info!(siding = %self.name, "Main route is empty");
            self.clear_route();
            return Ok(());
        };

        let mut path = vec![self.siding_segment(0.0, false)];
        path.extend(network.segments_for(self.exit, out_legs, self.params.rail_length, mode)?);
        let main_from = path.len();
        let main_distance = path.last().map_or(0.0, |segment| segment.end_distance);
        let main = network.segments_for(main_start, main_legs, main_distance, mode)?;
        let main_end_distance = main.last().map_or(main_distance, |segment| segment.end_distance);
        let first_main = main[0];
        path.extend(main);

        let loop_indices = match in_legs {
            None => {
                path.push(first_main.shifted_to(main_end_distance));
                Some(LoopIndices {
                    start: main_from,
                    end: path.len() - 1,
                })
            }
            Some(in_legs) => {
                let inbound = network.segments_for(main_end, in_legs, main_end_distance, mode)?;
                let siding_start = inbound.last().map_or(main_end_distance, |segment| segment.end_distance);
                path.extend(inbound);
                path.push(self.siding_segment(siding_start, true));
                None
            }
        };

        validate_path(&path)?;
        self.install_path(path, loop_indices, true);
        Ok(())
    }

    /// Drops the route, leaving vehicles parked on the siding alone.
    pub fn clear_route(&mut self) {
        self.install_path(vec![self.siding_segment(0.0, false)], None, false);
    }

    fn install_path(&mut self, path: Vec<PathSegment>, loop_indices: Option<LoopIndices>, has_route: bool) {
        self.timetable = Timetable::new(&path, self.params.transport_mode.default_speed());
        self.path = Arc::from(path);
        self.loop_indices = loop_indices;
        self.has_route = has_route;
        self.vehicles = (0..self.max_vehicles)
            .map(|slot| {
                Vehicle::new(
                    vehicle_id(self.id, slot),
                    self.params.clone(),
                    Arc::clone(&self.path),
                    loop_indices,
                )
            })
            .collect();
        self.times_along_route.clear();
    }

    /// Sorts the accepted departures and gives each to a vehicle slot.
    ///
    /// Slots are taken round-robin, skipping any slot still out on a
    /// previous trip. When every slot is busy the one returning first
    /// takes the departure.
    pub fn finish_departures(&mut self) {
        self.departures.sort_unstable();
        self.slots.clear();

        let count = self.vehicles.len();
        if count == 0 {
            return;
        }
        let round_trip = self.timetable.round_trip();
        let mut busy_until: Vec<Option<Millis>> = vec![None; count];
        let mut pointer = 0;

        for &departure in &self.departures {
            let free = (0..count)
                .map(|offset| (pointer + offset) % count)
                .find(|&slot| busy_until[slot].map_or(true, |until| until <= departure));
            let slot = free.unwrap_or_else(|| {
                tracing::debug!(siding = %self.name, departure, "Every vehicle busy, reusing the earliest");
                (0..count)
                    .min_by_key(|&slot| busy_until[slot].unwrap_or(Millis::MIN))
                    .unwrap_or(0)
            });
            busy_until[slot] = Some(departure + round_trip);
            self.slots.push(slot);
            pointer = slot + 1;
        }
    }

    /// Dispatches every departure whose offset the clock crossed in
    /// `(from, to]`. Returns the number of vehicles started.
    pub fn dispatch(&mut self, from: Millis, to: Millis) -> usize {
        let cycle = self.cycle_length.max(1);
        let mut started = 0;
        for (index, (&departure, &slot)) in self.departures.iter().zip(&self.slots).enumerate() {
            let crossed = (to - departure).div_euclid(cycle) > (from - departure).div_euclid(cycle);
            if !crossed {
                continue;
            }
            let Some(vehicle) = self.vehicles.get_mut(slot) else {
                continue;
            };
            if vehicle.is_on_route() {
                tracing::debug!(vehicle = vehicle.id(), departure, "Vehicle still on previous trip");
                continue;
            }
            tracing::debug!(vehicle = vehicle.id(), departure, "Dispatching vehicle");
            vehicle.start_up(Some(index));
            started += 1;
        }
        started
    }

    /// Ticks every vehicle, then occupies the signal blocks covering the
    /// segments each one claimed.
    pub fn tick(&mut self, millis: Millis, horizons: &mut OccupancyHorizons, signals: &mut SignalBlocks) -> SidingTick {
        let mut counters = SidingTick::default();
        self.times_along_route.clear();

        for vehicle in &mut self.vehicles {
            counters.vehicle_ticks += 1;
            let claimed = match vehicle.tick(millis, horizons) {
                Ok(claimed) => claimed,
                Err(_) => {
                    counters.failures += 1;
                    continue;
                }
            };

            for key in claimed {
                if signals.covers(&key) && !signals.occupy(key, horizons.maps_mut(), vehicle.id()) {
                    counters.block_rejections += 1;
                }
            }

            if let Some(index) = vehicle.departure_index() {
                let time = self.timetable.time_along_route(vehicle.state().progress).round() as Millis;
                self.times_along_route
                    .insert(index, time + vehicle.state().elapsed_dwell);
            }
        }
        counters
    }

    pub fn snapshots(&self) -> Vec<VehicleSnapshot> {
        self.vehicles.iter().map(Vehicle::snapshot).collect()
    }

    /// Flattens the departures and vehicle states.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record
            .put_u64("id", self.id)
            .put_i64_array("departures", self.departures.iter().copied())
            .put_records("vehicles", self.vehicles.iter().map(|vehicle| vehicle.state().to_record()));
        record
    }

    /// Restores departures and vehicle states written by [`Siding::to_record`].
    /// Vehicles beyond the stored ones keep their state.
    pub fn restore_from_record(&mut self, record: &Record) -> SimResult<()> {
        self.departures = record.get_i64_array("departures");
        self.finish_departures();
        for (vehicle, state) in self.vehicles.iter_mut().zip(record.get_records("vehicles")) {
            vehicle.restore(VehicleState::from_record(&state)?);
        }
        Ok(())
    }
}

impl DepartureSink for Siding {
    fn id(&self) -> SidingId {
        self.id
    }

    fn start_generating_departures(&mut self) {
        self.departures.clear();
        self.slots.clear();
    }

    /// Accepts a departure if the siding has a route, the departure is new,
    /// and fewer than `max_vehicles` trips overlap it.
    fn add_departure(&mut self, departure: Millis) -> bool {
        if !self.has_route || self.departures.contains(&departure) {
            return false;
        }
        let round_trip = self.timetable.round_trip();
        let overlapping = self
            .departures
            .iter()
            .filter(|&&other| cyclic_difference(other, departure, self.cycle_length).abs() < round_trip)
            .count();
        if overlapping >= self.max_vehicles {
            return false;
        }
        self.departures.push(departure);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use crate::path::{PathFinder, SearchStatus};

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

    fn legs(network: &TrackNetwork, from: Position, to: Position) -> Vec<ConnectionDetails<Position>> {
        match PathFinder::new(from, to).solve(network) {
            SearchStatus::Found(legs) => legs,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn siding(max_vehicles: usize) -> Siding {
        Siding::new(3, "Siding 3", p(0), p(40), VehicleParams::default(), max_vehicles, 1_200_000)
    }

    fn routed(max_vehicles: usize, repeat: bool) -> Siding {
        let network = network();
        let mut siding = siding(max_vehicles);
        let out_legs = legs(&network, p(40), p(100));
        let main_legs = legs(&network, p(100), p(1100));
        let in_legs = legs(&network, p(1100), p(40));
        let in_legs = (!repeat).then_some(in_legs.as_slice());
        siding
            .build_path(&network, &out_legs, p(100), &main_legs, in_legs)
            .unwrap();
        siding
    }

    #[test]
    fn test_vehicle_ids() {
        assert_eq!(vehicle_id(3, 2), (3 << 16) | 2);
        let siding = siding(2);
        assert_eq!(siding.vehicles()[1].id(), vehicle_id(3, 1));
    }

    #[test]
    fn test_without_route_rejects_departures() {
        let mut siding = siding(2);
        assert!(!siding.has_route());
        assert!(!siding.add_departure(0));
    }

    #[test]
    fn test_round_trip_path() {
        let siding = routed(1, false);
        let lengths: Vec<f64> = siding.path().iter().map(PathSegment::length).collect();
        assert_eq!(lengths, vec![40.0, 60.0, 1000.0, 1000.0, 60.0, 40.0]);
        assert!(siding.path()[0].is_opposite(&siding.path()[5]));
        assert!(siding.has_route());
    }

    #[test]
    fn test_failed_build_clears_route() {
        let network = network();
        let mut siding = routed(2, false);
        assert!(siding.has_route());

        // Outbound legs that do not start at the siding exit
        let wrong = legs(&network, p(100), p(1100));
        let built = siding.build_path(&network, &wrong, p(100), &wrong, None);
        assert!(matches!(built, Err(SimError::MissingTrack { .. })));

        siding.clear_route();
        assert!(!siding.has_route());
        assert_eq!(siding.path().len(), 1);
        assert_eq!(siding.vehicles().len(), 2);
        assert!(!siding.add_departure(0));
    }

    #[test]
    fn test_repeating_path_closes_loop() {
        let siding = routed(1, true);
        let path = siding.path();
        assert_eq!(path.len(), 4);
        assert_eq!(path[3].key, path[2].key);
        assert_eq!(path[3].start_distance, path[2].end_distance);
    }

    #[test]
    fn test_overlap_limit() {
        let mut siding = routed(1, false);
        let round_trip = siding.timetable().round_trip();
        assert!(round_trip > 0);
        assert!(siding.add_departure(0));
        assert!(!siding.add_departure(0));
        assert!(!siding.add_departure(round_trip / 2));
        assert!(siding.add_departure(round_trip));
    }

    #[test]
    fn test_slots_skip_busy_vehicles() {
        let mut siding = routed(2, false);
        let round_trip = siding.timetable().round_trip();
        siding.start_generating_departures();
        assert!(siding.add_departure(0));
        assert!(siding.add_departure(10));
        assert!(siding.add_departure(round_trip + 5));
        siding.finish_departures();
        assert_eq!(siding.departure_slots(), &[0, 1, 0]);
    }

    #[test]
    fn test_dispatch_on_clock_crossing() {
        let mut siding = routed(1, false);
        assert!(siding.add_departure(1000));
        siding.finish_departures();

        assert_eq!(siding.dispatch(0, 999), 0);
        assert_eq!(siding.dispatch(999, 1000), 1);
        assert!(siding.vehicles()[0].is_on_route());
        assert_eq!(siding.vehicles()[0].departure_index(), Some(0));
        assert_eq!(siding.dispatch(1_200_999, 1_201_000), 0);
    }

    #[test]
    fn test_time_along_route() {
        let siding = routed(1, false);
        let timetable = siding.timetable();
        assert_eq!(timetable.time_along_route(0.0), 0.0);
        let before_stop = timetable.time_along_route(1099.5);
        let after_stop = timetable.time_along_route(1100.0);
        assert!(after_stop - before_stop >= 20_000.0);
    }

    #[test]
    fn test_record_restores_vehicles() {
        let mut siding = routed(1, false);
        assert!(siding.add_departure(500));
        siding.finish_departures();
        siding.dispatch(0, 500);
        let record = siding.to_record();

        let mut restored = routed(1, false);
        restored.restore_from_record(&record).unwrap();
        assert_eq!(restored.departures(), &[500]);
        assert_eq!(restored.vehicles()[0].state(), siding.vehicles()[0].state());
    }
}
