//! Vehicle motion.
//!
//! A [`Vehicle`] advances along a shared, immutable path once per tick. It
//! reads the occupancy written by other vehicles in the last two horizons,
//! brakes for anything within its safe stopping distance, dwells at stops
//! and writes the stretch of track it covers into the next horizon.
//!
//! Units: distances in meters, time in milliseconds, speed in m/ms and
//! acceleration in m/ms².

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{SimError, SimResult};
use crate::occupancy::{OccupancyHorizons, OccupancyMap};
use crate::path::{index_at, PathSegment};
use crate::record::{Persist, Record};
use crate::types::{Millis, SegmentKey, TransportMode, VehicleId};

/// Acceleration used when none is configured, and the creep speed a
/// vehicle starts up with.
pub const ACCELERATION_DEFAULT: f64 = 1.0 / 250_000.0;
pub const MAX_ACCELERATION: f64 = 1.0 / 50_000.0;
pub const MIN_ACCELERATION: f64 = 1.0 / 2_500_000.0;
/// Time for doors to fully open or close.
pub const DOOR_MOVE_TIME: Millis = 64;
/// Pause between arriving and opening doors, and between closing doors and
/// departing.
pub const DOOR_DELAY: Millis = 20;

/// Spans shorter than this are not written to the occupancy map.
const MIN_SPAN: f64 = 0.01;
const BOUNDARY_EPSILON: f64 = 1e-6;

/// Rounds an acceleration to eight decimals and clamps it to the allowed
/// range. Non-positive values fall back to [`ACCELERATION_DEFAULT`].
pub fn round_acceleration(acceleration: f64) -> f64 {
    let rounded = (acceleration * 1e8).round() / 1e8;
    if rounded <= 0.0 || !rounded.is_finite() {
        ACCELERATION_DEFAULT
    } else {
        rounded.clamp(MIN_ACCELERATION, MAX_ACCELERATION)
    }
}

/// Moves a door value toward its target by one tick.
pub fn step_door(value: f64, target_open: bool, millis: Millis) -> f64 {
    let direction = if target_open { 1.0 } else { -1.0 };
    (value + direction * millis as f64 / DOOR_MOVE_TIME as f64).clamp(0.0, 1.0)
}

/// Door target of an automatic vehicle standing at a stop.
fn automatic_door_target(elapsed_dwell: Millis, dwell_time: Millis) -> bool {
    elapsed_dwell >= DOOR_DELAY && elapsed_dwell < dwell_time - DOOR_MOVE_TIME - DOOR_DELAY
}

/// Static properties of a vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleParams {
    /// Length of the siding the vehicle parks in
    pub rail_length: f64,
    /// Total length of all cars
    pub vehicle_length: f64,
    pub acceleration: f64,
    pub transport_mode: TransportMode,
    /// Whether a driver may take manual control
    pub manual_allowed: bool,
    /// Speed cap under manual control, in m/ms
    pub max_manual_speed: f64,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            rail_length: 40.0,
            vehicle_length: 20.0,
            acceleration: ACCELERATION_DEFAULT,
            transport_mode: TransportMode::Train,
            manual_allowed: false,
            max_manual_speed: 0.0,
        }
    }
}

/// Indices of a repeating route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopIndices {
    /// First segment of the main route
    pub start: usize,
    /// Loop-closing segment, a copy of the first main route segment
    pub end: usize,
}

/// Mutable per-tick state of a vehicle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VehicleState {
    /// Distance of the vehicle head along the path
    pub progress: f64,
    pub speed: f64,
    pub reversed: bool,
    pub manual: bool,
    /// Manual lever position, -2..=2, -3 while force-braking
    pub manual_notch: i32,
    pub door_target: bool,
    /// 0 is closed, 1 is fully open
    pub door_value: f64,
    pub elapsed_dwell: Millis,
    /// Path index of the next segment the vehicle must stop at the end of
    pub next_stop_index: usize,
    /// Index of the departure being served, if dispatched
    pub departure_index: Option<usize>,
}

impl Persist for VehicleState {
    fn from_record(record: &Record) -> SimResult<Self> {
        let departure_index = record.get_i64("departure_index", -1);
        Ok(Self {
            progress: record.get_f64("progress", 0.0),
            speed: record.get_f64("speed", 0.0).max(0.0),
            reversed: record.get_bool("reversed", false),
            manual: record.get_bool("manual", false),
            manual_notch: record.get_i64("manual_notch", 0).clamp(-3, 2) as i32,
            door_target: record.get_bool("door_target", false),
            door_value: record.get_f64("door_value", 0.0).clamp(0.0, 1.0),
            elapsed_dwell: record.get_i64("elapsed_dwell", 0),
            next_stop_index: record.get_u64("next_stop_index", 0) as usize,
            departure_index: usize::try_from(departure_index).ok(),
        })
    }

    fn to_record(&self) -> Record {
        let departure_index = self.departure_index.map_or(-1, |index| index as i64);
        let mut record = Record::new();
        record
            .put_f64("progress", self.progress)
            .put_f64("speed", self.speed)
            .put_bool("reversed", self.reversed)
            .put_bool("manual", self.manual)
            .put_i64("manual_notch", self.manual_notch as i64)
            .put_bool("door_target", self.door_target)
            .put_f64("door_value", self.door_value)
            .put_i64("elapsed_dwell", self.elapsed_dwell)
            .put_u64("next_stop_index", self.next_stop_index as u64)
            .put_i64("departure_index", departure_index);
        record
    }
}

/// Outward view of a vehicle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub progress: f64,
    pub speed: f64,
    pub door_value: f64,
    pub manual_notch: i32,
    pub on_route: bool,
    pub departure_index: Option<usize>,
    pub occupied: Vec<SegmentKey>,
}

/// A claim on part of a segment, in segment-local coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Claim {
    key: SegmentKey,
    from: f64,
    to: f64,
}

/// A single vehicle on a shared path.
#[derive(Clone, Debug)]
pub struct Vehicle {
    id: VehicleId,
    params: VehicleParams,
    path: Arc<[PathSegment]>,
    loop_indices: Option<LoopIndices>,
    total_distance: f64,
    default_position: f64,
    state: VehicleState,
}

impl Vehicle {
    /// Creates a vehicle parked at the middle of its siding.
    ///
    /// # Arguments
    /// * `id` - Unique vehicle id
    /// * `params` - Static properties; the acceleration is rounded
    /// * `path` - Path shared with the other vehicles of the siding
    /// * `loop_indices` - Set for repeating routes
    pub fn new(
        id: VehicleId,
        mut params: VehicleParams,
        path: Arc<[PathSegment]>,
        loop_indices: Option<LoopIndices>,
    ) -> Self {
        params.acceleration = round_acceleration(params.acceleration);
        let total_distance = path.last().map_or(0.0, |segment| segment.end_distance);
        let default_position = (params.rail_length + params.vehicle_length) / 2.0;
        let state = VehicleState {
            progress: default_position,
            manual: params.manual_allowed,
            ..VehicleState::default()
        };
        Self {
            id,
            params,
            path,
            loop_indices,
            total_distance,
            default_position,
            state,
        }
    }

    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn params(&self) -> &VehicleParams {
        &self.params
    }

    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    /// Replaces the state, e.g. after loading it from a record.
    pub fn restore(&mut self, state: VehicleState) {
        self.state = state;
    }

    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    pub fn default_position(&self) -> f64 {
        self.default_position
    }

    pub fn is_on_route(&self) -> bool {
        self.state.progress > self.default_position
    }

    pub fn departure_index(&self) -> Option<usize> {
        self.state.departure_index
    }

    /// Moves the manual lever one notch. Accelerating needs closed doors.
    pub fn change_manual_speed(&mut self, accelerate: bool) -> bool {
        let notch = self.state.manual_notch;
        if accelerate && self.state.door_value == 0.0 && (-2..2).contains(&notch) {
            self.state.manual_notch += 1;
            true
        } else if !accelerate && notch > -2 {
            self.state.manual_notch -= 1;
            true
        } else {
            false
        }
    }

    /// Opens or closes the doors. Only possible at a standstill.
    pub fn toggle_doors(&mut self) -> bool {
        if self.state.speed == 0.0 {
            self.state.door_target = !self.state.door_target;
            self.state.manual_notch = -2;
            true
        } else {
            self.state.door_target = false;
            false
        }
    }

    /// Dispatches the vehicle for a departure.
    pub fn start_up(&mut self, departure_index: Option<usize>) {
        let mut state = self.state.clone();
        self.start_up_state(&mut state, departure_index);
        self.state = state;
    }

    fn start_up_state(&self, state: &mut VehicleState, departure_index: Option<usize>) {
        state.departure_index = departure_index;
        state.progress += ACCELERATION_DEFAULT;
        state.elapsed_dwell = 0;
        state.speed = ACCELERATION_DEFAULT;
        state.door_target = false;
        state.door_value = 0.0;

        let from = index_at(&self.path, state.progress);
        state.next_stop_index = self
            .path
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, segment)| segment.dwell_time > 0)
            .map_or(self.path.len().saturating_sub(1), |(index, _)| index);
    }

    /// Advances the vehicle by `millis`.
    ///
    /// The tick runs on a copy of the state. On error the copy is dropped,
    /// nothing is written to the horizons and the error is returned. On
    /// success the segments claimed in the next horizon are returned.
    pub fn tick(&mut self, millis: Millis, horizons: &mut OccupancyHorizons) -> SimResult<Vec<SegmentKey>> {
        let mut state = self.state.clone();
        match self.advance(&mut state, millis, horizons.maps()) {
            Ok(claims) => {
                let next = horizons.next_mut();
                let mut keys = Vec::with_capacity(claims.len());
                for claim in claims {
                    next.claim(claim.key, self.id, claim.from, claim.to);
                    keys.push(claim.key);
                }
                self.state = state;
                Ok(keys)
            }
            Err(error) => {
                tracing::warn!(vehicle = self.id, %error, "Skipping vehicle tick");
                Err(error)
            }
        }
    }

    fn advance(&self, state: &mut VehicleState, millis: Millis, maps: &[OccupancyMap]) -> SimResult<Vec<Claim>> {
        let len = self.path.len();
        if state.next_stop_index >= len {
            state.progress = self.default_position;
            return Ok(Vec::new());
        }

        let door_target;
        let door_value;

        if state.progress <= self.default_position {
            state.progress = self.default_position;
            state.reversed = false;
            state.speed = 0.0;
            state.next_stop_index = 0;
            state.departure_index = None;
            door_target = false;
            door_value = 0.0;

            if state.manual && state.manual_notch > 0 {
                self.start_up_state(state, None);
            }
        } else {
            let current_index = index_at(&self.path, state.progress);
            let at_terminus = self.loop_indices.is_none()
                && state.progress
                    >= self.total_distance - (self.params.rail_length - self.params.vehicle_length) / 2.0;

            if at_terminus || (!self.params.manual_allowed && state.departure_index.is_none()) {
                state.progress = self.default_position;
                state.manual_notch = -2;
                door_target = false;
                door_value = 0.0;
            } else {
                door_target = if state.speed <= 0.0 {
                    self.advance_stopped(state, current_index, millis, maps)?
                } else {
                    self.advance_moving(state, current_index, millis, maps)?
                };
                door_value = step_door(state.door_value, state.door_target, millis);
            }
        }

        state.door_target = door_target;
        state.door_value = door_value;
        if door_target || door_value != 0.0 {
            state.manual_notch = -2;
        }

        if state.progress > self.default_position {
            Ok(self.claims(state.progress))
        } else {
            Ok(Vec::new())
        }
    }

    /// Dwell and departure logic at a standstill. Returns the new door target.
    fn advance_stopped(
        &self,
        state: &mut VehicleState,
        current_index: usize,
        millis: Millis,
        maps: &[OccupancyMap],
    ) -> SimResult<bool> {
        state.speed = 0.0;

        let len = self.path.len();
        let next_index = match self.loop_indices {
            Some(indices) if current_index >= indices.end => indices.start,
            _ => current_index,
        };
        let next = self
            .path
            .get(next_index)
            .ok_or(SimError::PathIndex { index: next_index, len })?;

        // Stops inside a segment (behind another vehicle) have no dwell.
        let current = current_index
            .checked_sub(1)
            .and_then(|index| self.path.get(index))
            .filter(|segment| (segment.end_distance - state.progress).abs() < BOUNDARY_EPSILON);
        let opposite = current.map_or(false, |segment| segment.is_opposite(next));
        let resume_at = if current.is_some() || next_index != current_index {
            next.start_distance
        } else {
            state.progress
        };
        let check_from = resume_at + if opposite { self.params.vehicle_length } else { 0.0 };
        let clear = self
            .blocked_distance(next_index, check_from, ACCELERATION_DEFAULT, maps)
            .is_none();
        let dwell_time = current.map_or(0, |segment| segment.dwell_time);

        let door_target = if dwell_time == 0 {
            false
        } else {
            if state.elapsed_dwell + millis < dwell_time - DOOR_MOVE_TIME - DOOR_DELAY || clear {
                state.elapsed_dwell += millis;
            }
            if state.manual {
                state.door_target
            } else {
                automatic_door_target(state.elapsed_dwell, dwell_time)
            }
        };

        let dwell_done = state.manual || state.elapsed_dwell >= dwell_time;
        let throttle = !state.manual || state.manual_notch > 0;
        if dwell_done && clear && throttle {
            state.progress = resume_at;
            if opposite {
                state.progress += self.params.vehicle_length;
                state.reversed = !state.reversed;
            }
            let departure_index = state.departure_index;
            self.start_up_state(state, departure_index);
        }
        Ok(door_target)
    }

    /// Braking and acceleration while moving. Returns the new door target.
    fn advance_moving(
        &self,
        state: &mut VehicleState,
        current_index: usize,
        millis: Millis,
        maps: &[OccupancyMap],
    ) -> SimResult<bool> {
        let continuous = self.params.transport_mode.continuous_movement();
        let acceleration = self.params.acceleration;
        let delta = millis as f64;
        let speed = state.speed;

        let safe_stopping_distance = 0.5 * speed * speed / acceleration;
        // Look far enough to cover this tick's travel as well.
        let lookahead = safe_stopping_distance + (speed + acceleration * delta) * delta;
        let stopping_point = match self.blocked_distance(current_index, state.progress, lookahead, maps) {
            Some(blocked) => state.progress + blocked,
            None if continuous => f64::INFINITY,
            None => {
                let len = self.path.len();
                self.path
                    .get(state.next_stop_index)
                    .ok_or(SimError::PathIndex {
                        index: state.next_stop_index,
                        len,
                    })?
                    .end_distance
            }
        };
        let stopping_distance = stopping_point - state.progress;

        if stopping_distance < safe_stopping_distance {
            state.speed = if stopping_distance <= 0.0 {
                ACCELERATION_DEFAULT
            } else {
                (speed - (0.5 * speed * speed / stopping_distance) * delta).max(ACCELERATION_DEFAULT)
            };
            state.manual_notch = -3;
        } else {
            if state.manual_notch < -2 {
                state.manual_notch = 0;
            }
            let step = acceleration * delta;
            if state.manual {
                state.speed = (speed + state.manual_notch as f64 * step / 2.0).clamp(0.0, self.params.max_manual_speed);
            } else {
                let rail_speed = self.rail_speed(current_index, speed);
                if speed < rail_speed {
                    state.speed = (speed + step).min(rail_speed);
                    state.manual_notch = 2;
                } else if speed > rail_speed {
                    state.speed = (speed - step).max(rail_speed);
                    state.manual_notch = -2;
                } else {
                    state.manual_notch = 0;
                }
            }
        }

        state.progress += state.speed * delta;
        if state.progress >= stopping_point {
            state.progress = stopping_point;
            state.speed = 0.0;
            state.manual_notch = -2;
        }
        if continuous {
            match self.loop_indices {
                Some(indices) if state.progress >= self.total_distance => {
                    let overshoot = state.progress - self.total_distance;
                    state.progress = self.path[indices.start].start_distance + overshoot;
                    state.next_stop_index = indices.start;
                }
                _ => state.progress = state.progress.min(self.total_distance),
            }
        }

        Ok(continuous && state.door_target)
    }

    /// Permitted speed around a path index: the lower limit of the segment
    /// and the one after it.
    fn rail_speed(&self, index: usize, speed: f64) -> f64 {
        let last = self.path.len().saturating_sub(1);
        let current = self.segment_speed(index.min(last), speed);
        let next = self.segment_speed((index + 1).min(last), speed);
        current.min(next)
    }

    fn segment_speed(&self, index: usize, speed: f64) -> f64 {
        let track = self.path[index].track;
        if track.can_accelerate {
            return track.speed_limit;
        }
        let previous = self.path[index.saturating_sub(1)].track;
        let base = if previous.can_accelerate {
            previous.speed_limit
        } else {
            self.params.transport_mode.default_speed()
        };
        base.max(speed)
    }

    /// Distance from `check_from` to the nearest track held by another
    /// vehicle within `distance`, or `None` if the stretch is free.
    fn blocked_distance(&self, start_index: usize, check_from: f64, distance: f64, maps: &[OccupancyMap]) -> Option<f64> {
        let check_to = check_from + distance;
        let mut nearest: Option<f64> = None;

        let ahead = self
            .path
            .iter()
            .skip(start_index)
            .take_while(|segment| segment.start_distance <= check_to);
        for segment in ahead {
            if !segment.intersects(check_from, check_to) {
                continue;
            }
            let (a, b) = (segment.to_local(check_from), segment.to_local(check_to));
            let (low, high) = if a <= b { (a, b) } else { (b, a) };

            for map in maps.iter().take(OccupancyHorizons::MIN_HORIZONS) {
                for span in map.spans(&segment.key) {
                    if span.vehicle == self.id || !span.intersects(low, high) {
                        continue;
                    }
                    let near_edge = if segment.reversed { span.to } else { span.from };
                    let blocked = segment.to_route(near_edge).max(check_from) - check_from;
                    nearest = Some(nearest.map_or(blocked, |current: f64| current.min(blocked)));
                }
            }
        }
        nearest
    }

    /// Spans covered by a vehicle whose head is at `progress`.
    fn claims(&self, progress: f64) -> Vec<Claim> {
        let tail = progress - self.params.vehicle_length;
        let Some(last) = self.path.len().checked_sub(1) else {
            return Vec::new();
        };

        let mut claims = Vec::new();
        for segment in self.path[..=index_at(&self.path, progress).min(last)].iter().rev() {
            let start = segment.start_distance.max(tail);
            let end = segment.end_distance.min(progress);
            if end - start > MIN_SPAN {
                claims.push(Claim {
                    key: segment.key,
                    from: segment.to_local(start),
                    to: segment.to_local(end),
                });
            }
            if tail >= segment.start_distance {
                break;
            }
        }
        claims
    }

    /// Segments the vehicle currently covers.
    pub fn occupied_segments(&self) -> Vec<SegmentKey> {
        if !self.is_on_route() {
            return Vec::new();
        }
        self.claims(self.state.progress).into_iter().map(|claim| claim.key).collect()
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            id: self.id,
            progress: self.state.progress,
            speed: self.state.speed,
            door_value: self.state.door_value,
            manual_notch: self.state.manual_notch,
            on_route: self.is_on_route(),
            departure_index: self.state.departure_index,
            occupied: self.occupied_segments(),
        }
    }
}
