//! Departure scheduling.
//!
//! Turns sparse depot settings into departure offsets and hands them out
//! to sidings. Offsets are real milliseconds into the game-day cycle.
//!
//! # Modes
//!
//! - **Continuous movement**: offsets `0, STRIDE, 2·STRIDE, ...` while below
//!   the vehicle count, with `STRIDE` = [`CONTINUOUS_MOVEMENT_STRIDE`].
//! - **Real time**: offsets configured by hand, copied verbatim.
//! - **Frequency**: per-hour departure counts, spread over each hour in game
//!   time and rescaled to real time.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{Millis, SidingId, HOURS_PER_DAY, MILLIS_PER_DAY, MILLIS_PER_HOUR};

/// Spacing of continuous-movement departures.
pub const CONTINUOUS_MOVEMENT_STRIDE: Millis = 8000;

/// Game time divided by this and the hourly frequency gives the spacing.
pub const FREQUENCY_WINDOW: Millis = 14_400_000;

/// How game time maps to real time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeScale {
    /// Real milliseconds in one game day
    pub millis_per_game_day: Millis,
    /// Fraction of the game day elapsed at `start_millis`
    pub starting_game_day_percentage: f64,
    /// Real clock at simulation start
    pub start_millis: Millis,
}

impl Default for TimeScale {
    fn default() -> Self {
        Self {
            millis_per_game_day: 1_200_000,
            starting_game_day_percentage: 0.0,
            start_millis: 0,
        }
    }
}

impl TimeScale {
    /// Game milliseconds per real millisecond.
    pub fn time_ratio(&self) -> f64 {
        MILLIS_PER_DAY as f64 / self.millis_per_game_day.max(1) as f64
    }

    /// Real offset of game time zero within the current game-day cycle.
    pub fn offset_millis(&self) -> Millis {
        let day = self.millis_per_game_day.max(1);
        let into_day = self.start_millis.rem_euclid(day);
        let offset = into_day as f64 - self.starting_game_day_percentage * day as f64;
        offset.max(0.0) as Millis
    }

    /// Converts a game-day time into a real offset.
    pub fn to_real(&self, game_millis: Millis) -> Millis {
        self.offset_millis() + (game_millis as f64 / self.time_ratio()).round() as Millis
    }
}

/// Where departures come from.
#[derive(Clone, Copy, Debug)]
pub enum DepartureSource<'a> {
    /// Multiples of the continuous stride below the vehicle count
    Continuous { vehicle_count: usize },
    /// Fixed real-time offsets
    RealTime(&'a [Millis]),
    /// Departures per hour, for each game hour
    Frequency(&'a [u32; HOURS_PER_DAY]),
}

/// Generates the departure offsets of a depot, in generation order.
pub fn generate_departures(source: DepartureSource<'_>, scale: &TimeScale) -> Vec<Millis> {
    match source {
        DepartureSource::Continuous { vehicle_count } => (0..vehicle_count as Millis)
            .step_by(CONTINUOUS_MOVEMENT_STRIDE as usize)
            .collect(),
        DepartureSource::RealTime(offsets) => offsets.to_vec(),
        DepartureSource::Frequency(frequencies) => frequency_departures(frequencies)
            .into_iter()
            .map(|game_millis| scale.to_real(game_millis))
            .collect(),
    }
}

/// Game-time departures for hourly frequencies.
///
/// Each hour with a non-zero frequency continues from the previous
/// departure at `FREQUENCY_WINDOW / frequency`, starting no earlier than the
/// hour itself, while still inside the hour.
pub fn frequency_departures(frequencies: &[u32; HOURS_PER_DAY]) -> Vec<Millis> {
    let mut departures: Vec<Millis> = Vec::new();
    for (hour, &frequency) in frequencies.iter().enumerate() {
        if frequency == 0 {
            continue;
        }
        let interval = FREQUENCY_WINDOW / frequency as Millis;
        let hour_start = MILLIS_PER_HOUR * hour as Millis;
        let hour_end = hour_start + MILLIS_PER_HOUR;

        loop {
            let next = departures
                .last()
                .map_or(hour_start, |&last| hour_start.max(last + interval));
            if next >= hour_end {
                break;
            }
            departures.push(next);
        }
    }
    departures
}

/// Receives departures during assignment.
pub trait DepartureSink {
    fn id(&self) -> SidingId;

    /// Clears the departures from a previous assignment.
    fn start_generating_departures(&mut self);

    /// Offers a departure. Returns false to reject it.
    fn add_departure(&mut self, departure: Millis) -> bool;
}

/// Hands departures to sinks round-robin.
///
/// The sinks are shuffled, then stable-sorted by id. The round-robin
/// pointer advances by one only when a departure is accepted; a rejecting
/// sink is skipped for that departure. A departure every sink rejects is
/// dropped. Returns the number of departures accepted.
pub fn assign_departures<S, R>(departures: &[Millis], sinks: &mut [S], rng: &mut R) -> usize
where
    S: DepartureSink,
    R: Rng + ?Sized,
{
    if sinks.is_empty() {
        return 0;
    }

    sinks.shuffle(rng);
    sinks.sort_by_key(|sink| sink.id());
    for sink in sinks.iter_mut() {
        sink.start_generating_departures();
    }

    let count = sinks.len();
    let mut pointer = 0;
    let mut accepted = 0;
    for &departure in departures {
        let taken = (0..count).any(|offset| sinks[(pointer + offset) % count].add_departure(departure));
        if taken {
            pointer += 1;
            accepted += 1;
        } else {
            tracing::debug!(departure, "Departure rejected by every siding");
        }
    }
    accepted
}

/// Signed distance from `a` to `b` on a cycle of length `period`, in
/// `(-period/2, period/2]`.
pub fn cyclic_difference(a: Millis, b: Millis, period: Millis) -> Millis {
    if period <= 0 {
        return b - a;
    }
    let difference = (b - a).rem_euclid(period);
    if difference > period / 2 {
        difference - period
    } else {
        difference
    }
}
