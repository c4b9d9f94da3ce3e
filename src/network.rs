//! Track topology.
//!
//! A [`TrackNetwork`] is a directed graph of tracks between integer
//! positions. It feeds the path finder through [`ConnectionProvider`] and
//! turns the legs it finds back into [`PathSegment`]s with stop dwell times
//! applied.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{SimError, SimResult};
use crate::path::{ConnectionDetails, ConnectionProvider, PathSegment, Track};
use crate::types::{Millis, Position, RouteId, SegmentKey, TransportMode};

/// A directed link from one position to another.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackLink {
    pub to: Position,
    /// Length in meters
    pub length: f64,
    pub track: Track,
    pub route_id: RouteId,
}

impl TrackLink {
    /// Minimum traversal time at the speed limit, never below 1 ms.
    pub fn duration(&self) -> Millis {
        if self.track.speed_limit <= 0.0 {
            return Millis::MAX / 4;
        }
        ((self.length / self.track.speed_limit).ceil() as Millis).max(1)
    }
}

/// Directed track graph with platform stops.
#[derive(Clone, Debug, Default)]
pub struct TrackNetwork {
    links: HashMap<Position, Vec<TrackLink>>,
    platforms: HashMap<SegmentKey, Millis>,
    max_speed: f64,
}

impl TrackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a track. The length defaults to the straight-line distance.
    ///
    /// # Arguments
    /// * `from` - Position the track leaves
    /// * `to` - Position the track reaches
    /// * `length` - Track length in meters, if it differs from the distance
    /// * `track` - Speed limit and acceleration flag
    /// * `bidirectional` - Also add the link from `to` back to `from`
    pub fn add_track(
        &mut self,
        from: Position,
        to: Position,
        length: Option<f64>,
        track: Track,
        bidirectional: bool,
    ) {
        let length = length.unwrap_or_else(|| from.distance(&to));
        self.add_link(from, to, length, track);
        if bidirectional {
            self.add_link(to, from, length, track);
        }
        self.max_speed = self.max_speed.max(track.speed_limit);
    }

    fn add_link(&mut self, from: Position, to: Position, length: f64, track: Track) {
        let route_id = self.track_count() as RouteId;
        let links = self.links.entry(from).or_default();
        links.retain(|link| link.to != to);
        links.push(TrackLink {
            to,
            length,
            track,
            route_id,
        });
    }

    /// Marks a track as a platform where vehicles stand for `dwell_time`.
    pub fn add_platform(&mut self, a: Position, b: Position, dwell_time: Millis) {
        self.platforms.insert(SegmentKey::new(a, b), dwell_time);
    }

    /// Dwell time at the end of a segment. Continuous-movement modes stop
    /// for 1 ms; others for at least 1 ms.
    pub fn dwell_time(&self, key: &SegmentKey, mode: TransportMode) -> Millis {
        match self.platforms.get(key) {
            None => 0,
            Some(_) if mode.continuous_movement() => 1,
            Some(&dwell_time) => dwell_time.max(1),
        }
    }

    pub fn link(&self, from: &Position, to: &Position) -> Option<&TrackLink> {
        self.links.get(from)?.iter().find(|link| link.to == *to)
    }

    /// Number of directed links.
    pub fn track_count(&self) -> usize {
        self.links.values().map(Vec::len).sum()
    }

    pub fn platform_count(&self) -> usize {
        self.platforms.len()
    }

    /// Converts found legs into contiguous path segments.
    ///
    /// # Arguments
    /// * `start` - Position the first leg leaves from
    /// * `legs` - Connections returned by the path finder, in order
    /// * `start_distance` - Route distance of the first segment
    /// * `mode` - Transport mode, for platform dwell times
    pub fn segments_for(
        &self,
        start: Position,
        legs: &[ConnectionDetails<Position>],
        start_distance: f64,
        mode: TransportMode,
    ) -> SimResult<Vec<PathSegment>> {
        let mut segments = Vec::with_capacity(legs.len());
        let mut from = start;
        let mut distance = start_distance;

        for leg in legs {
            let link = self.link(&from, &leg.node).ok_or(SimError::MissingTrack {
                from,
                to: leg.node,
            })?;
            let dwell_time = self.dwell_time(&SegmentKey::new(from, leg.node), mode);
            segments.push(PathSegment::new(
                distance,
                distance + link.length,
                from,
                leg.node,
                dwell_time,
                link.track,
            ));
            distance += link.length;
            from = leg.node;
        }
        Ok(segments)
    }
}

impl ConnectionProvider<Position> for TrackNetwork {
    fn connections(&self, node: &Position) -> Vec<ConnectionDetails<Position>> {
        self.links
            .get(node)
            .map(|links| {
                links
                    .iter()
                    .map(|link| ConnectionDetails::new(link.to, link.duration(), 0, link.route_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn heuristic_weight(&self, node: &Position, end: &Position) -> i64 {
        if self.max_speed <= 0.0 {
            return 0;
        }
        (node.distance(end) / self.max_speed) as i64
    }
}
