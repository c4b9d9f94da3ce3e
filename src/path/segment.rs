//! Path segments: the legs a vehicle route is made of.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::types::{Millis, Position, SegmentKey};

/// Physical track metadata shared by every path crossing the track.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Speed limit in m/ms
    pub speed_limit: f64,
    /// Whether vehicles may accelerate up to the limit on this track
    pub can_accelerate: bool,
}

impl Track {
    pub fn new(speed_limit: f64, can_accelerate: bool) -> Self {
        Self {
            speed_limit,
            can_accelerate,
        }
    }
}

/// One leg of a vehicle route.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathSegment {
    /// Route distance at which the segment starts
    pub start_distance: f64,
    /// Route distance at which the segment ends
    pub end_distance: f64,
    /// Canonical identity of the track
    pub key: SegmentKey,
    /// True when travelled from `key.end` to `key.start`
    pub reversed: bool,
    /// Time to stand at the end of this segment
    pub dwell_time: Millis,
    pub track: Track,
}

impl PathSegment {
    /// Creates a segment travelled from `from` to `to`.
    pub fn new(
        start_distance: f64,
        end_distance: f64,
        from: Position,
        to: Position,
        dwell_time: Millis,
        track: Track,
    ) -> Self {
        let key = SegmentKey::new(from, to);
        Self {
            start_distance,
            end_distance,
            key,
            reversed: key.is_reversed_from(from),
            dwell_time,
            track,
        }
    }

    pub fn length(&self) -> f64 {
        self.end_distance - self.start_distance
    }

    /// Same track, travelled the other way.
    pub fn is_opposite(&self, other: &PathSegment) -> bool {
        self.key == other.key && self.reversed != other.reversed
    }

    /// Converts a route distance into a coordinate measured from `key.start`.
    pub fn to_local(&self, distance: f64) -> f64 {
        if self.reversed {
            self.end_distance - distance
        } else {
            distance - self.start_distance
        }
    }

    /// Converts a coordinate measured from `key.start` into a route distance.
    pub fn to_route(&self, local: f64) -> f64 {
        if self.reversed {
            self.end_distance - local
        } else {
            self.start_distance + local
        }
    }

    /// Copy of this segment shifted to start at `start_distance`.
    pub fn shifted_to(&self, start_distance: f64) -> Self {
        Self {
            start_distance,
            end_distance: start_distance + self.length(),
            ..*self
        }
    }

    /// Returns true if the segment overlaps the closed interval `[from, to]`.
    pub fn intersects(&self, from: f64, to: f64) -> bool {
        self.start_distance <= to && from <= self.end_distance
    }
}

/// Index of the segment containing `distance`.
///
/// A distance exactly on a boundary belongs to the following segment. The
/// result equals `path.len()` past the last segment.
pub fn index_at(path: &[PathSegment], distance: f64) -> usize {
    path.partition_point(|segment| segment.end_distance <= distance)
}

/// Checks that distances are finite, non-decreasing and contiguous.
pub fn validate_path(path: &[PathSegment]) -> SimResult<()> {
    if path.is_empty() {
        return Err(SimError::EmptyPath);
    }
    for (index, segment) in path.iter().enumerate() {
        if !segment.start_distance.is_finite() || !segment.end_distance.is_finite() {
            return Err(SimError::MalformedSegment {
                index,
                reason: "non-finite distance".to_string(),
            });
        }
        if segment.end_distance < segment.start_distance {
            return Err(SimError::MalformedSegment {
                index,
                reason: "end before start".to_string(),
            });
        }
        if index > 0 && (segment.start_distance - path[index - 1].end_distance).abs() > 1e-6 {
            return Err(SimError::MalformedSegment {
                index,
                reason: "gap to previous segment".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64, from: i64, to: i64) -> PathSegment {
        PathSegment::new(
            start,
            end,
            Position::new(from, 0, 0),
            Position::new(to, 0, 0),
            0,
            Track::new(0.02, true),
        )
    }

    #[test]
    fn test_index_at_boundaries() {
        let path = vec![segment(0.0, 10.0, 0, 10), segment(10.0, 30.0, 10, 30)];
        assert_eq!(index_at(&path, 0.0), 0);
        assert_eq!(index_at(&path, 5.0), 0);
        assert_eq!(index_at(&path, 10.0), 1);
        assert_eq!(index_at(&path, 29.0), 1);
        assert_eq!(index_at(&path, 30.0), 2);
    }

    #[test]
    fn test_local_coordinates() {
        let forward = segment(100.0, 110.0, 0, 10);
        assert!(!forward.reversed);
        assert_eq!(forward.to_local(104.0), 4.0);
        assert_eq!(forward.to_route(4.0), 104.0);

        let backward = segment(100.0, 110.0, 10, 0);
        assert!(backward.reversed);
        assert_eq!(backward.to_local(104.0), 6.0);
        assert_eq!(backward.to_route(6.0), 104.0);
        assert!(forward.is_opposite(&backward));
    }

    #[test]
    fn test_validate_path() {
        assert_eq!(validate_path(&[]), Err(SimError::EmptyPath));
        let gap = vec![segment(0.0, 10.0, 0, 10), segment(12.0, 20.0, 10, 18)];
        assert!(matches!(
            validate_path(&gap),
            Err(SimError::MalformedSegment { index: 1, .. })
        ));
        let ok = vec![segment(0.0, 10.0, 0, 10), segment(10.0, 20.0, 10, 20)];
        assert!(validate_path(&ok).is_ok());
    }
}
