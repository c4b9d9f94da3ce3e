//! Tests for vehicle motion over several ticks.
//!
//! These tests verify:
//! - Braking for an obstruction never runs into it
//! - A follower keeps a vehicle length behind its leader
//! - Doors open at a stop and close before departure
//! - Progress stays within the path, including repeating routes

use std::sync::Arc;

use railyard::path::{PathSegment, Track};
use railyard::vehicle::LoopIndices;
use railyard::{OccupancyHorizons, Position, SegmentKey, TransportMode, Vehicle, VehicleParams, VehicleState};

// ============================================================================
// Helpers
// ============================================================================

fn p(x: i64) -> Position {
    Position::new(x, 0, 0)
}

fn track() -> Track {
    Track::new(0.02, true)
}

/// Siding 0..40 followed by a straight run to `end`, with an optional stop.
fn straight(end: i64, dwell_time: i64) -> Arc<[PathSegment]> {
    vec![
        PathSegment::new(0.0, 40.0, p(0), p(40), 0, track()),
        PathSegment::new(40.0, end as f64, p(40), p(end), dwell_time, track()),
    ]
    .into()
}

/// Siding 0..40, a platform ending at 1040 and a run on to 2040.
fn with_platform() -> Arc<[PathSegment]> {
    vec![
        PathSegment::new(0.0, 40.0, p(0), p(40), 0, track()),
        PathSegment::new(40.0, 1040.0, p(40), p(1040), 10_000, track()),
        PathSegment::new(1040.0, 2040.0, p(1040), p(2040), 0, track()),
    ]
    .into()
}

// ============================================================================
// Braking Tests
// ============================================================================

#[test]
fn test_brakes_before_obstruction() {
    let mut horizons = OccupancyHorizons::default();
    let mut vehicle = Vehicle::new(1, VehicleParams::default(), straight(5040, 10_000), None);
    vehicle.restore(VehicleState {
        progress: 500.0,
        speed: 0.02,
        next_stop_index: 1,
        departure_index: Some(0),
        ..VehicleState::default()
    });

    let blocker = SegmentKey::new(p(40), p(5040));
    let mut previous = vehicle.state().progress;
    let mut stopped = false;

    for _ in 0..20_000 {
        horizons.rotate();
        // Route distance 1040..1060 held by another vehicle
        horizons.next_mut().claim(blocker, 99, 1000.0, 1020.0);
        vehicle.tick(10, &mut horizons).unwrap();

        let progress = vehicle.state().progress;
        assert!(progress >= previous, "moved backwards from {} to {}", previous, progress);
        assert!(progress <= 1040.0 + 1e-6, "ran into obstruction at {}", progress);
        previous = progress;

        if vehicle.state().speed == 0.0 {
            stopped = true;
            break;
        }
    }

    assert!(stopped);
    assert!(vehicle.state().progress > 1030.0);

    // Stays put while the obstruction remains
    for _ in 0..100 {
        horizons.rotate();
        horizons.next_mut().claim(blocker, 99, 1000.0, 1020.0);
        vehicle.tick(10, &mut horizons).unwrap();
        assert!(vehicle.state().progress <= 1040.0 + 1e-6);
    }
}

#[test]
fn test_stops_for_obstruction_at_safe_distance() {
    let mut horizons = OccupancyHorizons::default();
    let params = VehicleParams::default();
    let speed = 0.02;
    let safe_distance = 0.5 * speed * speed / params.acceleration;
    assert!((safe_distance - 50.0).abs() < 1e-9);

    let mut vehicle = Vehicle::new(1, params, straight(5040, 10_000), None);
    vehicle.restore(VehicleState {
        progress: 500.0,
        speed,
        next_stop_index: 1,
        departure_index: Some(0),
        ..VehicleState::default()
    });

    let blocker = SegmentKey::new(p(40), p(5040));
    let mut stopped = false;
    for _ in 0..20_000 {
        horizons.rotate();
        // Route distance 550..570 held by another vehicle
        horizons.next_mut().claim(blocker, 99, 510.0, 530.0);
        vehicle.tick(10, &mut horizons).unwrap();

        let progress = vehicle.state().progress;
        assert!(progress <= 550.0 + 1e-6, "passed obstruction at {}", progress);
        if vehicle.state().speed == 0.0 {
            stopped = true;
            break;
        }
    }

    assert!(stopped);
    assert!(vehicle.state().progress <= 550.0 + 1e-6);
}

#[test]
fn test_follower_keeps_distance() {
    let path = with_platform();
    let mut horizons = OccupancyHorizons::default();

    let mut leader = Vehicle::new(1, VehicleParams::default(), Arc::clone(&path), None);
    leader.restore(VehicleState {
        progress: 200.0,
        speed: 0.01,
        next_stop_index: 1,
        departure_index: Some(0),
        ..VehicleState::default()
    });
    let mut follower = Vehicle::new(2, VehicleParams::default(), path, None);
    follower.start_up(Some(1));

    let length = follower.params().vehicle_length;
    let mut follower_max = 0.0_f64;

    for _ in 0..20_000 {
        horizons.rotate();
        leader.tick(10, &mut horizons).unwrap();
        follower.tick(10, &mut horizons).unwrap();

        let (lead, follow) = (leader.state().progress, follower.state().progress);
        if leader.is_on_route() && follower.is_on_route() && follow < lead {
            assert!(
                follow <= lead - length + 1e-6,
                "follower at {} overlaps leader at {}",
                follow,
                lead
            );
        }
        follower_max = follower_max.max(follow);
    }

    assert!(follower_max > 1040.0);
    assert!(!leader.is_on_route());
    assert!(!follower.is_on_route());
}

// ============================================================================
// Door Tests
// ============================================================================

#[test]
fn test_doors_cycle_at_stop() {
    let mut horizons = OccupancyHorizons::default();
    let mut vehicle = Vehicle::new(1, VehicleParams::default(), with_platform(), None);
    vehicle.restore(VehicleState {
        progress: 1040.0,
        next_stop_index: 1,
        departure_index: Some(0),
        ..VehicleState::default()
    });

    for _ in 0..19 {
        vehicle.tick(1, &mut horizons).unwrap();
    }
    assert_eq!(vehicle.state().door_value, 0.0);

    for _ in 19..84 {
        vehicle.tick(1, &mut horizons).unwrap();
    }
    assert_eq!(vehicle.state().door_value, 1.0);
    assert!(vehicle.state().door_target);

    let mut departed = false;
    for _ in 0..400 {
        vehicle.tick(50, &mut horizons).unwrap();
        if vehicle.state().speed > 0.0 {
            departed = true;
            break;
        }
    }
    assert!(departed);
    assert_eq!(vehicle.state().door_value, 0.0);
    assert!(vehicle.state().progress > 1040.0);
}

// ============================================================================
// Path Bounds Tests
// ============================================================================

#[test]
fn test_progress_never_exceeds_path() {
    let mut horizons = OccupancyHorizons::default();
    let mut vehicle = Vehicle::new(1, VehicleParams::default(), straight(1040, 0), None);
    vehicle.start_up(Some(0));

    let mut returned = false;
    for _ in 0..10_000 {
        horizons.rotate();
        vehicle.tick(20, &mut horizons).unwrap();
        assert!(vehicle.state().progress <= vehicle.total_distance());
        if !vehicle.is_on_route() {
            returned = true;
            break;
        }
    }

    assert!(returned);
    assert_eq!(vehicle.state().progress, vehicle.default_position());
}

#[test]
fn test_repeating_route_wraps() {
    let path: Arc<[PathSegment]> = vec![
        PathSegment::new(0.0, 40.0, p(0), p(40), 0, track()),
        PathSegment::new(40.0, 1040.0, p(40), p(1040), 1, track()),
        PathSegment::new(1040.0, 2040.0, p(1040), p(2040), 1, track()),
        PathSegment::new(2040.0, 3040.0, p(40), p(1040), 1, track()),
    ]
    .into();
    let params = VehicleParams {
        transport_mode: TransportMode::CableCar,
        ..VehicleParams::default()
    };
    let mut vehicle = Vehicle::new(1, params, path, Some(LoopIndices { start: 1, end: 3 }));
    vehicle.start_up(Some(0));

    let mut previous = vehicle.state().progress;
    let mut wrapped = false;
    for _ in 0..4000 {
        horizons_tick(&mut vehicle);
        let progress = vehicle.state().progress;
        assert!(progress <= vehicle.total_distance());
        assert!(vehicle.is_on_route());
        assert!(vehicle.state().speed > 0.0);
        if progress < previous {
            wrapped = true;
            assert!(progress >= 40.0);
        }
        previous = progress;
    }
    assert!(wrapped);
}

fn horizons_tick(vehicle: &mut Vehicle) {
    let mut horizons = OccupancyHorizons::default();
    vehicle.tick(100, &mut horizons).unwrap();
}
