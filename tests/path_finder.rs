//! Tests for incremental path search and route assembly.
//!
//! These tests verify:
//! - Termination on randomized graphs, and no path to unreachable nodes
//! - Returned paths are real chains of connections with a consistent total
//! - Heuristic-guided search over a track network
//! - Route assembly across waypoints, including failing legs

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use railyard::path::{AssemblyStatus, ConnectionDetails, ConnectionProvider, PathFinder, RouteAssembler, SearchStatus};
use railyard::{Millis, Position, Track, TrackNetwork};

// ============================================================================
// Test Graph
// ============================================================================

/// Directed graph with weighted edges and no heuristic.
struct Graph {
    edges: HashMap<u32, Vec<(u32, Millis)>>,
}

impl Graph {
    fn random(rng: &mut StdRng, nodes: u32, edge_count: usize) -> Self {
        let mut edges: HashMap<u32, Vec<(u32, Millis)>> = HashMap::new();
        for _ in 0..edge_count {
            let from = rng.gen_range(0..nodes);
            let to = rng.gen_range(0..nodes);
            if from != to {
                edges.entry(from).or_default().push((to, rng.gen_range(1..50)));
            }
        }
        Self { edges }
    }

    fn has_edge(&self, from: u32, to: u32, duration: Millis) -> bool {
        self.edges
            .get(&from)
            .map_or(false, |edges| edges.contains(&(to, duration)))
    }

    fn reachable(&self, start: u32) -> HashSet<u32> {
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &(to, _) in self.edges.get(&node).into_iter().flatten() {
                if seen.insert(to) {
                    queue.push_back(to);
                }
            }
        }
        seen
    }

    fn shortest(&self, start: u32, end: u32) -> Option<Millis> {
        let mut best: HashMap<u32, Millis> = HashMap::from([(start, 0)]);
        let mut heap = BinaryHeap::from([Reverse((0, start))]);
        while let Some(Reverse((time, node))) = heap.pop() {
            if node == end {
                return Some(time);
            }
            if best.get(&node).map_or(false, |&known| known < time) {
                continue;
            }
            for &(to, duration) in self.edges.get(&node).into_iter().flatten() {
                let arrival = time + duration;
                if best.get(&to).map_or(true, |&known| arrival < known) {
                    best.insert(to, arrival);
                    heap.push(Reverse((arrival, to)));
                }
            }
        }
        None
    }
}

impl ConnectionProvider<u32> for Graph {
    fn connections(&self, node: &u32) -> Vec<ConnectionDetails<u32>> {
        self.edges
            .get(node)
            .map(|edges| {
                edges
                    .iter()
                    .map(|&(to, duration)| ConnectionDetails::new(to, duration, 0, 0))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn heuristic_weight(&self, _node: &u32, _end: &u32) -> i64 {
        0
    }
}

fn p(x: i64, z: i64) -> Position {
    Position::new(x, 0, z)
}

/// Square grid of positions 100 m apart, connected both ways.
fn grid(size: i64) -> TrackNetwork {
    let mut network = TrackNetwork::new();
    let track = Track::new(0.02, true);
    for x in 0..size {
        for z in 0..size {
            if x + 1 < size {
                network.add_track(p(x * 100, z * 100), p((x + 1) * 100, z * 100), None, track, true);
            }
            if z + 1 < size {
                network.add_track(p(x * 100, z * 100), p(x * 100, (z + 1) * 100), None, track, true);
            }
        }
    }
    network
}

// ============================================================================
// PathFinder Tests
// ============================================================================

#[test]
fn test_random_graphs_terminate_with_valid_paths() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..40 {
        let graph = Graph::random(&mut rng, 10, 25);
        let reachable = graph.reachable(0);

        for end in 1..10 {
            let mut finder = PathFinder::new(0, end);
            let mut status = SearchStatus::Pending;
            for _ in 0..1_000_000 {
                status = finder.step(&graph);
                if !status.is_pending() {
                    break;
                }
            }
            assert!(finder.is_completed(), "search 0 -> {} did not terminate", end);
            if !reachable.contains(&end) {
                assert_eq!(status, SearchStatus::NotFound);
            }

            match status {
                SearchStatus::Found(path) => {
                    assert!(reachable.contains(&end));
                    let mut previous = 0;
                    let mut total = 0;
                    for connection in &path {
                        assert!(graph.has_edge(previous, connection.node, connection.duration));
                        previous = connection.node;
                        total += connection.total_duration();
                    }
                    assert_eq!(previous, end);
                    assert_eq!(finder.best_time(), Some(total));
                    assert!(total >= graph.shortest(0, end).unwrap());
                }
                SearchStatus::NotFound => {
                    assert_eq!(finder.best_time(), None);
                }
                SearchStatus::Pending => unreachable!(),
            }
        }
    }
}

#[test]
fn test_single_route_graphs_find_the_only_path() {
    // A chain 0 -> 1 -> ... -> 7 with dead-end spurs off every node.
    let mut edges: HashMap<u32, Vec<(u32, Millis)>> = HashMap::new();
    for node in 0..7 {
        edges.entry(node).or_default().push((100 + node, 3));
        edges.entry(node).or_default().push((node + 1, 10));
    }
    let graph = Graph { edges };

    let mut finder = PathFinder::new(0, 7);
    match finder.solve(&graph) {
        SearchStatus::Found(path) => {
            let nodes: Vec<u32> = path.iter().map(|c| c.node).collect();
            assert_eq!(nodes, (1..=7).collect::<Vec<_>>());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(finder.best_time(), Some(70));
}

#[test]
fn test_grid_search_reaches_corner() {
    let network = grid(5);
    let start = p(0, 0);
    let end = p(400, 400);

    let mut finder = PathFinder::new(start, end);
    match finder.solve(&network) {
        SearchStatus::Found(path) => {
            assert_eq!(path.last().map(|c| c.node), Some(end));
            // Eight 100 m hops at least, 5000 ms each
            assert!(path.len() >= 8);
            assert!(finder.best_time().unwrap() >= 8 * 5000);

            let segments = network
                .segments_for(start, &path, 0.0, railyard::TransportMode::Train)
                .unwrap();
            assert_eq!(segments.len(), path.len());
            assert!(railyard::path::validate_path(&segments).is_ok());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_search_is_spread_over_steps() {
    let network = grid(4);
    let mut finder = PathFinder::new(p(0, 0), p(300, 300));

    assert!(finder.step(&network).is_pending());
    assert!(!finder.is_completed());
    let status = finder.solve(&network);
    assert!(matches!(status, SearchStatus::Found(_)));
    assert!(finder.steps() > 1);
}

// ============================================================================
// RouteAssembler Tests
// ============================================================================

#[test]
fn test_assembler_joins_legs_in_order() {
    let network = grid(4);
    let waypoints = [p(0, 0), p(300, 0), p(300, 0), p(300, 300)];

    let mut assembler = RouteAssembler::new(waypoints, 2);
    assert_eq!(assembler.leg_count(), 2);

    let mut ticks = 0;
    let legs = loop {
        ticks += 1;
        match assembler.tick(&network) {
            AssemblyStatus::InProgress => {}
            AssemblyStatus::Complete(legs) => break legs,
            AssemblyStatus::Failed { leg } => panic!("leg {} failed", leg),
        }
        assert!(ticks < 10_000);
    };

    assert!(ticks > 1);
    assert!(legs.iter().any(|c| c.node == p(300, 0)));
    assert_eq!(legs.last().map(|c| c.node), Some(p(300, 300)));
    assert!(assembler.steps_taken() <= ticks * 2);
}

#[test]
fn test_assembler_reports_failing_leg() {
    let network = grid(3);
    let mut assembler = RouteAssembler::new([p(0, 0), p(200, 200), p(900, 900)], 8);
    assert_eq!(assembler.solve(&network), AssemblyStatus::Failed { leg: 1 });
}

#[test]
fn test_assembler_single_waypoint_is_complete() {
    let network = grid(2);
    let mut assembler = RouteAssembler::new([p(0, 0)], 8);
    assert_eq!(assembler.leg_count(), 0);
    assert_eq!(assembler.tick(&network), AssemblyStatus::Complete(Vec::new()));
}
