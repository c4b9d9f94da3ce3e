//! Incremental best-first path search.
//!
//! A [`PathFinder`] searches for the minimum-total-time path between two
//! nodes, advancing by exactly one edge per [`PathFinder::step`] so the
//! search can be spread across simulation ticks.
//!
//! # Search rules
//!
//! Each step extends a temporary path from its last node. Among the
//! candidate connections, the one with the largest heuristic decrease per
//! unit of time wins (the first one on ties). A candidate is rejected when:
//!
//! - taking it would meet or exceed the best total time found so far,
//! - it was already reached at an equal or lower time in the current branch
//!   (local blacklist),
//! - it was already reached at a strictly lower time in any branch (global
//!   blacklist, never cleared).
//!
//! With no viable candidate the last step is dropped. When the temporary
//! path is already empty the search is complete. Reaching the end node
//! records the path if it beats the best so far and restarts from the start
//! node with a fresh local blacklist.
//!
//! # Example
//!
//! ```
//! use railyard::path::{ConnectionDetails, ConnectionProvider, PathFinder, SearchStatus};
//!
//! struct Line;
//!
//! impl ConnectionProvider<u32> for Line {
//!     fn connections(&self, node: &u32) -> Vec<ConnectionDetails<u32>> {
//!         if *node < 3 {
//!             vec![ConnectionDetails::new(node + 1, 10, 0, 1)]
//!         } else {
//!             Vec::new()
//!         }
//!     }
//!
//!     fn heuristic_weight(&self, node: &u32, end: &u32) -> i64 {
//!         (*end as i64 - *node as i64).abs() * 10
//!     }
//! }
//!
//! let mut finder = PathFinder::new(0, 3);
//! match finder.solve(&Line) {
//!     SearchStatus::Found(path) => assert_eq!(path.len(), 3),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

use std::collections::HashMap;
use std::hash::Hash;

use crate::types::{Millis, RouteId};

/// One candidate edge out of a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionDetails<N> {
    /// Destination node
    pub node: N,
    /// Traversal time
    pub duration: Millis,
    /// Additional waiting time before the traversal
    pub waiting_time: Millis,
    /// Route the connection belongs to
    pub route_id: RouteId,
}

impl<N> ConnectionDetails<N> {
    pub fn new(node: N, duration: Millis, waiting_time: Millis, route_id: RouteId) -> Self {
        Self {
            node,
            duration,
            waiting_time,
            route_id,
        }
    }

    /// Duration plus waiting time.
    pub fn total_duration(&self) -> Millis {
        self.duration.saturating_add(self.waiting_time)
    }
}

/// Supplies the search graph.
pub trait ConnectionProvider<N> {
    /// Returns the outgoing connections of a node, in preference order.
    fn connections(&self, node: &N) -> Vec<ConnectionDetails<N>>;

    /// Lower-bound estimate of the time still needed from `node` to `end`.
    /// Larger is farther.
    fn heuristic_weight(&self, node: &N, end: &N) -> i64;
}

/// Outcome of a search step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchStatus<N> {
    /// The search needs more steps.
    Pending,
    /// The search is complete; the best path found (empty if start == end).
    Found(Vec<ConnectionDetails<N>>),
    /// The search space is exhausted without reaching the end node.
    NotFound,
}

impl<N> SearchStatus<N> {
    pub fn is_pending(&self) -> bool {
        matches!(self, SearchStatus::Pending)
    }
}

/// Incremental path search between two nodes.
#[derive(Debug)]
pub struct PathFinder<N> {
    start: N,
    end: N,
    total_time: Millis,
    completed: bool,
    global_blacklist: HashMap<N, Millis>,
    local_blacklist: HashMap<N, Millis>,
    temp_path: Vec<ConnectionDetails<N>>,
    best_path: Vec<ConnectionDetails<N>>,
    steps: u64,
}

impl<N: Clone + Eq + Hash> PathFinder<N> {
    /// Creates a new search. A search whose start equals its end is
    /// complete from the outset.
    pub fn new(start: N, end: N) -> Self {
        let completed = start == end;
        Self {
            start,
            end,
            total_time: Millis::MAX,
            completed,
            global_blacklist: HashMap::new(),
            local_blacklist: HashMap::new(),
            temp_path: Vec::new(),
            best_path: Vec::new(),
            steps: 0,
        }
    }

    pub fn start(&self) -> &N {
        &self.start
    }

    pub fn end(&self) -> &N {
        &self.end
    }

    /// Returns true once the search can make no further progress.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Total time of the best path found so far.
    pub fn best_time(&self) -> Option<Millis> {
        (self.total_time != Millis::MAX).then_some(self.total_time)
    }

    /// Number of steps taken.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Performs one search step.
    pub fn step<P>(&mut self, provider: &P) -> SearchStatus<N>
    where
        P: ConnectionProvider<N> + ?Sized,
    {
        if !self.completed {
            self.steps += 1;
            self.extend(provider);
        }
        self.status()
    }

    /// Runs steps until the search completes.
    pub fn solve<P>(&mut self, provider: &P) -> SearchStatus<N>
    where
        P: ConnectionProvider<N> + ?Sized,
    {
        loop {
            let status = self.step(provider);
            if !status.is_pending() {
                return status;
            }
        }
    }

    /// Current status without stepping.
    pub fn status(&self) -> SearchStatus<N> {
        if !self.completed {
            SearchStatus::Pending
        } else if self.start == self.end || !self.best_path.is_empty() {
            SearchStatus::Found(self.best_path.clone())
        } else {
            SearchStatus::NotFound
        }
    }

    fn extend<P>(&mut self, provider: &P)
    where
        P: ConnectionProvider<N> + ?Sized,
    {
        // Waiting counts only on the edge being taken, not on earlier edges
        let elapsed = self
            .temp_path
            .iter()
            .fold(0 as Millis, |sum, c| sum.saturating_add(c.duration));
        let prev_node = self
            .temp_path
            .last()
            .map(|c| c.node.clone())
            .unwrap_or_else(|| self.start.clone());
        let prev_weight = provider.heuristic_weight(&prev_node, &self.end);

        let mut best: Option<ConnectionDetails<N>> = None;
        let mut best_increase = i64::MIN;

        for candidate in provider.connections(&prev_node) {
            let candidate_duration = candidate.total_duration();
            if candidate_duration <= 0 {
                continue;
            }
            let arrival = elapsed.saturating_add(candidate_duration);
            if !self.verify_time(&candidate.node, arrival) {
                continue;
            }

            let increase =
                (prev_weight - provider.heuristic_weight(&candidate.node, &self.end)) / candidate_duration;
            self.global_blacklist.insert(candidate.node.clone(), arrival);
            if increase > best_increase {
                best_increase = increase;
                best = Some(candidate);
            }
        }

        match best {
            Some(connection) if connection.duration != 0 => {
                let arrival = elapsed.saturating_add(connection.total_duration());
                self.local_blacklist.insert(connection.node.clone(), arrival);
                let reached_end = connection.node == self.end;
                self.temp_path.push(connection);

                if reached_end {
                    if arrival > 0 && arrival < self.total_time {
                        self.total_time = arrival;
                        self.best_path = self.temp_path.clone();
                    }
                    self.temp_path.clear();
                    self.local_blacklist.clear();
                }
            }
            _ => {
                if self.temp_path.pop().is_none() {
                    self.completed = true;
                }
            }
        }
    }

    fn verify_time(&self, node: &N, time: Millis) -> bool {
        time < self.total_time
            && self.local_blacklist.get(node).map_or(true, |&seen| time < seen)
            && self.global_blacklist.get(node).map_or(true, |&seen| time <= seen)
    }
}
