//! Route assembly across a list of waypoints.
//!
//! A [`RouteAssembler`] owns one [`PathFinder`] per pair of consecutive
//! waypoints and steps them in order, a bounded number of steps per tick.

use std::collections::VecDeque;
use std::hash::Hash;

use crate::path::finder::{ConnectionDetails, ConnectionProvider, PathFinder, SearchStatus};

/// Progress of a route assembly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssemblyStatus<N> {
    /// Legs remain to be searched.
    InProgress,
    /// Every leg was found; the connections of all legs in order.
    Complete(Vec<ConnectionDetails<N>>),
    /// The leg starting at waypoint `leg` has no path.
    Failed { leg: usize },
}

/// Connects an ordered list of waypoints leg by leg.
#[derive(Debug)]
pub struct RouteAssembler<N> {
    waypoints: Vec<N>,
    finders: VecDeque<PathFinder<N>>,
    connections: Vec<ConnectionDetails<N>>,
    current_leg: usize,
    steps_per_tick: usize,
    steps_taken: u64,
    failed_leg: Option<usize>,
}

impl<N: Clone + Eq + Hash> RouteAssembler<N> {
    /// Creates an assembler. Consecutive duplicate waypoints are collapsed.
    pub fn new(waypoints: impl IntoIterator<Item = N>, steps_per_tick: usize) -> Self {
        let mut deduped: Vec<N> = Vec::new();
        for waypoint in waypoints {
            if deduped.last() != Some(&waypoint) {
                deduped.push(waypoint);
            }
        }

        let finders = deduped
            .windows(2)
            .map(|pair| PathFinder::new(pair[0].clone(), pair[1].clone()))
            .collect();

        Self {
            waypoints: deduped,
            finders,
            connections: Vec::new(),
            current_leg: 0,
            steps_per_tick: steps_per_tick.max(1),
            steps_taken: 0,
            failed_leg: None,
        }
    }

    pub fn waypoints(&self) -> &[N] {
        &self.waypoints
    }

    /// Number of legs between the waypoints.
    pub fn leg_count(&self) -> usize {
        self.waypoints.len().saturating_sub(1)
    }

    /// Total finder steps taken so far.
    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    /// Advances the assembly by at most `steps_per_tick` finder steps.
    pub fn tick<P>(&mut self, provider: &P) -> AssemblyStatus<N>
    where
        P: ConnectionProvider<N> + ?Sized,
    {
        for _ in 0..self.steps_per_tick {
            if self.failed_leg.is_some() {
                break;
            }
            let Some(finder) = self.finders.front_mut() else {
                break;
            };

            self.steps_taken += 1;
            match finder.step(provider) {
                SearchStatus::Pending => {}
                SearchStatus::Found(path) => {
                    self.connections.extend(path);
                    self.finders.pop_front();
                    self.current_leg += 1;
                }
                SearchStatus::NotFound => {
                    tracing::info!(
                        leg = self.current_leg,
                        steps = finder.steps(),
                        "No path found for route leg"
                    );
                    self.failed_leg = Some(self.current_leg);
                    self.finders.clear();
                }
            }
        }
        self.status()
    }

    /// Runs the assembly to completion.
    pub fn solve<P>(&mut self, provider: &P) -> AssemblyStatus<N>
    where
        P: ConnectionProvider<N> + ?Sized,
    {
        loop {
            let status = self.tick(provider);
            if status != AssemblyStatus::InProgress {
                return status;
            }
        }
    }

    /// Current status without stepping.
    pub fn status(&self) -> AssemblyStatus<N> {
        if let Some(leg) = self.failed_leg {
            AssemblyStatus::Failed { leg }
        } else if self.finders.is_empty() {
            AssemblyStatus::Complete(self.connections.clone())
        } else {
            AssemblyStatus::InProgress
        }
    }
}
