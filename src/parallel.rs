//! Independent worlds ticked side by side.
//!
//! Worlds share nothing, so each one can run on its own thread. Every
//! simulator sits behind a `parking_lot::RwLock`; a telemetry reader takes
//! the read lock between ticks.
//!
//! # Feature Flag
//!
//! Parallel ticking requires the `parallel` feature:
//! ```toml
//! [dependencies]
//! railyard = { version = "0.1", features = ["parallel"] }
//! ```
//! Without it, worlds tick one after another.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use parking_lot::RwLock;
use std::sync::Arc;

use crate::simulator::Simulator;
use crate::types::Millis;

/// Shared handle to one world.
pub type WorldHandle = Arc<RwLock<Simulator>>;

/// A set of independent worlds.
///
/// # Example
///
/// ```ignore
/// use railyard::parallel::Worlds;
///
/// let mut worlds = Worlds::new().with_threads(4);
/// worlds.add(overworld);
/// worlds.add(nether);
/// worlds.run_for(60_000);
/// ```
#[derive(Default)]
pub struct Worlds {
    worlds: Vec<WorldHandle>,
    /// Number of worker threads (0 = auto)
    num_threads: usize,
    ticks_executed: u64,
}

impl Worlds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    ///
    /// Pass 0 for automatic detection (uses number of CPUs).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Adds a world and returns its handle.
    pub fn add(&mut self, simulator: Simulator) -> WorldHandle {
        let handle = Arc::new(RwLock::new(simulator));
        self.worlds.push(Arc::clone(&handle));
        handle
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WorldHandle> {
        self.worlds.get(index)
    }

    pub fn ticks_executed(&self) -> u64 {
        self.ticks_executed
    }

    /// Ticks every world once by its own tick length, sequentially.
    #[cfg(not(feature = "parallel"))]
    pub fn step_all(&mut self) {
        for world in &self.worlds {
            world.write().step();
        }
        self.ticks_executed += 1;
    }

    /// Ticks every world once by its own tick length, on the rayon pool.
    #[cfg(feature = "parallel")]
    pub fn step_all(&mut self) {
        self.worlds.par_iter().for_each(|world| world.write().step());
        self.ticks_executed += 1;
    }

    /// Ticks every world once by `millis`, sequentially.
    #[cfg(not(feature = "parallel"))]
    pub fn tick_all(&mut self, millis: Millis) {
        for world in &self.worlds {
            world.write().tick(millis);
        }
        self.ticks_executed += 1;
    }

    /// Ticks every world once by `millis`, on the rayon pool.
    #[cfg(feature = "parallel")]
    pub fn tick_all(&mut self, millis: Millis) {
        self.worlds.par_iter().for_each(|world| world.write().tick(millis));
        self.ticks_executed += 1;
    }

    /// Runs every world for `duration` milliseconds of its own clock.
    pub fn run_for(&mut self, duration: Millis) {
        #[cfg(feature = "parallel")]
        {
            // Configure rayon thread pool if needed
            if self.num_threads > 0 {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.num_threads)
                    .build_global()
                    .ok(); // Ignore if already configured
            }
            self.worlds.par_iter().for_each(|world| {
                world.write().run_for(duration);
            });
        }

        #[cfg(not(feature = "parallel"))]
        for world in &self.worlds {
            world.write().run_for(duration);
        }
    }

    /// Exports statistics of every world as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        let worlds: Vec<serde_json::Value> = self
            .worlds
            .iter()
            .map(|world| world.read().export_stats())
            .collect();

        serde_json::json!({
            "world_count": self.worlds.len(),
            "ticks_executed": self.ticks_executed,
            "parallel": cfg!(feature = "parallel"),
            "worlds": worlds,
        })
    }
}
