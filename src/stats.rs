//! Statistics collection and export for the rail simulation.
//!
//! This module provides statistics tracking and multiple export formats
//! (JSON, CSV) for analysing a simulation run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::types::{DepotId, Millis};

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    /// Simulation metadata
    pub metadata: SimulationMetadata,

    /// Simulator-level statistics
    pub simulator: SimulatorSummary,

    /// Per-depot statistics
    pub depots: BTreeMap<DepotId, DepotStats>,

    /// Timing statistics
    pub timing: TimingStats,
}

/// Metadata about the simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationMetadata {
    /// Simulation name/description
    pub name: String,

    /// Start time (wall clock)
    pub start_time: Option<String>,

    /// End time (wall clock)
    pub end_time: Option<String>,

    /// Crate version
    pub version: String,

    /// Configuration file used (if any)
    pub config_file: Option<String>,
}

/// Simulator-level statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulatorSummary {
    /// Final real clock
    pub final_millis: Millis,

    /// Total ticks executed
    pub ticks_executed: u64,

    /// Total vehicle ticks
    pub vehicle_ticks: u64,

    /// Vehicle ticks skipped because of bad path data
    pub vehicle_failures: u64,

    /// Refused signal block claims
    pub block_rejections: u64,

    /// Vehicles dispatched
    pub departures_dispatched: u64,

    /// Path-search steps spent on route generation
    pub path_search_steps: u64,

    /// Number of depots
    pub depot_count: usize,

    /// Number of signal blocks
    pub signal_block_count: usize,
}

/// Statistics for a single depot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DepotStats {
    /// Depot identifier
    pub id: DepotId,

    pub name: String,

    /// Number of sidings
    pub sidings: usize,

    /// Vehicle slots over all sidings
    pub vehicles: usize,

    /// Departures accepted by the sidings
    pub departures: usize,

    /// Vehicles dispatched
    pub dispatched: u64,

    /// Path-search steps spent on route generation
    pub path_search_steps: u64,
}

/// Timing/performance statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    /// Simulated milliseconds per wall-clock second
    pub sim_millis_per_second: f64,

    /// Ticks executed per second
    pub ticks_per_second: f64,

    /// Vehicle ticks per second
    pub vehicle_ticks_per_second: f64,
}

impl SimulationStats {
    /// Creates a new empty statistics container.
    pub fn new() -> Self {
        Self {
            metadata: SimulationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..SimulationMetadata::default()
            },
            ..Self::default()
        }
    }

    /// Sets the simulation name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// Records the start time.
    pub fn record_start(&mut self) {
        self.metadata.start_time = Some(unix_timestamp());
    }

    /// Records the end time.
    pub fn record_end(&mut self) {
        self.metadata.end_time = Some(unix_timestamp());
    }

    /// Updates timing statistics based on wall clock time.
    ///
    /// # Arguments
    /// * `wall_time_ms` - Wall-clock duration of the run
    /// * `simulated_millis` - Simulated time covered by the run
    pub fn compute_timing(&mut self, wall_time_ms: f64, simulated_millis: Millis) {
        self.timing.total_wall_time_ms = wall_time_ms;

        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            self.timing.sim_millis_per_second = simulated_millis as f64 / seconds;
            self.timing.ticks_per_second = self.simulator.ticks_executed as f64 / seconds;
            self.timing.vehicle_ticks_per_second = self.simulator.vehicle_ticks as f64 / seconds;
        }
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self.to_json().map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e)
        })?;
        std::fs::write(path, json)
    }

    /// Exports summary statistics to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        let s = &self.simulator;

        csv.push_str("metric,value\n");

        csv.push_str(&format!("final_millis,{}\n", s.final_millis));
        csv.push_str(&format!("ticks_executed,{}\n", s.ticks_executed));
        csv.push_str(&format!("vehicle_ticks,{}\n", s.vehicle_ticks));
        csv.push_str(&format!("vehicle_failures,{}\n", s.vehicle_failures));
        csv.push_str(&format!("block_rejections,{}\n", s.block_rejections));
        csv.push_str(&format!("departures_dispatched,{}\n", s.departures_dispatched));
        csv.push_str(&format!("path_search_steps,{}\n", s.path_search_steps));
        csv.push_str(&format!("depot_count,{}\n", s.depot_count));
        csv.push_str(&format!("signal_block_count,{}\n", s.signal_block_count));

        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.timing.total_wall_time_ms));
        csv.push_str(&format!("sim_millis_per_second,{:.2}\n", self.timing.sim_millis_per_second));
        csv.push_str(&format!("ticks_per_second,{:.2}\n", self.timing.ticks_per_second));

        csv
    }

    /// Exports summary statistics to CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Exports per-depot statistics to CSV.
    pub fn depots_to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("depot_id,name,sidings,vehicles,departures,dispatched,path_search_steps\n");

        for (id, depot) in &self.depots {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                id,
                depot.name.replace(',', " "),
                depot.sidings,
                depot.vehicles,
                depot.departures,
                depot.dispatched,
                depot.path_search_steps,
            ));
        }

        csv
    }

    /// Exports per-depot statistics to CSV file.
    pub fn depots_to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.depots_to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Statistics ===")?;
        writeln!(w)?;

        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        if let Some(ref start) = self.metadata.start_time {
            writeln!(w, "Started: {}", start)?;
        }
        if let Some(ref end) = self.metadata.end_time {
            writeln!(w, "Ended: {}", end)?;
        }
        writeln!(w)?;

        let s = &self.simulator;
        writeln!(w, "--- Simulator ---")?;
        writeln!(w, "Final clock: {} ms", s.final_millis)?;
        writeln!(w, "Ticks executed: {}", s.ticks_executed)?;
        writeln!(w, "Vehicle ticks: {}", s.vehicle_ticks)?;
        writeln!(w, "Vehicle failures: {}", s.vehicle_failures)?;
        writeln!(w, "Block rejections: {}", s.block_rejections)?;
        writeln!(w, "Departures dispatched: {}", s.departures_dispatched)?;
        writeln!(w, "Path search steps: {}", s.path_search_steps)?;
        writeln!(w, "Depots: {}", s.depot_count)?;
        writeln!(w, "Signal blocks: {}", s.signal_block_count)?;
        writeln!(w)?;

        writeln!(w, "--- Timing ---")?;
        writeln!(w, "Wall time: {:.2} ms", self.timing.total_wall_time_ms)?;
        writeln!(w, "Sim ms/sec: {:.2}", self.timing.sim_millis_per_second)?;
        writeln!(w, "Ticks/sec: {:.2}", self.timing.ticks_per_second)?;
        writeln!(w)?;

        writeln!(w, "--- Depots ---")?;
        for (id, depot) in &self.depots {
            writeln!(w, "Depot {} ({}):", id, depot.name)?;
            writeln!(w, "  Sidings: {}, Vehicles: {}", depot.sidings, depot.vehicles)?;
            writeln!(w, "  Departures: {}, Dispatched: {}", depot.departures, depot.dispatched)?;
        }

        Ok(())
    }

    /// Returns a summary string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

/// Returns the current Unix time as a string.
fn unix_timestamp() -> String {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    format!("{}s", duration.as_secs())
}

/// Statistics collector fed from [`crate::Simulator::export_stats`].
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: SimulationStats,
    timer: Option<Timer>,
    start_millis: Millis,
}

impl StatsCollector {
    /// Creates a new collector.
    pub fn new() -> Self {
        Self {
            stats: SimulationStats::new(),
            ..Self::default()
        }
    }

    /// Sets the simulation name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.stats.metadata.name = name.into();
    }

    /// Sets the configuration file the run was built from.
    pub fn set_config_file(&mut self, path: impl Into<String>) {
        self.stats.metadata.config_file = Some(path.into());
    }

    /// Starts timing at the given simulated clock.
    pub fn start(&mut self, start_millis: Millis) {
        self.timer = Some(Timer::start());
        self.start_millis = start_millis;
        self.stats.record_start();
    }

    /// Stops timing and computes final statistics.
    pub fn stop(&mut self) {
        self.stats.record_end();
        if let Some(ref timer) = self.timer {
            let simulated = self.stats.simulator.final_millis - self.start_millis;
            self.stats.compute_timing(timer.elapsed_ms(), simulated);
        }
    }

    /// Updates statistics from a simulator JSON export.
    pub fn update_from_json(&mut self, json: &serde_json::Value) {
        if let Some(simulator) = json.get("simulator") {
            let s = &mut self.stats.simulator;
            s.final_millis = simulator["current_millis"].as_i64().unwrap_or(0);
            s.ticks_executed = simulator["ticks_executed"].as_u64().unwrap_or(0);
            s.vehicle_ticks = simulator["vehicle_ticks"].as_u64().unwrap_or(0);
            s.vehicle_failures = simulator["vehicle_failures"].as_u64().unwrap_or(0);
            s.block_rejections = simulator["block_rejections"].as_u64().unwrap_or(0);
            s.departures_dispatched = simulator["departures_dispatched"].as_u64().unwrap_or(0);
            s.path_search_steps = simulator["path_search_steps"].as_u64().unwrap_or(0);
            s.depot_count = simulator["depot_count"].as_u64().unwrap_or(0) as usize;
            s.signal_block_count = simulator["signal_block_count"].as_u64().unwrap_or(0) as usize;
        }

        if let Some(depots) = json.get("depots").and_then(|d| d.as_object()) {
            for (id_str, depot_json) in depots {
                if let Ok(id) = id_str.parse::<DepotId>() {
                    let depot = DepotStats {
                        id,
                        name: depot_json["name"].as_str().unwrap_or_default().to_string(),
                        sidings: depot_json["sidings"].as_u64().unwrap_or(0) as usize,
                        vehicles: depot_json["vehicles"].as_u64().unwrap_or(0) as usize,
                        departures: depot_json["departures"].as_u64().unwrap_or(0) as usize,
                        dispatched: depot_json["dispatched"].as_u64().unwrap_or(0),
                        path_search_steps: depot_json["path_search_steps"].as_u64().unwrap_or(0),
                    };
                    self.stats.depots.insert(id, depot);
                }
            }
        }
    }

    /// Returns the collected statistics.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Consumes the collector and returns the statistics.
    pub fn into_stats(self) -> SimulationStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_creation() {
        let stats = SimulationStats::new().with_name("Test Simulation");

        assert_eq!(stats.metadata.name, "Test Simulation");
        assert_eq!(stats.metadata.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_stats_json_export() {
        let mut stats = SimulationStats::new();
        stats.simulator.final_millis = 60_000;
        stats.simulator.ticks_executed = 1200;

        let json = stats.to_json().unwrap();
        assert!(json.contains("60000"));
        assert!(json.contains("1200"));
    }

    #[test]
    fn test_stats_csv_export() {
        let mut stats = SimulationStats::new();
        stats.simulator.final_millis = 1000;
        stats.simulator.departures_dispatched = 12;

        let csv = stats.to_csv();
        assert!(csv.contains("final_millis,1000"));
        assert!(csv.contains("departures_dispatched,12"));
    }

    #[test]
    fn test_depot_stats_csv() {
        let mut stats = SimulationStats::new();
        stats.depots.insert(
            1,
            DepotStats {
                id: 1,
                name: "North, East".to_string(),
                sidings: 2,
                vehicles: 6,
                departures: 40,
                dispatched: 3,
                path_search_steps: 90,
            },
        );

        let csv = stats.depots_to_csv();
        assert!(csv.contains("1,North  East,2,6,40,3,90"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 10.0);
    }

    #[test]
    fn test_stats_collector() {
        let mut collector = StatsCollector::new();
        collector.set_name("Test");
        collector.start(0);

        std::thread::sleep(std::time::Duration::from_millis(5));

        collector.stop();

        let stats = collector.stats();
        assert_eq!(stats.metadata.name, "Test");
        assert!(stats.timing.total_wall_time_ms >= 5.0);
    }

    #[test]
    fn test_stats_collector_from_json() {
        let mut collector = StatsCollector::new();

        let json = serde_json::json!({
            "simulator": {
                "current_millis": 10_000,
                "ticks_executed": 200,
                "vehicle_ticks": 800,
                "vehicle_failures": 0,
                "block_rejections": 4,
                "departures_dispatched": 3,
                "path_search_steps": 57,
                "depot_count": 2,
                "signal_block_count": 1
            },
            "depots": {
                "1": {
                    "name": "North",
                    "sidings": 2,
                    "vehicles": 4,
                    "departures": 10,
                    "dispatched": 2,
                    "path_search_steps": 30
                },
                "2": {
                    "name": "South",
                    "sidings": 1,
                    "vehicles": 0,
                    "departures": 0,
                    "dispatched": 1,
                    "path_search_steps": 27
                }
            }
        });

        collector.update_from_json(&json);

        let stats = collector.stats();
        assert_eq!(stats.simulator.final_millis, 10_000);
        assert_eq!(stats.simulator.block_rejections, 4);
        assert_eq!(stats.depots.len(), 2);

        let north = stats.depots.get(&1).unwrap();
        assert_eq!(north.name, "North");
        assert_eq!(north.departures, 10);

        let south = stats.depots.get(&2).unwrap();
        assert_eq!(south.dispatched, 1);
    }

    #[test]
    fn test_summary_output() {
        let mut stats = SimulationStats::new().with_name("Summary Test");
        stats.simulator.final_millis = 1000;
        stats.simulator.ticks_executed = 100;

        let summary = stats.summary();
        assert!(summary.contains("Summary Test"));
        assert!(summary.contains("1000"));
    }
}
