//! Shuttle Line Simulation Example
//!
//! This example runs a two-platform shuttle line through one game day:
//! - Two sidings, one at each end of the line
//! - A frequency timetable with a morning and an evening peak
//! - Signal blocks covering the main line, so only one train holds it
//!
//! The simulation showcases:
//! - Incremental route generation across ticks
//! - Departure assignment between sidings
//! - Braking behind occupied blocks
//! - Statistics collection

use railyard::{
    init_logging, BlockColor, ConfigError, Depot, DepotSettings, Millis, Position, SegmentKey, SimConfig,
    SimConfigBuilder, Siding, Simulator, StatsCollector, Timer, TransportMode, VehicleParams,
};

// ============================================================================
// Line Configuration
// ============================================================================

const TICK_MILLIS: Millis = 50;             // Server tick
const GAME_DAY_MILLIS: Millis = 1_200_000;  // 20 minute day
const LINE_LENGTH: i64 = 2000;              // Metres between platforms
const SPEED_LIMIT_KMH: f64 = 72.0;          // Main line speed
const DWELL_MILLIS: Millis = 20_000;        // Platform dwell
const VEHICLES_PER_SIDING: usize = 2;
const PATH_STEPS_PER_TICK: usize = 32;
const SEED: u64 = 7;
const LOG_LEVEL: &str = "warn";

// Hourly departures
const PEAK_FREQUENCY: i64 = 6;
const OFF_PEAK_FREQUENCY: i64 = 2;

// ============================================================================
// World Construction
// ============================================================================

fn p(x: i64) -> Position {
    Position::new(x, 0, 0)
}

fn build_config() -> Result<SimConfig, ConfigError> {
    // West siding lead, main line, east siding lead
    SimConfigBuilder::new()
        .tick_millis(TICK_MILLIS)
        .millis_per_game_day(GAME_DAY_MILLIS)
        .path_steps_per_tick(PATH_STEPS_PER_TICK)
        .seed(SEED)
        .log_level(LOG_LEVEL)
        .add_track(p(40), p(100), SPEED_LIMIT_KMH)
        .add_track(p(100), p(100 + LINE_LENGTH), SPEED_LIMIT_KMH)
        .add_track(p(100 + LINE_LENGTH), p(160 + LINE_LENGTH), SPEED_LIMIT_KMH)
        .add_platform(p(100), p(100 + LINE_LENGTH), DWELL_MILLIS)
        .add_signal_block(BlockColor::Red, p(100), p(100 + LINE_LENGTH))
        .build()
}

fn build_depot() -> Depot {
    let mut settings = DepotSettings::default();
    for hour in 0..24 {
        let frequency = match hour {
            7..=9 | 16..=18 => PEAK_FREQUENCY,
            6..=22 => OFF_PEAK_FREQUENCY,
            _ => 0,
        };
        settings.set_frequency(hour, frequency);
    }

    let mut depot = Depot::new(1, "Shuttle Line", TransportMode::Train, settings);
    depot.set_waypoints(vec![p(100), p(100 + LINE_LENGTH)]);
    depot.add_siding(Siding::new(
        1,
        "West Siding",
        p(0),
        p(40),
        VehicleParams::default(),
        VEHICLES_PER_SIDING,
        GAME_DAY_MILLIS,
    ));
    depot.add_siding(Siding::new(
        2,
        "East Siding",
        p(200 + LINE_LENGTH),
        p(160 + LINE_LENGTH),
        VehicleParams::default(),
        VEHICLES_PER_SIDING,
        GAME_DAY_MILLIS,
    ));
    depot
}

fn main() -> Result<(), ConfigError> {
    let config = build_config()?;
    init_logging(&config.simulation.log_level);

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║           Shuttle Line Simulation Example                ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║ Configuration:                                           ║");
    println!("║   Tick:            {} ms                                 ║", TICK_MILLIS);
    println!("║   Game Day:        {} ms                            ║", GAME_DAY_MILLIS);
    println!("║   Line Length:     {} m                                ║", LINE_LENGTH);
    println!("║   Speed Limit:     {:.0} km/h                              ║", SPEED_LIMIT_KMH);
    println!("║   Dwell:           {} ms                              ║", DWELL_MILLIS);
    println!("║   Vehicles:        {} per siding                         ║", VEHICLES_PER_SIDING);
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    // ========================================================================
    // World
    // ========================================================================
    let mut simulator = Simulator::from_config(&config)?;
    simulator.add_depot(build_depot());

    // Covered by the red block
    let main_line = SegmentKey::new(p(100), p(100 + LINE_LENGTH));

    let generating = simulator.generate_by_depot_name("shuttle");
    println!("Generating routes for {} depot(s)...", generating);

    // ========================================================================
    // Run
    // ========================================================================
    let mut collector = StatsCollector::new();
    collector.set_name("shuttle_line");
    collector.start(simulator.current_millis());
    let timer = Timer::start();

    let report_every = GAME_DAY_MILLIS / 8;
    for _ in 0..8 {
        simulator.run_for(report_every);

        let snapshots = simulator.vehicle_snapshots();
        let running = snapshots.iter().filter(|snapshot| snapshot.on_route).count();
        println!(
            "[t={:>8} ms] {} of {} vehicles on route, main line {}",
            simulator.current_millis(),
            running,
            snapshots.len(),
            if simulator.signals().is_occupied(&main_line) { "occupied" } else { "clear" }
        );
        for snapshot in snapshots.iter().filter(|snapshot| snapshot.on_route) {
            println!(
                "    vehicle {:>6}: {:>7.1} m at {:>5.1} km/h",
                snapshot.id,
                snapshot.progress,
                snapshot.speed * 3600.0
            );
        }
    }

    collector.update_from_json(&simulator.export_stats());
    collector.stop();

    // ========================================================================
    // Results
    // ========================================================================
    println!();
    println!("Simulation completed in {:.2} ms wall time", timer.elapsed_ms());
    println!();
    print!("{}", collector.stats().summary());
    Ok(())
}
