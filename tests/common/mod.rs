//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};

use plant_sim::config::SimulatorConfig;
use plant_sim::publish::PointValue;
use plant_sim::simulator::Simulator;
use plant_sim::store::MemoryStore;

/// Fixed start time for reproducible runs (2024-05-01 10:00, morning PV).
pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

/// `t0()` plus `secs` seconds.
pub fn at(secs: i64) -> NaiveDateTime {
    t0() + Duration::seconds(secs)
}

/// Default configuration with the shortest scenario duration (30 s) and no
/// reset pause, so lifecycle tests stay short.
pub fn fast_config() -> SimulatorConfig {
    let mut config = SimulatorConfig::default();
    config.scenario.duration_sec = 30;
    config.scenario.reset_pause_sec = 0;
    config
}

/// Simulator over a fresh in-memory store, initialized at `t0()`.
pub fn simulator(config: &SimulatorConfig) -> Simulator<MemoryStore> {
    let mut sim = Simulator::new(config, MemoryStore::new());
    sim.initialize(t0()).unwrap();
    sim
}

/// Ticks once per second for `secs` seconds starting at `from` (inclusive).
/// Returns the time of the next tick.
pub fn tick_for(sim: &mut Simulator<MemoryStore>, from: i64, secs: i64) -> i64 {
    for s in from..from + secs {
        sim.tick(at(s));
    }
    from + secs
}

/// Current store value of `key`.
pub fn value(sim: &Simulator<MemoryStore>, key: &str) -> Option<PointValue> {
    sim.store().get(key).cloned()
}
