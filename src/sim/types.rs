//! Per-tick result record.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

/// Complete record of one simulation tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickResult {
    /// Tick counter, starting at 1.
    pub tick: u64,
    /// Wall-clock (or synthetic) time of the tick.
    pub time: NaiveDateTime,
    /// Clamped tick length in seconds.
    pub dt_s: f64,
    /// Tariff price (ct/kWh).
    pub price_ct_per_kwh: f64,
    /// Sampled base load (kW).
    pub base_load_kw: f64,
    /// PV generation (kW, non-negative).
    pub pv_kw: f64,
    /// Storage power (kW; positive=discharge, negative=charge).
    pub storage_kw: f64,
    /// Storage SoC after this tick (%).
    pub storage_soc_pct: f64,
    pub heatpump_kw: f64,
    pub chp_kw: f64,
    pub generator_kw: f64,
    /// Sum of charge point power (kW).
    pub ev_total_kw: f64,
    /// Net grid import (kW; negative=export).
    pub grid_kw: f64,
    pub grid_available: bool,
    pub over_limit: bool,
}

impl fmt::Display for TickResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>5} {} | grid={:>8.2} kW{} | base={:.2} pv={:.2} ev={:.2} \
             bat={:.2} (SoC={:.1}%) hp={:.2} chp={:.2} gen={:.2} | {:.2} ct/kWh",
            self.tick,
            self.time.format("%H:%M:%S"),
            self.grid_kw,
            match (self.grid_available, self.over_limit) {
                (false, _) => " (offline)",
                (true, true) => " (OVER)",
                (true, false) => "",
            },
            self.base_load_kw,
            self.pv_kw,
            self.ev_total_kw,
            self.storage_kw,
            self.storage_soc_pct,
            self.heatpump_kw,
            self.chp_kw,
            self.generator_kw,
            self.price_ct_per_kwh,
        )
    }
}
