//! The plant model: the single mutable aggregate advanced by the tick loop.

pub mod evcs;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::SimulatorConfig;
use crate::devices::{BaseLoad, DeviceKind, FlexDevice, Pv, Storage};
use crate::sim::tariff::Tariff;

pub use evcs::{EvcsFleet, Vehicle};

/// Grid connection point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grid {
    pub available: bool,
    /// Import limit, never below 1 kW.
    pub limit_kw: f64,
    /// Site base load; `base_load.base_kw` is the configured mean.
    pub base_load: BaseLoad,
    /// Net import after the last tick (positive = import).
    pub power_kw: f64,
    pub over_limit: bool,
}

/// Flexible devices keyed by kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlexDevices {
    pub heatpump: FlexDevice,
    pub chp: FlexDevice,
    pub generator: FlexDevice,
}

impl FlexDevices {
    fn new() -> Self {
        Self {
            heatpump: FlexDevice::new(DeviceKind::Heatpump),
            chp: FlexDevice::new(DeviceKind::Chp),
            generator: FlexDevice::new(DeviceKind::Generator),
        }
    }

    pub fn get(&self, kind: DeviceKind) -> &FlexDevice {
        match kind {
            DeviceKind::Heatpump => &self.heatpump,
            DeviceKind::Chp => &self.chp,
            DeviceKind::Generator => &self.generator,
        }
    }

    pub fn get_mut(&mut self, kind: DeviceKind) -> &mut FlexDevice {
        match kind {
            DeviceKind::Heatpump => &mut self.heatpump,
            DeviceKind::Chp => &mut self.chp,
            DeviceKind::Generator => &mut self.generator,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlexDevice> {
        [&self.heatpump, &self.chp, &self.generator].into_iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FlexDevice> {
        [&mut self.heatpump, &mut self.chp, &mut self.generator].into_iter()
    }
}

/// Everything the simulated site consists of.
///
/// Built once at startup with [`PlantModel::from_config`] and then mutated in
/// place by the tick pipeline, scenarios and commands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantModel {
    pub grid: Grid,
    pub tariff: Tariff,
    pub pv: Pv,
    pub storage: Storage,
    pub devices: FlexDevices,
    pub evcs: EvcsFleet,
}

impl PlantModel {
    /// Builds the baseline plant from a normalized configuration.
    pub fn from_config(cfg: &SimulatorConfig, now: NaiveDateTime) -> Self {
        Self {
            grid: Grid {
                available: true,
                limit_kw: cfg.grid.limit_kw.max(1.0),
                base_load: BaseLoad::new(cfg.grid.base_load_kw, cfg.simulation.base_load_noise_pct),
                power_kw: 0.0,
                over_limit: false,
            },
            tariff: Tariff::from_config(&cfg.tariff),
            pv: Pv::new(cfg.pv.installed_kwp, cfg.pv.weather_factor),
            storage: Storage::new(
                cfg.storage.capacity_kwh,
                cfg.storage.max_charge_kw,
                cfg.storage.max_discharge_kw,
                cfg.storage.initial_soc_pct,
            ),
            devices: FlexDevices::new(),
            evcs: EvcsFleet::from_config(&cfg.evcs, now),
        }
    }

    /// Restores every transient field to the baseline while keeping the
    /// fleet size. Used after scenarios and suites end.
    pub fn reset_to_baseline(&mut self, cfg: &SimulatorConfig, now: NaiveDateTime) {
        *self = Self::from_config(cfg, now);
    }

    /// Lists every broken model invariant. Empty when the model is sound.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !(0.0..=100.0).contains(&self.storage.soc_pct) {
            out.push(format!("storage.soc_pct out of range: {}", self.storage.soc_pct));
        }
        if self.grid.limit_kw < 1.0 || !self.grid.limit_kw.is_finite() {
            out.push(format!("grid.limit_kw below 1: {}", self.grid.limit_kw));
        }
        if !self.grid.available && (self.grid.power_kw != 0.0 || self.grid.over_limit) {
            out.push("grid unavailable but reports power".to_string());
        }
        for cp in self.evcs.points() {
            if !(0.0..=100.0).contains(&cp.vehicle.soc_pct) {
                out.push(format!("{} vehicle soc out of range: {}", cp.id, cp.vehicle.soc_pct));
            }
            if !(1..=10).contains(&cp.ctrl.priority) {
                out.push(format!("{} priority out of range: {}", cp.id, cp.ctrl.priority));
            }
            if !cp.sim.meter_freeze && cp.meas.power_kw > cp.ceiling_kw() + 1e-9 {
                out.push(format!(
                    "{} power {} above ceiling {}",
                    cp.id,
                    cp.meas.power_kw,
                    cp.ceiling_kw()
                ));
            }
            if cp.meas.energy_kwh < 0.0 {
                out.push(format!("{} negative session energy", cp.id));
            }
        }
        out
    }
}
