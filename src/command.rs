//! Typed external commands.
//!
//! A state key such as `evcs.c03.ctrl.limitKw` is parsed into a
//! [`Command`] once and then dispatched by pattern match. Values are coerced
//! to the field's type and clamped into range; input that cannot be coerced
//! leaves the field as it is. Nothing is ever rejected.

use chrono::NaiveDateTime;

use crate::devices::solar::PV_OVERRIDE_MAX_KW;
use crate::devices::DeviceKind;
use crate::model::PlantModel;
use crate::model::evcs::{point_id, point_index};
use crate::publish::PointValue;
use crate::report::WriteCategory;
use crate::sim::tariff::{PRICE_MAX_CT, PRICE_MIN_CT, TariffMode};

pub const GRID_LIMIT_RANGE: (f64, f64) = (1.0, 2000.0);
pub const BASE_LOAD_RANGE: (f64, f64) = (0.0, 500.0);
pub const VEHICLE_CAPACITY_RANGE: (f64, f64) = (1.0, 1000.0);
pub const VEHICLE_MAX_CHARGE_RANGE: (f64, f64) = (0.0, 1000.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridField {
    Available,
    LimitKw,
    BaseLoadKw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TariffField {
    Mode,
    PriceCtPerKwh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvField {
    OverrideEnabled,
    OverridePowerKw,
    WeatherFactor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageField {
    Enabled,
    PowerSetKw,
    SocPct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceField {
    Enabled,
    PowerSetKw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargePointField {
    Enabled,
    LimitKw,
    Plugged,
    Priority,
    ResetSession,
    VehicleSocPct,
    VehicleTargetSocPct,
    VehicleCapacityKwh,
    VehicleMaxChargeKw,
    VehicleDepartureTime,
    Faulted,
    Unavailable,
    MeterFreeze,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioControl {
    Selected,
    Apply,
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteControl {
    Start,
    Stop,
}

/// A parsed writable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Grid(GridField),
    Tariff(TariffField),
    Pv(PvField),
    Storage(StorageField),
    Device(DeviceKind, DeviceField),
    /// Zero-based charge point index.
    ChargePoint(usize, ChargePointField),
    Scenario(ScenarioControl),
    Suite(SuiteControl),
}

const GRID_KEYS: [(&str, GridField); 3] = [
    ("available", GridField::Available),
    ("limitKw", GridField::LimitKw),
    ("baseLoadKw", GridField::BaseLoadKw),
];

const TARIFF_KEYS: [(&str, TariffField); 2] = [
    ("mode", TariffField::Mode),
    ("priceCtPerKwh", TariffField::PriceCtPerKwh),
];

const PV_KEYS: [(&str, PvField); 3] = [
    ("override.enabled", PvField::OverrideEnabled),
    ("override.powerKw", PvField::OverridePowerKw),
    ("weatherFactor", PvField::WeatherFactor),
];

const STORAGE_KEYS: [(&str, StorageField); 3] = [
    ("ctrl.enabled", StorageField::Enabled),
    ("ctrl.powerSetKw", StorageField::PowerSetKw),
    ("socPct", StorageField::SocPct),
];

const DEVICE_KEYS: [(&str, DeviceField); 2] = [
    ("ctrl.enabled", DeviceField::Enabled),
    ("ctrl.powerSetKw", DeviceField::PowerSetKw),
];

const CHARGE_POINT_KEYS: [(&str, ChargePointField); 13] = [
    ("ctrl.enabled", ChargePointField::Enabled),
    ("ctrl.limitKw", ChargePointField::LimitKw),
    ("ctrl.plugged", ChargePointField::Plugged),
    ("ctrl.priority", ChargePointField::Priority),
    ("ctrl.resetSession", ChargePointField::ResetSession),
    ("vehicle.socPct", ChargePointField::VehicleSocPct),
    ("vehicle.targetSocPct", ChargePointField::VehicleTargetSocPct),
    ("vehicle.capacityKwh", ChargePointField::VehicleCapacityKwh),
    ("vehicle.maxChargeKw", ChargePointField::VehicleMaxChargeKw),
    ("vehicle.departureTime", ChargePointField::VehicleDepartureTime),
    ("sim.faulted", ChargePointField::Faulted),
    ("sim.unavailable", ChargePointField::Unavailable),
    ("sim.meterFreeze", ChargePointField::MeterFreeze),
];

const SCENARIO_KEYS: [(&str, ScenarioControl); 4] = [
    ("selected", ScenarioControl::Selected),
    ("apply", ScenarioControl::Apply),
    ("start", ScenarioControl::Start),
    ("stop", ScenarioControl::Stop),
];

const SUITE_KEYS: [(&str, SuiteControl); 2] = [("start", SuiteControl::Start), ("stop", SuiteControl::Stop)];

fn lookup<T: Copy>(table: &[(&str, T)], suffix: &str) -> Option<T> {
    table.iter().find(|(k, _)| *k == suffix).map(|(_, v)| *v)
}

fn suffix_of<T: Copy + PartialEq>(table: &[(&'static str, T)], field: T) -> &'static str {
    table.iter().find(|(_, v)| *v == field).map_or("", |(k, _)| *k)
}

/// Parses a writable state key. Read-only and unknown keys yield `None`.
pub fn parse_key(key: &str) -> Option<Command> {
    let (head, rest) = key.split_once('.')?;
    match head {
        "grid" => lookup(&GRID_KEYS, rest).map(Command::Grid),
        "tariff" => lookup(&TARIFF_KEYS, rest).map(Command::Tariff),
        "pv" => lookup(&PV_KEYS, rest).map(Command::Pv),
        "storage" => lookup(&STORAGE_KEYS, rest).map(Command::Storage),
        "scenario" => lookup(&SCENARIO_KEYS, rest).map(Command::Scenario),
        "suite" => lookup(&SUITE_KEYS, rest).map(Command::Suite),
        "evcs" => {
            let (id, field) = rest.split_once('.')?;
            let index = point_index(id)?;
            lookup(&CHARGE_POINT_KEYS, field).map(|f| Command::ChargePoint(index, f))
        }
        other => {
            let kind = DeviceKind::from_key(other)?;
            lookup(&DEVICE_KEYS, rest).map(|f| Command::Device(kind, f))
        }
    }
}

impl Command {
    /// The state key this command is written to.
    pub fn key(&self) -> String {
        match *self {
            Self::Grid(f) => format!("grid.{}", suffix_of(&GRID_KEYS, f)),
            Self::Tariff(f) => format!("tariff.{}", suffix_of(&TARIFF_KEYS, f)),
            Self::Pv(f) => format!("pv.{}", suffix_of(&PV_KEYS, f)),
            Self::Storage(f) => format!("storage.{}", suffix_of(&STORAGE_KEYS, f)),
            Self::Device(kind, f) => format!("{}.{}", kind.key(), suffix_of(&DEVICE_KEYS, f)),
            Self::ChargePoint(i, f) => {
                format!("evcs.{}.{}", point_id(i), suffix_of(&CHARGE_POINT_KEYS, f))
            }
            Self::Scenario(f) => format!("scenario.{}", suffix_of(&SCENARIO_KEYS, f)),
            Self::Suite(f) => format!("suite.{}", suffix_of(&SUITE_KEYS, f)),
        }
    }

    /// Write-report classification.
    pub fn category(&self) -> WriteCategory {
        match *self {
            Self::ChargePoint(_, ChargePointField::LimitKw) => WriteCategory::EvcsLimit,
            Self::ChargePoint(_, ChargePointField::Enabled) => WriteCategory::EvcsEnable,
            Self::ChargePoint(_, ChargePointField::Plugged) => WriteCategory::EvcsPlug,
            Self::Storage(StorageField::PowerSetKw) => WriteCategory::StoragePower,
            Self::Storage(StorageField::Enabled) => WriteCategory::StorageEnable,
            Self::Device(DeviceKind::Heatpump, _) => WriteCategory::Heatpump,
            Self::Device(DeviceKind::Chp, _) => WriteCategory::Chp,
            Self::Device(DeviceKind::Generator, _) => WriteCategory::Generator,
            Self::Grid(GridField::LimitKw) => WriteCategory::GridLimit,
            Self::Tariff(_) => WriteCategory::Tariff,
            Self::Pv(PvField::OverrideEnabled | PvField::OverridePowerKw) => WriteCategory::PvOverride,
            _ => WriteCategory::Other,
        }
    }
}

fn number(value: &PointValue, current: f64, (lo, hi): (f64, f64)) -> f64 {
    value.as_f64().unwrap_or(current).clamp(lo, hi)
}

fn flag(value: &PointValue, current: bool) -> bool {
    value.as_bool().unwrap_or(current)
}

/// Applies a plant command and returns the value to acknowledge.
///
/// `None` means the command addressed something that does not exist (a
/// charge point beyond the fleet, or a scenario/suite control); the caller
/// acknowledges the raw value then.
pub fn apply_plant_command(
    model: &mut PlantModel,
    command: Command,
    value: &PointValue,
    now: NaiveDateTime,
) -> Option<PointValue> {
    let ack: PointValue = match command {
        Command::Grid(field) => {
            let grid = &mut model.grid;
            match field {
                GridField::Available => {
                    grid.available = flag(value, grid.available);
                    grid.available.into()
                }
                GridField::LimitKw => {
                    grid.limit_kw = number(value, grid.limit_kw, GRID_LIMIT_RANGE);
                    grid.limit_kw.into()
                }
                GridField::BaseLoadKw => {
                    let base = &mut grid.base_load.base_kw;
                    *base = number(value, *base, BASE_LOAD_RANGE);
                    (*base).into()
                }
            }
        }
        Command::Tariff(TariffField::Mode) => {
            let tariff = &mut model.tariff;
            if let Some(mode) = value.as_text().as_deref().and_then(TariffMode::parse) {
                tariff.mode = mode;
            }
            tariff.mode.as_str().into()
        }
        Command::Tariff(TariffField::PriceCtPerKwh) => {
            let tariff = &mut model.tariff;
            let price = number(value, tariff.price_ct_per_kwh, (PRICE_MIN_CT, PRICE_MAX_CT));
            tariff.set_manual_price(price);
            tariff.price_ct_per_kwh.into()
        }
        Command::Pv(field) => {
            let pv = &mut model.pv;
            match field {
                PvField::OverrideEnabled => {
                    pv.forced.enabled = flag(value, pv.forced.enabled);
                    pv.forced.enabled.into()
                }
                PvField::OverridePowerKw => {
                    pv.forced.power_kw = number(value, pv.forced.power_kw, (0.0, PV_OVERRIDE_MAX_KW));
                    pv.forced.power_kw.into()
                }
                PvField::WeatherFactor => {
                    pv.weather_factor = number(value, pv.weather_factor, (0.0, 1.0));
                    pv.weather_factor.into()
                }
            }
        }
        Command::Storage(field) => {
            let storage = &mut model.storage;
            match field {
                StorageField::Enabled => {
                    storage.ctrl.enabled = flag(value, storage.ctrl.enabled);
                    storage.ctrl.enabled.into()
                }
                StorageField::PowerSetKw => {
                    let range = (-storage.max_charge_kw, storage.max_discharge_kw);
                    storage.ctrl.power_set_kw = number(value, storage.ctrl.power_set_kw, range);
                    storage.ctrl.power_set_kw.into()
                }
                StorageField::SocPct => {
                    storage.soc_pct = number(value, storage.soc_pct, (0.0, 100.0));
                    storage.soc_pct.into()
                }
            }
        }
        Command::Device(kind, field) => {
            let device = model.devices.get_mut(kind);
            match field {
                DeviceField::Enabled => {
                    device.ctrl.enabled = flag(value, device.ctrl.enabled);
                    device.ctrl.enabled.into()
                }
                DeviceField::PowerSetKw => {
                    let range = (0.0, kind.ceiling_kw());
                    device.ctrl.power_set_kw = number(value, device.ctrl.power_set_kw, range);
                    device.ctrl.power_set_kw.into()
                }
            }
        }
        Command::ChargePoint(index, field) => {
            let cp = model.evcs.get_mut(index)?;
            match field {
                ChargePointField::Enabled => {
                    cp.ctrl.enabled = flag(value, cp.ctrl.enabled);
                    cp.ctrl.enabled.into()
                }
                ChargePointField::LimitKw => {
                    cp.ctrl.limit_kw = number(value, cp.ctrl.limit_kw, (0.0, cp.max_kw()));
                    cp.ctrl.limit_kw.into()
                }
                ChargePointField::Plugged => {
                    match flag(value, cp.ctrl.plugged) {
                        true if !cp.ctrl.plugged => cp.plug(),
                        false if cp.ctrl.plugged => cp.unplug(),
                        _ => {}
                    }
                    cp.ctrl.plugged.into()
                }
                ChargePointField::Priority => {
                    let current = f64::from(cp.ctrl.priority);
                    cp.ctrl.priority = number(value, current, (1.0, 10.0)).round() as u8;
                    cp.ctrl.priority.into()
                }
                // Momentary: a true write resets, the point reads back false.
                ChargePointField::ResetSession => {
                    if flag(value, false) {
                        cp.reset_session();
                    }
                    false.into()
                }
                ChargePointField::VehicleSocPct => {
                    let v = &mut cp.vehicle;
                    v.soc_pct = number(value, v.soc_pct, (0.0, 100.0));
                    v.soc_pct.into()
                }
                ChargePointField::VehicleTargetSocPct => {
                    let v = &mut cp.vehicle;
                    v.target_soc_pct = number(value, v.target_soc_pct, (0.0, 100.0));
                    v.target_soc_pct.into()
                }
                ChargePointField::VehicleCapacityKwh => {
                    let v = &mut cp.vehicle;
                    v.capacity_kwh = number(value, v.capacity_kwh, VEHICLE_CAPACITY_RANGE);
                    v.capacity_kwh.into()
                }
                ChargePointField::VehicleMaxChargeKw => {
                    let v = &mut cp.vehicle;
                    v.max_charge_kw = number(value, v.max_charge_kw, VEHICLE_MAX_CHARGE_RANGE);
                    v.max_charge_kw.into()
                }
                ChargePointField::VehicleDepartureTime => {
                    if let Some(text) = value.as_text() {
                        cp.vehicle.set_departure(&text, now);
                    }
                    cp.vehicle.departure_time.clone().into()
                }
                ChargePointField::Faulted => {
                    cp.sim.faulted = flag(value, cp.sim.faulted);
                    cp.sim.faulted.into()
                }
                ChargePointField::Unavailable => {
                    cp.sim.unavailable = flag(value, cp.sim.unavailable);
                    cp.sim.unavailable.into()
                }
                ChargePointField::MeterFreeze => {
                    cp.sim.meter_freeze = flag(value, cp.sim.meter_freeze);
                    cp.sim.meter_freeze.into()
                }
            }
        }
        Command::Scenario(_) | Command::Suite(_) => return None,
    };
    Some(ack)
}

/// Keys whose stored values are restored into the plant on startup.
pub fn persisted_commands(points: usize) -> Vec<Command> {
    let mut out = vec![
        Command::Grid(GridField::LimitKw),
        Command::Grid(GridField::BaseLoadKw),
        Command::Storage(StorageField::SocPct),
        Command::Pv(PvField::WeatherFactor),
        Command::Tariff(TariffField::Mode),
        Command::Tariff(TariffField::PriceCtPerKwh),
    ];
    for i in 0..points {
        out.extend([
            Command::ChargePoint(i, ChargePointField::LimitKw),
            Command::ChargePoint(i, ChargePointField::Enabled),
            Command::ChargePoint(i, ChargePointField::Priority),
            Command::ChargePoint(i, ChargePointField::VehicleSocPct),
        ]);
    }
    out
}

/// Applies a stored value during startup. Unlike a live write, a stored
/// tariff price never switches the mode: it is only restored when the
/// restored mode is already manual.
pub fn restore_plant_value(
    model: &mut PlantModel,
    cmd: Command,
    value: &PointValue,
    now: NaiveDateTime,
) -> Option<PointValue> {
    match cmd {
        Command::Tariff(TariffField::PriceCtPerKwh) => {
            if model.tariff.mode != TariffMode::Manual {
                return None;
            }
            let tariff = &mut model.tariff;
            tariff.price_ct_per_kwh =
                number(value, tariff.price_ct_per_kwh, (PRICE_MIN_CT, PRICE_MAX_CT));
            Some(tariff.price_ct_per_kwh.into())
        }
        _ => apply_plant_command(model, cmd, value, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn model() -> PlantModel {
        PlantModel::from_config(&SimulatorConfig::default(), now())
    }

    fn apply(model: &mut PlantModel, key: &str, value: impl Into<PointValue>) -> Option<PointValue> {
        let cmd = parse_key(key).expect("known key");
        apply_plant_command(model, cmd, &value.into(), now())
    }

    #[test]
    fn parses_every_family() {
        assert_eq!(parse_key("grid.limitKw"), Some(Command::Grid(GridField::LimitKw)));
        assert_eq!(
            parse_key("pv.override.powerKw"),
            Some(Command::Pv(PvField::OverridePowerKw))
        );
        assert_eq!(
            parse_key("chp.ctrl.powerSetKw"),
            Some(Command::Device(DeviceKind::Chp, DeviceField::PowerSetKw))
        );
        assert_eq!(
            parse_key("evcs.c03.vehicle.departureTime"),
            Some(Command::ChargePoint(2, ChargePointField::VehicleDepartureTime))
        );
        assert_eq!(parse_key("suite.stop"), Some(Command::Suite(SuiteControl::Stop)));
    }

    #[test]
    fn read_only_and_unknown_keys_do_not_parse() {
        for key in ["grid.powerKw", "evcs.c01.meas.powerKw", "evcs.x1.ctrl.enabled", "boiler.ctrl.enabled", "grid"] {
            assert_eq!(parse_key(key), None, "{key}");
        }
    }

    #[test]
    fn key_is_inverse_of_parse() {
        for key in [
            "grid.available",
            "tariff.priceCtPerKwh",
            "storage.ctrl.powerSetKw",
            "heatpump.ctrl.enabled",
            "evcs.c12.sim.meterFreeze",
            "scenario.apply",
        ] {
            assert_eq!(parse_key(key).unwrap().key(), key);
        }
    }

    #[test]
    fn numeric_values_are_clamped() {
        let mut m = model();
        assert_eq!(apply(&mut m, "grid.limitKw", 0.0), Some(PointValue::from(1.0)));
        assert_eq!(m.grid.limit_kw, 1.0);
        assert_eq!(apply(&mut m, "storage.ctrl.powerSetKw", 1e9), Some(PointValue::from(25.0)));
        assert_eq!(apply(&mut m, "storage.ctrl.powerSetKw", -1e9), Some(PointValue::from(-25.0)));
        assert_eq!(apply(&mut m, "evcs.c01.ctrl.limitKw", 99.0), Some(PointValue::from(22.0)));
        assert_eq!(apply(&mut m, "evcs.c01.ctrl.priority", 42.0), Some(PointValue::from(10u8)));
        assert_eq!(apply(&mut m, "heatpump.ctrl.powerSetKw", 9000.0), Some(PointValue::from(500.0)));
    }

    #[test]
    fn non_numeric_input_keeps_current_value() {
        let mut m = model();
        let before = m.grid.limit_kw;
        assert_eq!(apply(&mut m, "grid.limitKw", "lots"), Some(PointValue::from(before)));
        assert_eq!(apply(&mut m, "grid.limitKw", "55.5"), Some(PointValue::from(55.5)));
    }

    #[test]
    fn price_write_switches_to_manual() {
        let mut m = model();
        apply(&mut m, "tariff.priceCtPerKwh", 900.0);
        assert_eq!(m.tariff.mode, TariffMode::Manual);
        assert_eq!(m.tariff.price_ct_per_kwh, 500.0);
        assert_eq!(apply(&mut m, "tariff.mode", "auto"), Some(PointValue::from("auto")));
        assert_eq!(apply(&mut m, "tariff.mode", "weird"), Some(PointValue::from("auto")));
    }

    #[test]
    fn restored_price_keeps_the_restored_mode() {
        let price = parse_key("tariff.priceCtPerKwh").unwrap();
        let mut m = model();
        let base = m.tariff.price_ct_per_kwh;
        assert_eq!(restore_plant_value(&mut m, price, &PointValue::from(80.0), now()), None);
        assert_eq!(m.tariff.mode, TariffMode::Auto);
        assert_eq!(m.tariff.price_ct_per_kwh, base);

        apply(&mut m, "tariff.mode", "manual");
        assert_eq!(
            restore_plant_value(&mut m, price, &PointValue::from(80.0), now()),
            Some(PointValue::from(80.0))
        );
        assert_eq!(m.tariff.price_ct_per_kwh, 80.0);
    }

    #[test]
    fn missing_point_is_reported() {
        let mut m = model();
        assert_eq!(apply(&mut m, "evcs.c99.ctrl.enabled", true), None);
    }

    #[test]
    fn unplug_and_reset_clear_session_energy() {
        let mut m = model();
        apply(&mut m, "evcs.c01.ctrl.plugged", true);
        m.evcs.get_mut(0).unwrap().meas.energy_kwh = 4.0;
        apply(&mut m, "evcs.c01.ctrl.resetSession", true);
        assert_eq!(m.evcs.get(0).unwrap().meas.energy_kwh, 0.0);

        m.evcs.get_mut(0).unwrap().meas.energy_kwh = 2.0;
        apply(&mut m, "evcs.c01.ctrl.plugged", "false");
        assert!(!m.evcs.get(0).unwrap().ctrl.plugged);
        assert_eq!(m.evcs.get(0).unwrap().meas.energy_kwh, 0.0);
    }

    #[test]
    fn departure_text_is_resolved() {
        let mut m = model();
        apply(&mut m, "evcs.c02.vehicle.departureTime", "13:30");
        let v = &m.evcs.get(1).unwrap().vehicle;
        assert_eq!(v.departure_time, "13:30");
        assert!(v.departure_ts.is_some());
        apply(&mut m, "evcs.c02.vehicle.departureTime", "soon");
        assert!(m.evcs.get(1).unwrap().vehicle.departure_ts.is_none());
    }

    #[test]
    fn categories() {
        let cat = |k: &str| parse_key(k).unwrap().category();
        assert_eq!(cat("evcs.c01.ctrl.limitKw"), WriteCategory::EvcsLimit);
        assert_eq!(cat("evcs.c01.ctrl.plugged"), WriteCategory::EvcsPlug);
        assert_eq!(cat("storage.ctrl.enabled"), WriteCategory::StorageEnable);
        assert_eq!(cat("generator.ctrl.powerSetKw"), WriteCategory::Generator);
        assert_eq!(cat("pv.override.enabled"), WriteCategory::PvOverride);
        assert_eq!(cat("pv.weatherFactor"), WriteCategory::Other);
        assert_eq!(cat("tariff.mode"), WriteCategory::Tariff);
    }
}
