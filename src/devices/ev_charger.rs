use std::fmt;

use serde::Serialize;

use crate::devices::types::{Device, TickContext, finite_or};
use crate::model::evcs::Vehicle;

/// Fraction of drawn energy that ends up in the vehicle battery.
pub const CHARGE_EFFICIENCY: f64 = 0.96;

/// Power below which a charging session is reported as suspended.
const MIN_CHARGING_KW: f64 = 0.01;

/// SoC slack under the target at which a session counts as finished.
const TARGET_TOLERANCE_PCT: f64 = 0.01;

/// DC fast-charge taper factor for a given vehicle SoC.
///
/// Full power up to 80 %, then a linear ramp down to 20 % of nominal at
/// 100 % SoC. Always within `[0.2, 1]`.
///
/// # Examples
///
/// ```
/// use plant_sim::devices::ev_charger::taper;
///
/// assert_eq!(taper(50.0), 1.0);
/// assert!((taper(90.0) - 0.6).abs() < 1e-12);
/// assert!((taper(100.0) - 0.2).abs() < 1e-12);
/// ```
pub fn taper(soc_pct: f64) -> f64 {
    let soc = finite_or(soc_pct, 0.0);
    if soc <= 80.0 {
        return 1.0;
    }
    (1.0 - 0.8 * (soc - 80.0) / 20.0).clamp(0.2, 1.0)
}

/// Connector type of a charge point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargerType {
    Ac,
    Dc,
}

impl fmt::Display for ChargerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ac => f.write_str("ac"),
            Self::Dc => f.write_str("dc"),
        }
    }
}

/// Test-harness fault switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FaultInjection {
    pub faulted: bool,
    pub unavailable: bool,
    pub meter_freeze: bool,
}

/// EMS-facing controls of a charge point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChargeControl {
    pub enabled: bool,
    pub limit_kw: f64,
    pub plugged: bool,
    /// Session priority `[1, 10]`.
    pub priority: u8,
}

/// OCPP-like charge point status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ChargeStatus {
    #[default]
    Available,
    Preparing,
    Charging,
    Suspended,
    Finished,
    Faulted,
    Unavailable,
}

impl ChargeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Preparing => "Preparing",
            Self::Charging => "Charging",
            Self::Suspended => "Suspended",
            Self::Finished => "Finished",
            Self::Faulted => "Faulted",
            Self::Unavailable => "Unavailable",
        }
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Meter readings of a charge point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChargeMeasurement {
    pub status: ChargeStatus,
    pub power_kw: f64,
    /// Session energy, reset on unplug.
    pub energy_kwh: f64,
}

/// A single EV charge point with its connected vehicle.
///
/// # Power Flow Convention (Feeder)
/// Charging power is a load; [`Device::grid_kw`] returns it unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargePoint {
    pub id: String,
    #[serde(rename = "type")]
    pub charger_type: ChargerType,
    max_kw: f64,
    pub sim: FaultInjection,
    pub ctrl: ChargeControl,
    pub vehicle: Vehicle,
    pub meas: ChargeMeasurement,
}

impl ChargePoint {
    /// Creates an unplugged, enabled charge point with its limit at the rating.
    pub fn new(id: impl Into<String>, charger_type: ChargerType, max_kw: f64, vehicle: Vehicle) -> Self {
        let max_kw = finite_or(max_kw, 0.0).max(0.0);
        Self {
            id: id.into(),
            charger_type,
            max_kw,
            sim: FaultInjection::default(),
            ctrl: ChargeControl {
                enabled: true,
                limit_kw: max_kw,
                plugged: false,
                priority: 5,
            },
            vehicle,
            meas: ChargeMeasurement::default(),
        }
    }

    /// Hardware rating in kW, fixed at construction.
    pub fn max_kw(&self) -> f64 {
        self.max_kw
    }

    /// The power ceiling for the current controls and vehicle.
    pub fn ceiling_kw(&self) -> f64 {
        finite_or(self.ctrl.limit_kw, 0.0)
            .min(self.max_kw)
            .min(finite_or(self.vehicle.max_charge_kw, 0.0))
            .max(0.0)
    }

    /// Connects the vehicle.
    pub fn plug(&mut self) {
        self.ctrl.plugged = true;
    }

    /// Disconnects the vehicle and ends the metering session.
    pub fn unplug(&mut self) {
        self.ctrl.plugged = false;
        self.reset_session();
    }

    /// Zeroes the session energy counter and the measured power.
    pub fn reset_session(&mut self) {
        self.meas.energy_kwh = 0.0;
        self.meas.power_kw = 0.0;
        if !self.sim.faulted && !self.sim.unavailable && !self.ctrl.plugged {
            self.meas.status = ChargeStatus::Available;
        }
    }

    fn idle(&mut self, status: ChargeStatus) {
        self.meas.power_kw = 0.0;
        self.meas.status = status;
    }

    fn charge(&mut self, dt_hours: f64) {
        let vehicle = &mut self.vehicle;
        let capacity = finite_or(vehicle.capacity_kwh, 0.0).max(1e-6);
        let target = finite_or(vehicle.target_soc_pct, 100.0).clamp(0.0, 100.0);
        let soc = finite_or(vehicle.soc_pct, 0.0).clamp(0.0, 100.0);

        let mut p = finite_or(self.ctrl.limit_kw, 0.0)
            .min(self.max_kw)
            .min(finite_or(vehicle.max_charge_kw, 0.0))
            .max(0.0);
        if self.charger_type == ChargerType::Dc {
            p *= taper(soc);
        }
        if dt_hours > 0.0 {
            let needed_kwh = ((target - soc) / 100.0 * capacity).max(0.0);
            p = p.min(needed_kwh / dt_hours);
        }

        let delivered_kwh = p * dt_hours * CHARGE_EFFICIENCY;
        vehicle.soc_pct = (soc + delivered_kwh / capacity * 100.0).clamp(0.0, target.max(soc));
        self.meas.energy_kwh += delivered_kwh;
        self.meas.power_kw = p;
        self.meas.status = if p > MIN_CHARGING_KW {
            ChargeStatus::Charging
        } else {
            ChargeStatus::Suspended
        };
    }
}

impl Device for ChargePoint {
    /// Evaluates the charge point, first matching rule wins:
    /// unavailable, faulted, frozen meter, unplugged, at target, disabled,
    /// then charging.
    fn step(&mut self, ctx: &mut TickContext<'_>) {
        if self.sim.unavailable {
            self.idle(ChargeStatus::Unavailable);
        } else if self.sim.faulted {
            self.idle(ChargeStatus::Faulted);
        } else if self.sim.meter_freeze {
            // frozen readings keep contributing their last power
        } else if !self.ctrl.plugged {
            self.idle(ChargeStatus::Available);
        } else if self.vehicle.soc_pct >= self.vehicle.target_soc_pct - TARGET_TOLERANCE_PCT {
            self.idle(ChargeStatus::Finished);
        } else if !self.ctrl.enabled {
            self.idle(ChargeStatus::Preparing);
        } else {
            self.charge(ctx.dt_hours);
        }
    }

    fn grid_kw(&self) -> f64 {
        self.meas.power_kw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::DeterministicRandom;
    use approx::assert_relative_eq;

    fn vehicle(soc: f64, max_kw: f64) -> Vehicle {
        Vehicle {
            id: "EV-01".to_string(),
            soc_pct: soc,
            capacity_kwh: 60.0,
            max_charge_kw: max_kw,
            target_soc_pct: 100.0,
            departure_time: String::new(),
            departure_ts: None,
        }
    }

    fn ac(soc: f64) -> ChargePoint {
        let mut cp = ChargePoint::new("c01", ChargerType::Ac, 22.0, vehicle(soc, 11.0));
        cp.plug();
        cp
    }

    fn dc(soc: f64) -> ChargePoint {
        let mut cp = ChargePoint::new("c04", ChargerType::Dc, 150.0, vehicle(soc, 150.0));
        cp.plug();
        cp
    }

    fn step(cp: &mut ChargePoint, dt_hours: f64) {
        let mut rng = DeterministicRandom::new(0);
        cp.step(&mut TickContext::new(dt_hours, 12.0, &mut rng));
    }

    #[test]
    fn taper_shape() {
        assert_eq!(taper(0.0), 1.0);
        assert_eq!(taper(80.0), 1.0);
        assert_relative_eq!(taper(85.0), 0.8, epsilon = 1e-12);
        assert_relative_eq!(taper(100.0), 0.2, epsilon = 1e-12);
        assert_relative_eq!(taper(120.0), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn ac_point_charges_at_vehicle_limit() {
        let mut cp = ac(20.0);
        step(&mut cp, 1.0 / 60.0);
        assert_eq!(cp.meas.status, ChargeStatus::Charging);
        assert_relative_eq!(cp.meas.power_kw, 11.0);
        assert_relative_eq!(cp.meas.energy_kwh, 11.0 / 60.0 * CHARGE_EFFICIENCY, epsilon = 1e-12);
        assert!(cp.vehicle.soc_pct > 20.0);
    }

    #[test]
    fn limit_caps_power() {
        let mut cp = ac(20.0);
        cp.ctrl.limit_kw = 4.0;
        step(&mut cp, 0.01);
        assert_relative_eq!(cp.meas.power_kw, 4.0);
    }

    #[test]
    fn zero_limit_suspends() {
        let mut cp = ac(20.0);
        cp.ctrl.limit_kw = 0.0;
        step(&mut cp, 0.01);
        assert_eq!(cp.meas.status, ChargeStatus::Suspended);
        assert_eq!(cp.meas.power_kw, 0.0);
    }

    #[test]
    fn dc_tapers_above_eighty_percent() {
        let mut cp = dc(90.0);
        cp.vehicle.target_soc_pct = 100.0;
        step(&mut cp, 1.0 / 3600.0);
        assert_relative_eq!(cp.meas.power_kw, 150.0 * 0.6, epsilon = 1e-9);
    }

    #[test]
    fn never_overshoots_target() {
        let mut cp = ac(79.0);
        cp.vehicle.target_soc_pct = 80.0;
        step(&mut cp, 1.0);
        assert!(cp.vehicle.soc_pct <= 80.0);
        // 0.6 kWh needed, so the power is clamped well below the 11 kW ceiling.
        assert!(cp.meas.power_kw <= 0.6 + 1e-9);
    }

    #[test]
    fn at_target_reports_finished() {
        let mut cp = ac(80.0);
        cp.vehicle.target_soc_pct = 80.0;
        step(&mut cp, 0.01);
        assert_eq!(cp.meas.status, ChargeStatus::Finished);
        assert_eq!(cp.meas.power_kw, 0.0);
    }

    #[test]
    fn disabled_reports_preparing() {
        let mut cp = ac(20.0);
        cp.ctrl.enabled = false;
        step(&mut cp, 0.01);
        assert_eq!(cp.meas.status, ChargeStatus::Preparing);
    }

    #[test]
    fn unplugged_reports_available() {
        let mut cp = ac(20.0);
        cp.unplug();
        step(&mut cp, 0.01);
        assert_eq!(cp.meas.status, ChargeStatus::Available);
        assert_eq!(cp.meas.power_kw, 0.0);
    }

    #[test]
    fn faults_override_everything_and_keep_energy() {
        let mut cp = ac(20.0);
        step(&mut cp, 0.1);
        let energy = cp.meas.energy_kwh;
        cp.sim.faulted = true;
        cp.sim.meter_freeze = true;
        step(&mut cp, 0.1);
        assert_eq!(cp.meas.status, ChargeStatus::Faulted);
        assert_eq!(cp.meas.power_kw, 0.0);
        assert_eq!(cp.meas.energy_kwh, energy);

        cp.sim.unavailable = true;
        step(&mut cp, 0.1);
        assert_eq!(cp.meas.status, ChargeStatus::Unavailable);
    }

    #[test]
    fn frozen_meter_holds_prior_values() {
        let mut cp = ac(20.0);
        step(&mut cp, 0.1);
        let before = cp.meas;
        let soc = cp.vehicle.soc_pct;
        cp.sim.meter_freeze = true;
        step(&mut cp, 0.1);
        assert_eq!(cp.meas, before);
        assert_eq!(cp.vehicle.soc_pct, soc);
        assert_eq!(cp.grid_kw(), before.power_kw);
    }

    #[test]
    fn unplug_resets_session_energy() {
        let mut cp = ac(20.0);
        step(&mut cp, 0.1);
        assert!(cp.meas.energy_kwh > 0.0);
        cp.unplug();
        assert_eq!(cp.meas.energy_kwh, 0.0);
        assert!(!cp.ctrl.plugged);
    }

    #[test]
    fn ceiling_is_minimum_of_three_limits() {
        let mut cp = dc(10.0);
        cp.ctrl.limit_kw = 200.0;
        cp.vehicle.max_charge_kw = 120.0;
        assert_eq!(cp.ceiling_kw(), 120.0);
        cp.ctrl.limit_kw = 50.0;
        assert_eq!(cp.ceiling_kw(), 50.0);
    }
}
