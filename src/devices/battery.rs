use serde::Serialize;

use crate::devices::types::{Device, TickContext, finite_or};

/// Controller setpoint for a controllable asset.
///
/// `power_set_kw` is only honored while `enabled` is true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Setpoint {
    pub enabled: bool,
    pub power_set_kw: f64,
}

/// A stationary battery storage system.
///
/// # Power Flow Convention (Storage)
/// - Positive `power_kw`: discharging (supplying the site, reduces SoC)
/// - Negative `power_kw`: charging (consuming from the site, raises SoC)
///
/// This is the opposite of the feeder convention; [`Device::grid_kw`]
/// returns `-power_kw`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Storage {
    /// Usable capacity in kilowatt-hours.
    pub capacity_kwh: f64,
    /// Maximum charge power in kilowatts (positive value).
    pub max_charge_kw: f64,
    /// Maximum discharge power in kilowatts (positive value).
    pub max_discharge_kw: f64,
    /// State of charge in percent (0 to 100).
    pub soc_pct: f64,
    /// Measured power after the last step.
    pub power_kw: f64,
    /// EMS setpoint.
    pub ctrl: Setpoint,
}

impl Storage {
    /// Creates an idle storage unit.
    ///
    /// Values are sanitized rather than rejected: capacity is floored at
    /// 1 kWh, ceilings at 0 kW and SoC clamped to `[0, 100]`.
    pub fn new(capacity_kwh: f64, max_charge_kw: f64, max_discharge_kw: f64, soc_pct: f64) -> Self {
        Self {
            capacity_kwh: finite_or(capacity_kwh, 1.0).max(1.0),
            max_charge_kw: finite_or(max_charge_kw, 0.0).max(0.0),
            max_discharge_kw: finite_or(max_discharge_kw, 0.0).max(0.0),
            soc_pct: finite_or(soc_pct, 0.0).clamp(0.0, 100.0),
            power_kw: 0.0,
            ctrl: Setpoint::default(),
        }
    }

    /// Power the unit will actually run at for the current setpoint and SoC.
    pub fn effective_power_kw(&self) -> f64 {
        if !self.ctrl.enabled {
            return 0.0;
        }
        let requested = finite_or(self.ctrl.power_set_kw, 0.0)
            .clamp(-self.max_charge_kw, self.max_discharge_kw);
        if requested > 0.0 && self.soc_pct <= 0.0 {
            return 0.0;
        }
        if requested < 0.0 && self.soc_pct >= 100.0 {
            return 0.0;
        }
        requested
    }
}

impl Device for Storage {
    fn step(&mut self, ctx: &mut TickContext<'_>) {
        let p = self.effective_power_kw();
        let delta_pct = -p * ctx.dt_hours / self.capacity_kwh.max(1e-9) * 100.0;
        self.soc_pct = finite_or(self.soc_pct + delta_pct, self.soc_pct).clamp(0.0, 100.0);
        self.power_kw = p;
    }

    fn grid_kw(&self) -> f64 {
        -self.power_kw
    }
}
