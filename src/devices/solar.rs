use serde::Serialize;

use crate::devices::types::{Device, TickContext, finite_or};

/// Upper bound accepted for a forced PV output (kW).
pub const PV_OVERRIDE_MAX_KW: f64 = 100_000.0;

/// Relative standard deviation of the PV output noise.
const PV_NOISE_STD: f64 = 0.02;

/// Daylight shape: 0 outside `[6, 20]`, half-sine between.
///
/// # Arguments
///
/// * `hour` - Local time of day in fractional hours
///
/// # Examples
///
/// ```
/// use plant_sim::devices::solar::solar_profile;
///
/// assert_eq!(solar_profile(3.0), 0.0);
/// assert!((solar_profile(13.0) - 1.0).abs() < 1e-12);
/// ```
pub fn solar_profile(hour: f64) -> f64 {
    if !(6.0..=20.0).contains(&hour) {
        return 0.0;
    }
    (std::f64::consts::PI * (hour - 6.0) / 14.0).sin().max(0.0)
}

/// Forced PV output, bypassing the weather model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PvOverride {
    pub enabled: bool,
    pub power_kw: f64,
}

/// A rooftop PV plant with a weather derating factor.
///
/// # Power Flow Convention
/// `power_kw` is the (non-negative) generation. [`Device::grid_kw`] returns
/// it negated, since generation reduces the site load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pv {
    /// Installed peak power in kWp.
    pub installed_kwp: f64,
    /// Weather derating factor `[0, 1]`.
    pub weather_factor: f64,
    /// Measured generation after the last step.
    pub power_kw: f64,
    /// Forced output used by scenarios and the EMS test harness.
    #[serde(rename = "override")]
    pub forced: PvOverride,
}

impl Pv {
    /// Creates a PV plant with no override.
    pub fn new(installed_kwp: f64, weather_factor: f64) -> Self {
        Self {
            installed_kwp: finite_or(installed_kwp, 0.0).max(0.0),
            weather_factor: finite_or(weather_factor, 0.0).clamp(0.0, 1.0),
            power_kw: 0.0,
            forced: PvOverride::default(),
        }
    }
}

impl Device for Pv {
    /// Noise is drawn only when the override is off.
    fn step(&mut self, ctx: &mut TickContext<'_>) {
        if self.forced.enabled {
            self.power_kw = finite_or(self.forced.power_kw, 0.0).clamp(0.0, PV_OVERRIDE_MAX_KW);
            return;
        }
        let noise = 1.0 + ctx.rng.normal(0.0, PV_NOISE_STD);
        let kwp = self.installed_kwp.max(0.0);
        let raw = kwp * self.weather_factor.clamp(0.0, 1.0) * solar_profile(ctx.hour) * noise;
        self.power_kw = finite_or(raw, 0.0).clamp(0.0, kwp);
    }

    fn grid_kw(&self) -> f64 {
        -self.power_kw
    }
}
