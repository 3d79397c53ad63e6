//! Dynamic electricity tariff with an hourly forward curve.

use std::fmt;

use serde::Serialize;

use crate::config::{TariffConfig, TariffModeConfig};
use crate::rng::DeterministicRandom;

/// Hard price bounds (ct/kWh).
pub const PRICE_MIN_CT: f64 = -500.0;
pub const PRICE_MAX_CT: f64 = 500.0;

/// Hour of the day profile's zero crossing.
const PROFILE_PHASE_H: f64 = 7.0;
/// Standard deviation of the auto-mode price noise (ct/kWh).
const PRICE_NOISE_STD: f64 = 0.4;

/// Whether the price follows the day profile or is held by command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TariffMode {
    Auto,
    Manual,
}

impl TariffMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl From<TariffModeConfig> for TariffMode {
    fn from(mode: TariffModeConfig) -> Self {
        match mode {
            TariffModeConfig::Auto => Self::Auto,
            TariffModeConfig::Manual => Self::Manual,
        }
    }
}

impl fmt::Display for TariffMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Noise-free day-profile price at `hour`.
pub fn profile_price(base: f64, amplitude: f64, hour: f64) -> f64 {
    let angle = 2.0 * std::f64::consts::PI * (hour - PROFILE_PHASE_H) / 24.0;
    (base + amplitude * angle.sin()).clamp(PRICE_MIN_CT, PRICE_MAX_CT)
}

/// Tariff state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tariff {
    pub mode: TariffMode,
    pub price_ct_per_kwh: f64,
    pub base_ct_per_kwh: f64,
    pub amplitude_ct_per_kwh: f64,
    /// 24 hourly prices starting at the current full hour.
    pub forward_curve_24h: Vec<f64>,
}

impl Tariff {
    pub fn from_config(cfg: &TariffConfig) -> Self {
        Self {
            mode: cfg.mode.into(),
            price_ct_per_kwh: cfg.base_ct_per_kwh.clamp(PRICE_MIN_CT, PRICE_MAX_CT),
            base_ct_per_kwh: cfg.base_ct_per_kwh,
            amplitude_ct_per_kwh: cfg.amplitude_ct_per_kwh.max(0.0),
            forward_curve_24h: Vec::new(),
        }
    }

    /// Recomputes the price and the forward curve for `hour`.
    ///
    /// Auto mode draws one normal sample; manual mode draws nothing.
    pub fn step(&mut self, hour: f64, rng: &mut DeterministicRandom) {
        if self.mode == TariffMode::Auto {
            let noisy = profile_price(self.base_ct_per_kwh, self.amplitude_ct_per_kwh, hour)
                + rng.normal(0.0, PRICE_NOISE_STD);
            if noisy.is_finite() {
                self.price_ct_per_kwh = noisy.clamp(PRICE_MIN_CT, PRICE_MAX_CT);
            }
        }
        self.forward_curve_24h = self.forward_curve(hour);
    }

    /// Hourly forward prices from `floor(hour)` on. Flat at the current
    /// price in manual mode.
    pub fn forward_curve(&self, hour: f64) -> Vec<f64> {
        let (base, amplitude) = match self.mode {
            TariffMode::Auto => (self.base_ct_per_kwh, self.amplitude_ct_per_kwh),
            TariffMode::Manual => (self.price_ct_per_kwh, 0.0),
        };
        let start = hour.floor();
        (0..24)
            .map(|k| profile_price(base, amplitude, (start + f64::from(k)).rem_euclid(24.0)))
            .collect()
    }

    /// Switches to manual mode at a fixed price.
    pub fn set_manual_price(&mut self, price: f64) {
        self.mode = TariffMode::Manual;
        self.price_ct_per_kwh = price.clamp(PRICE_MIN_CT, PRICE_MAX_CT);
    }
}
