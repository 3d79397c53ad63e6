use serde::Serialize;

use crate::devices::types::{Device, TickContext, finite_or};

/// Uncontrollable site consumption with Gaussian noise.
///
/// Each step samples `base_kw + N(0, noise_pct% · base_kw)`, floored at zero.
///
/// # Examples
///
/// ```
/// use plant_sim::devices::Device;
/// use plant_sim::devices::baseload::BaseLoad;
/// use plant_sim::devices::types::TickContext;
/// use plant_sim::rng::DeterministicRandom;
///
/// let mut load = BaseLoad::new(15.0, 0.0);
/// let mut rng = DeterministicRandom::new(42);
/// load.step(&mut TickContext::new(0.01, 12.0, &mut rng));
/// assert_eq!(load.power_kw, 15.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseLoad {
    /// Mean consumption in kilowatts.
    pub base_kw: f64,
    /// Noise standard deviation as a percentage of `base_kw`.
    pub noise_pct: f64,
    /// Last sampled consumption.
    pub power_kw: f64,
}

impl BaseLoad {
    pub fn new(base_kw: f64, noise_pct: f64) -> Self {
        let base_kw = finite_or(base_kw, 0.0).max(0.0);
        Self {
            base_kw,
            noise_pct: finite_or(noise_pct, 0.0).max(0.0),
            power_kw: base_kw,
        }
    }
}

impl Device for BaseLoad {
    fn step(&mut self, ctx: &mut TickContext<'_>) {
        let base = finite_or(self.base_kw, 0.0).max(0.0);
        let sigma = base * self.noise_pct / 100.0;
        self.power_kw = finite_or(ctx.rng.normal(base, sigma), base).max(0.0);
    }

    fn grid_kw(&self) -> f64 {
        self.power_kw
    }
}
