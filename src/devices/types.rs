//! Common types and traits for per-tick device physics.

use crate::rng::DeterministicRandom;

/// Contextual information passed to devices during a physics step.
///
/// # Fields
/// * `dt_hours` - Length of the current tick in fractional hours
/// * `hour` - Local time of day in fractional hours `[0, 24)`
/// * `rng` - Shared physics noise source; call order is part of the reproducible state
pub struct TickContext<'a> {
    pub dt_hours: f64,
    pub hour: f64,
    pub rng: &'a mut DeterministicRandom,
}

impl<'a> TickContext<'a> {
    /// Creates a context for one tick.
    ///
    /// A non-finite or negative `dt_hours` is replaced by zero so no device
    /// integrates garbage.
    pub fn new(dt_hours: f64, hour: f64, rng: &'a mut DeterministicRandom) -> Self {
        let dt_hours = if dt_hours.is_finite() { dt_hours.max(0.0) } else { 0.0 };
        let hour = if hour.is_finite() { hour.rem_euclid(24.0) } else { 0.0 };
        Self { dt_hours, hour, rng }
    }
}

/// Trait defining a device that produces or consumes electricity.
///
/// Each device owns its measured state and advances it once per tick. The
/// grid balance sums [`Device::grid_kw`] over all devices
/// (see [`net_grid_kw`](crate::sim::power_balance::net_grid_kw)).
pub trait Device {
    /// Advances the device by one tick, updating its measured power and any
    /// integrated state (SoC, energy counters).
    fn step(&mut self, ctx: &mut TickContext<'_>);

    /// Contribution to the grid connection point after the last step.
    ///
    /// Positive values indicate power consumption (load),
    /// negative values indicate power generation.
    fn grid_kw(&self) -> f64;
}

/// Replaces a non-finite value with `fallback`.
pub(crate) fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_sanitizes_inputs() {
        let mut rng = DeterministicRandom::new(1);
        let ctx = TickContext::new(f64::NAN, 25.5, &mut rng);
        assert_eq!(ctx.dt_hours, 0.0);
        assert!((ctx.hour - 1.5).abs() < 1e-12);

        let ctx = TickContext::new(-1.0, -2.0, &mut rng);
        assert_eq!(ctx.dt_hours, 0.0);
        assert!((ctx.hour - 22.0).abs() < 1e-12);
    }

    #[test]
    fn finite_or_replaces_nan() {
        assert_eq!(finite_or(f64::NAN, 3.0), 3.0);
        assert_eq!(finite_or(f64::NEG_INFINITY, 3.0), 3.0);
        assert_eq!(finite_or(2.0, 3.0), 2.0);
    }
}
