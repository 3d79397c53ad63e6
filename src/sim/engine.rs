//! Tick simulator that advances the plant model by one timestep.

use chrono::NaiveDateTime;

use crate::devices::{Device, TickContext};
use crate::model::PlantModel;
use crate::rng::DeterministicRandom;

use super::clock::{TickClock, hour_of_day};
use super::power_balance::{grid_balance, net_grid_kw};
use super::types::TickResult;

/// Physics engine owning the noise source and the tick clock.
///
/// The plant itself is passed in by reference on every step; the engine
/// keeps no copy of it.
#[derive(Debug, Clone)]
pub struct TickSimulator {
    rng: DeterministicRandom,
    clock: TickClock,
}

impl TickSimulator {
    /// Creates a simulator.
    ///
    /// # Arguments
    ///
    /// * `seed` - Seed of the physics noise stream
    /// * `interval_ms` - Nominal tick period, used for the first tick
    pub fn new(seed: u32, interval_ms: u64) -> Self {
        Self {
            rng: DeterministicRandom::new(seed),
            clock: TickClock::new(interval_ms),
        }
    }

    /// Executes one tick at `now` and returns its record.
    ///
    /// Order: tariff, PV, flexible devices, storage, charge points, base
    /// load, grid balance. The order fixes which noise draws each stage
    /// consumes.
    pub fn step(&mut self, model: &mut PlantModel, now: NaiveDateTime) -> TickResult {
        let dt_s = self.clock.advance(now);
        let hour = hour_of_day(now);

        // 1. Tariff
        model.tariff.step(hour, &mut self.rng);

        let mut ctx = TickContext::new(dt_s / 3600.0, hour, &mut self.rng);

        // 2. Devices
        model.pv.step(&mut ctx);
        for device in model.devices.iter_mut() {
            device.step(&mut ctx);
        }
        model.storage.step(&mut ctx);
        model.evcs.step(&mut ctx);
        model.grid.base_load.step(&mut ctx);

        // 3. Balance
        let contributors: [&dyn Device; 7] = [
            &model.grid.base_load,
            &model.devices.heatpump,
            &model.evcs,
            &model.pv,
            &model.devices.chp,
            &model.devices.generator,
            &model.storage,
        ];
        let net = net_grid_kw(contributors);
        let balance = grid_balance(net, model.grid.available, model.grid.limit_kw);
        model.grid.power_kw = balance.power_kw;
        model.grid.over_limit = balance.over_limit;

        TickResult {
            tick: self.clock.ticks(),
            time: now,
            dt_s,
            price_ct_per_kwh: model.tariff.price_ct_per_kwh,
            base_load_kw: model.grid.base_load.power_kw,
            pv_kw: model.pv.power_kw,
            storage_kw: model.storage.power_kw,
            storage_soc_pct: model.storage.soc_pct,
            heatpump_kw: model.devices.heatpump.power_kw,
            chp_kw: model.devices.chp.power_kw,
            generator_kw: model.devices.generator.power_kw,
            ev_total_kw: model.evcs.total_power_kw(),
            grid_kw: balance.power_kw,
            grid_available: model.grid.available,
            over_limit: balance.over_limit,
        }
    }

    /// Number of ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.clock.ticks()
    }
}
