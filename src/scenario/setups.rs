//! Initial conditions applied when a scenario is activated.
//!
//! Every setup runs on a freshly reset baseline plant. Points a setup
//! refers to but the configured fleet does not have are skipped.

use tracing::debug;

use crate::devices::ChargerType;
use crate::devices::ev_charger::ChargePoint;

use super::catalog::{ScenarioData, SetupContext};

/// Runs `f` on point `index` if the fleet has it.
pub(crate) fn with_point(ctx: &mut SetupContext<'_>, index: usize, f: impl FnOnce(&mut ChargePoint)) {
    match ctx.model.evcs.get_mut(index) {
        Some(cp) => f(cp),
        None => debug!(index, "scenario refers to a missing charge point, skipped"),
    }
}

fn connect(cp: &mut ChargePoint, soc_pct: f64, target_soc_pct: f64) {
    cp.plug();
    cp.ctrl.enabled = true;
    cp.ctrl.limit_kw = cp.max_kw();
    cp.vehicle.soc_pct = soc_pct;
    cp.vehicle.target_soc_pct = target_soc_pct;
}

pub fn baseline(_ctx: &mut SetupContext<'_>) -> ScenarioData {
    ScenarioData::None
}

const SIX_CARS_SOC: [f64; 6] = [20.0, 35.0, 10.0, 50.0, 25.0, 15.0];

pub fn six_cars_deadline(ctx: &mut SetupContext<'_>) -> ScenarioData {
    let now = ctx.now;
    for (i, soc) in SIX_CARS_SOC.into_iter().enumerate() {
        with_point(ctx, i, |cp| {
            connect(cp, soc, 100.0);
            cp.vehicle.capacity_kwh = 60.0;
            cp.vehicle.set_departure("06:15", now);
        });
    }
    ScenarioData::None
}

const MIXED_PRIORITIES: [u8; 6] = [10, 1, 5, 8, 3, 6];
const MIXED_SOC: [f64; 6] = [15.0, 60.0, 30.0, 45.0, 5.0, 70.0];
const MIXED_DEPARTURES: [&str; 6] = ["07:00", "18:00", "09:30", "08:15", "12:00", "16:45"];

pub fn mixed_priorities(ctx: &mut SetupContext<'_>) -> ScenarioData {
    let now = ctx.now;
    ctx.model.grid.limit_kw = 60.0;
    for i in 0..ctx.model.evcs.len() {
        let k = i % MIXED_PRIORITIES.len();
        with_point(ctx, i, |cp| {
            connect(cp, MIXED_SOC[k], 90.0);
            cp.ctrl.priority = MIXED_PRIORITIES[k];
            cp.vehicle.set_departure(MIXED_DEPARTURES[k], now);
        });
    }
    ScenarioData::None
}

pub fn dc_fast_taper(ctx: &mut SetupContext<'_>) -> ScenarioData {
    ctx.model.grid.limit_kw = ctx.model.grid.limit_kw.max(400.0);
    let mut found = 0;
    for cp in ctx.model.evcs.points_mut() {
        if cp.charger_type == ChargerType::Dc {
            connect(cp, 78.0, 100.0);
            cp.vehicle.capacity_kwh = 80.0;
            found += 1;
        }
    }
    if found == 0 {
        debug!("fleet has no DC points, taper scenario has nothing to charge");
    }
    ScenarioData::None
}

pub fn pv_surplus_midday(ctx: &mut SetupContext<'_>) -> ScenarioData {
    let model = &mut *ctx.model;
    let surplus_kw = (model.pv.installed_kwp * 0.9).max(model.grid.base_load.base_kw * 3.0);
    model.pv.forced.enabled = true;
    model.pv.forced.power_kw = surplus_kw;
    model.grid.base_load.base_kw = (model.grid.base_load.base_kw * 0.5).max(1.0);
    model.storage.soc_pct = 40.0;
    model.storage.ctrl.enabled = true;
    model.storage.ctrl.power_set_kw = 0.0;
    for i in 0..2 {
        with_point(ctx, i, |cp| connect(cp, 40.0, 90.0));
    }
    ScenarioData::None
}

pub fn storage_empty(ctx: &mut SetupContext<'_>) -> ScenarioData {
    let storage = &mut ctx.model.storage;
    storage.soc_pct = 0.0;
    storage.ctrl.enabled = true;
    storage.ctrl.power_set_kw = 0.0;
    ScenarioData::None
}

pub fn storage_full(ctx: &mut SetupContext<'_>) -> ScenarioData {
    let storage = &mut ctx.model.storage;
    storage.soc_pct = 100.0;
    storage.ctrl.enabled = true;
    storage.ctrl.power_set_kw = 0.0;
    ScenarioData::None
}

pub fn grid_limit_drop(ctx: &mut SetupContext<'_>) -> ScenarioData {
    ctx.model.grid.limit_kw = 80.0;
    for i in 0..4 {
        with_point(ctx, i, |cp| connect(cp, 30.0, 90.0));
    }
    ScenarioData::None
}

pub fn grid_blackout(ctx: &mut SetupContext<'_>) -> ScenarioData {
    ctx.model.storage.ctrl.enabled = true;
    for i in 0..3 {
        with_point(ctx, i, |cp| connect(cp, 30.0, 90.0));
    }
    ScenarioData::None
}

pub fn pv_cloud_ramp(ctx: &mut SetupContext<'_>) -> ScenarioData {
    let clear_sky_kw = ctx.model.pv.installed_kwp * 0.9;
    ctx.model.pv.forced.enabled = true;
    ctx.model.pv.forced.power_kw = clear_sky_kw;
    with_point(ctx, 0, |cp| connect(cp, 30.0, 90.0));
    ScenarioData::CloudRamp { clear_sky_kw }
}

pub fn tariff_spike(ctx: &mut SetupContext<'_>) -> ScenarioData {
    let normal_ct = ctx.config.tariff.base_ct_per_kwh;
    ctx.model.tariff.set_manual_price(normal_ct);
    ctx.model.storage.ctrl.enabled = true;
    for i in 0..2 {
        with_point(ctx, i, |cp| connect(cp, 30.0, 90.0));
    }
    ScenarioData::TariffSpike { normal_ct }
}

pub fn charger_fault_recovery(ctx: &mut SetupContext<'_>) -> ScenarioData {
    for i in 0..3 {
        with_point(ctx, i, |cp| connect(cp, 25.0, 90.0));
    }
    ScenarioData::FaultRecovery { entered: None }
}

pub fn plug_storm(ctx: &mut SetupContext<'_>) -> ScenarioData {
    for cp in ctx.model.evcs.points_mut() {
        cp.unplug();
        cp.vehicle.soc_pct = 30.0;
        cp.vehicle.target_soc_pct = 90.0;
    }
    ScenarioData::PlugStorm {
        next_event_s: 0.0,
        toggles: 0,
    }
}

pub fn peak_shaving_staged(ctx: &mut SetupContext<'_>) -> ScenarioData {
    ctx.model.storage.soc_pct = 80.0;
    ScenarioData::Staged { entered: None }
}

pub fn fuzz(ctx: &mut SetupContext<'_>) -> ScenarioData {
    for i in 0..2 {
        with_point(ctx, i, |cp| connect(cp, 30.0, 90.0));
    }
    ScenarioData::Fuzz {
        next_event_s: 0.0,
        events: 0,
    }
}
