//! Time-staged mutations invoked every tick while a scenario runs.
//!
//! Each timeline partitions elapsed time into ordered, non-overlapping
//! stages and returns [`TimelinePhase::Done`](super::catalog::TimelinePhase)
//! once its last stage has passed.

use rand::seq::SliceRandom;

use crate::model::PlantModel;

use super::catalog::{MAX_BURSTS_PER_TICK, ScenarioData, TimelineContext, TimelineStep};

pub fn grid_limit_drop(ctx: &mut TimelineContext<'_>) -> TimelineStep {
    let t = ctx.elapsed_s;
    let (limit, done) = match t {
        t if t < 60.0 => (80.0, false),
        t if t < 180.0 => (25.0, false),
        t if t < 240.0 => (80.0, false),
        _ => (80.0, true),
    };
    ctx.model.grid.limit_kw = limit;
    if done {
        TimelineStep::done(format!("limit back at {limit:.0} kW"))
    } else {
        TimelineStep::active(format!("limit {limit:.0} kW"))
    }
}

pub fn grid_blackout(ctx: &mut TimelineContext<'_>) -> TimelineStep {
    let t = ctx.elapsed_s;
    if t < 30.0 {
        ctx.model.grid.available = true;
        TimelineStep::active("grid up, blackout at 30 s")
    } else if t < 90.0 {
        ctx.model.grid.available = false;
        TimelineStep::active("blackout")
    } else if t < 120.0 {
        ctx.model.grid.available = true;
        TimelineStep::active("grid restored")
    } else {
        ctx.model.grid.available = true;
        TimelineStep::done("grid restored")
    }
}

/// Cloud attenuation factor at `t` seconds.
fn cloud_factor(t: f64) -> f64 {
    const FLOOR: f64 = 0.2;
    if t < 30.0 {
        1.0
    } else if t < 90.0 {
        1.0 - (1.0 - FLOOR) * (t - 30.0) / 60.0
    } else if t < 150.0 {
        FLOOR
    } else if t < 210.0 {
        FLOOR + (1.0 - FLOOR) * (t - 150.0) / 60.0
    } else {
        1.0
    }
}

pub fn pv_cloud_ramp(ctx: &mut TimelineContext<'_>) -> TimelineStep {
    let clear_sky_kw = match *ctx.data {
        ScenarioData::CloudRamp { clear_sky_kw } => clear_sky_kw,
        _ => ctx.model.pv.installed_kwp * 0.9,
    };
    let factor = cloud_factor(ctx.elapsed_s);
    ctx.model.pv.forced.enabled = true;
    ctx.model.pv.forced.power_kw = clear_sky_kw * factor;
    let status = format!("PV at {:.0} %", factor * 100.0);
    if ctx.elapsed_s >= 210.0 {
        TimelineStep::done(status)
    } else {
        TimelineStep::active(status)
    }
}

pub fn tariff_spike(ctx: &mut TimelineContext<'_>) -> TimelineStep {
    let normal_ct = match *ctx.data {
        ScenarioData::TariffSpike { normal_ct } => normal_ct,
        _ => ctx.config.tariff.base_ct_per_kwh,
    };
    let t = ctx.elapsed_s;
    let (price, done) = match t {
        t if t < 60.0 => (normal_ct, false),
        t if t < 120.0 => (250.0, false),
        t if t < 180.0 => (-20.0, false),
        _ => (normal_ct, true),
    };
    ctx.model.tariff.set_manual_price(price);
    let status = format!("price {price:.1} ct/kWh");
    if done {
        TimelineStep::done(status)
    } else {
        TimelineStep::active(status)
    }
}

/// Fault flags per stage for points c01..c03: `(unavailable, faulted, meter_freeze)`.
const FAULT_STAGES: [[(bool, bool, bool); 3]; 5] = [
    [(false, false, false); 3],
    [(false, false, false), (false, true, false), (false, false, false)],
    [(false, false, false), (false, false, false), (false, false, true)],
    [(true, false, false), (false, false, false), (false, false, false)],
    [(false, false, false); 3],
];

const FAULT_STAGE_STATUS: [&str; 5] = [
    "all points healthy",
    "c02 faulted",
    "c02 recovered, c03 meter frozen",
    "c03 recovered, c01 unavailable",
    "all points recovered",
];

fn apply_fault_stage(model: &mut PlantModel, stage: usize) {
    for (i, (unavailable, faulted, meter_freeze)) in FAULT_STAGES[stage].into_iter().enumerate() {
        if let Some(cp) = model.evcs.get_mut(i) {
            cp.sim.unavailable = unavailable;
            cp.sim.faulted = faulted;
            cp.sim.meter_freeze = meter_freeze;
        }
    }
}

pub fn charger_fault_recovery(ctx: &mut TimelineContext<'_>) -> TimelineStep {
    let stage = ((ctx.elapsed_s.max(0.0) / 60.0) as usize).min(FAULT_STAGES.len() - 1);
    let entered = match *ctx.data {
        ScenarioData::FaultRecovery { entered } => entered,
        _ => None,
    };
    if entered != Some(stage) {
        apply_fault_stage(ctx.model, stage);
        *ctx.data = ScenarioData::FaultRecovery {
            entered: Some(stage),
        };
    }
    let status = FAULT_STAGE_STATUS[stage];
    if stage == FAULT_STAGES.len() - 1 {
        TimelineStep::done(status)
    } else {
        TimelineStep::active(status)
    }
}

pub fn plug_storm(ctx: &mut TimelineContext<'_>) -> TimelineStep {
    const BURST_INTERVAL_S: f64 = 2.0;
    const STORM_END_S: f64 = 120.0;

    let (mut next_event_s, mut toggles) = match *ctx.data {
        ScenarioData::PlugStorm {
            next_event_s,
            toggles,
        } => (next_event_s, toggles),
        _ => (0.0, 0),
    };
    if ctx.elapsed_s >= STORM_END_S {
        return TimelineStep::done(format!("storm over after {toggles} toggles"));
    }

    let n = ctx.model.evcs.len();
    let mut bursts = 0;
    while ctx.elapsed_s >= next_event_s && bursts < MAX_BURSTS_PER_TICK && n > 0 {
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut *ctx.rng);
        let count = 1 + ctx.rng.index((n / 2).max(1));
        for &i in order.iter().take(count) {
            let soc = ctx.rng.range(10.0, 80.0);
            if let Some(cp) = ctx.model.evcs.get_mut(i) {
                if cp.ctrl.plugged {
                    cp.unplug();
                } else {
                    cp.vehicle.soc_pct = soc;
                    cp.plug();
                }
                toggles += 1;
            }
        }
        next_event_s += BURST_INTERVAL_S;
        bursts += 1;
    }
    *ctx.data = ScenarioData::PlugStorm {
        next_event_s,
        toggles,
    };
    let plugged = ctx.model.evcs.points().iter().filter(|cp| cp.ctrl.plugged).count();
    TimelineStep::active(format!("{plugged}/{n} plugged, {toggles} toggles"))
}

/// Boundaries of the staged peak-shaving stages (seconds).
const PEAK_STAGE_STARTS: [f64; 4] = [0.0, 60.0, 120.0, 180.0];
const PEAK_END_S: f64 = 240.0;

const PEAK_STAGE_STATUS: [&str; 4] = [
    "stage 1/4: fleet plugged, limit 60 kW",
    "stage 2/4: heat pump 40 kW",
    "stage 3/4: limit 40 kW",
    "stage 4/4: PV relief 25 kW, heat pump off",
];

fn enter_peak_stage(model: &mut PlantModel, stage: usize) {
    match stage {
        0 => {
            for cp in model.evcs.points_mut().iter_mut().take(4) {
                cp.plug();
                cp.ctrl.enabled = true;
                cp.ctrl.limit_kw = cp.max_kw();
                cp.vehicle.soc_pct = 30.0;
                cp.vehicle.target_soc_pct = 90.0;
            }
            model.grid.limit_kw = 60.0;
            model.pv.forced.enabled = true;
            model.pv.forced.power_kw = 0.0;
        }
        1 => {
            model.devices.heatpump.ctrl.enabled = true;
            model.devices.heatpump.ctrl.power_set_kw = 40.0;
        }
        2 => model.grid.limit_kw = 40.0,
        _ => {
            model.devices.heatpump.ctrl.enabled = false;
            model.pv.forced.power_kw = 25.0;
        }
    }
}

/// Multi-stage timeline. Each stage's entry actions run exactly once,
/// including stages skipped over by a long tick.
pub fn peak_shaving_staged(ctx: &mut TimelineContext<'_>) -> TimelineStep {
    if ctx.elapsed_s >= PEAK_END_S {
        return TimelineStep::done("peak shaving sequence complete");
    }
    let stage = PEAK_STAGE_STARTS
        .iter()
        .rposition(|start| ctx.elapsed_s >= *start)
        .unwrap_or(0);
    let entered = match *ctx.data {
        ScenarioData::Staged { entered } => entered,
        _ => None,
    };
    let first_pending = entered.map_or(0, |s| s + 1);
    for s in first_pending..=stage {
        enter_peak_stage(ctx.model, s);
    }
    if first_pending <= stage {
        *ctx.data = ScenarioData::Staged {
            entered: Some(stage),
        };
    }
    TimelineStep::active(PEAK_STAGE_STATUS[stage])
}

pub use super::fuzz::fuzz;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;
    use crate::rng::DeterministicRandom;
    use crate::scenario::catalog::TimelinePhase;
    use chrono::{NaiveDate, NaiveDateTime};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    struct Fixture {
        model: PlantModel,
        config: SimulatorConfig,
        data: ScenarioData,
        rng: DeterministicRandom,
    }

    impl Fixture {
        fn new(data: ScenarioData) -> Self {
            let config = SimulatorConfig::default();
            Self {
                model: PlantModel::from_config(&config, now()),
                config,
                data,
                rng: DeterministicRandom::new(42),
            }
        }

        fn run(&mut self, f: fn(&mut TimelineContext<'_>) -> TimelineStep, t: f64) -> TimelineStep {
            let mut ctx = TimelineContext {
                model: &mut self.model,
                config: &self.config,
                data: &mut self.data,
                rng: &mut self.rng,
                elapsed_s: t,
                now: now(),
            };
            f(&mut ctx)
        }
    }

    #[test]
    fn grid_limit_drop_stages() {
        let mut fx = Fixture::new(ScenarioData::None);
        let expect = [(0.0, 80.0), (59.9, 80.0), (60.0, 25.0), (179.0, 25.0), (180.0, 80.0)];
        for (t, limit) in expect {
            let step = fx.run(grid_limit_drop, t);
            assert_eq!(fx.model.grid.limit_kw, limit, "t={t}");
            assert_eq!(step.phase, TimelinePhase::Active);
        }
        assert_eq!(fx.run(grid_limit_drop, 240.0).phase, TimelinePhase::Done);
    }

    #[test]
    fn blackout_window() {
        let mut fx = Fixture::new(ScenarioData::None);
        fx.run(grid_blackout, 10.0);
        assert!(fx.model.grid.available);
        fx.run(grid_blackout, 45.0);
        assert!(!fx.model.grid.available);
        fx.run(grid_blackout, 95.0);
        assert!(fx.model.grid.available);
        assert_eq!(fx.run(grid_blackout, 130.0).phase, TimelinePhase::Done);
    }

    #[test]
    fn cloud_ramp_shape() {
        assert_eq!(cloud_factor(0.0), 1.0);
        assert!((cloud_factor(60.0) - 0.6).abs() < 1e-12);
        assert_eq!(cloud_factor(100.0), 0.2);
        assert!((cloud_factor(180.0) - 0.6).abs() < 1e-12);
        assert_eq!(cloud_factor(300.0), 1.0);

        let mut fx = Fixture::new(ScenarioData::CloudRamp { clear_sky_kw: 20.0 });
        fx.run(pv_cloud_ramp, 120.0);
        assert!((fx.model.pv.forced.power_kw - 4.0).abs() < 1e-9);
    }

    #[test]
    fn tariff_spike_goes_up_then_negative() {
        let mut fx = Fixture::new(ScenarioData::TariffSpike { normal_ct: 30.0 });
        fx.run(tariff_spike, 70.0);
        assert_eq!(fx.model.tariff.price_ct_per_kwh, 250.0);
        fx.run(tariff_spike, 130.0);
        assert_eq!(fx.model.tariff.price_ct_per_kwh, -20.0);
        assert_eq!(fx.run(tariff_spike, 200.0).phase, TimelinePhase::Done);
        assert_eq!(fx.model.tariff.price_ct_per_kwh, 30.0);
    }

    #[test]
    fn fault_stages_are_applied_once() {
        let mut fx = Fixture::new(ScenarioData::FaultRecovery { entered: None });
        fx.run(charger_fault_recovery, 65.0);
        assert!(fx.model.evcs.get(1).unwrap().sim.faulted);
        // A manual clear within the same stage is not overwritten.
        fx.model.evcs.get_mut(1).unwrap().sim.faulted = false;
        fx.run(charger_fault_recovery, 70.0);
        assert!(!fx.model.evcs.get(1).unwrap().sim.faulted);

        fx.run(charger_fault_recovery, 125.0);
        assert!(fx.model.evcs.get(2).unwrap().sim.meter_freeze);
        fx.run(charger_fault_recovery, 185.0);
        assert!(fx.model.evcs.get(0).unwrap().sim.unavailable);
        assert!(!fx.model.evcs.get(2).unwrap().sim.meter_freeze);
        let step = fx.run(charger_fault_recovery, 250.0);
        assert_eq!(step.phase, TimelinePhase::Done);
        assert!(fx.model.evcs.points().iter().all(|cp| !cp.sim.unavailable && !cp.sim.faulted));
    }

    #[test]
    fn fault_stages_skip_missing_points() {
        let mut fx = Fixture::new(ScenarioData::FaultRecovery { entered: None });
        fx.config.evcs.chargers_count = 1;
        fx.model = PlantModel::from_config(&fx.config, now());
        let step = fx.run(charger_fault_recovery, 65.0);
        assert_eq!(step.status, "c02 faulted");
        assert_eq!(fx.model.evcs.len(), 1);
    }

    #[test]
    fn plug_storm_is_reproducible() {
        let run = || {
            let mut fx = Fixture::new(ScenarioData::PlugStorm {
                next_event_s: 0.0,
                toggles: 0,
            });
            let mut plugged = Vec::new();
            for t in 0..30 {
                fx.run(plug_storm, f64::from(t));
                plugged.push(
                    fx.model
                        .evcs
                        .points()
                        .iter()
                        .map(|cp| cp.ctrl.plugged)
                        .collect::<Vec<_>>(),
                );
            }
            (plugged, fx.data)
        };
        let (a, data_a) = run();
        let (b, data_b) = run();
        assert_eq!(a, b);
        assert_eq!(data_a, data_b);
        match data_a {
            ScenarioData::PlugStorm { toggles, next_event_s } => {
                assert!(toggles >= 15);
                assert_eq!(next_event_s, 30.0);
            }
            other => panic!("unexpected data {other:?}"),
        }
    }

    #[test]
    fn plug_storm_catch_up_is_bounded_per_tick() {
        let mut fx = Fixture::new(ScenarioData::PlugStorm {
            next_event_s: -1000.0,
            toggles: 0,
        });
        fx.run(plug_storm, 0.0);
        let expected = -1000.0 + 2.0 * MAX_BURSTS_PER_TICK as f64;
        match &fx.data {
            ScenarioData::PlugStorm { next_event_s, .. } => assert_eq!(*next_event_s, expected),
            other => panic!("unexpected data {other:?}"),
        }
    }

    #[test]
    fn peak_shaving_stage_guard_runs_entries_once() {
        let mut fx = Fixture::new(ScenarioData::Staged { entered: None });
        fx.run(peak_shaving_staged, 0.0);
        assert_eq!(fx.model.grid.limit_kw, 60.0);
        fx.model.grid.limit_kw = 99.0;
        let step = fx.run(peak_shaving_staged, 30.0);
        assert_eq!(fx.model.grid.limit_kw, 99.0);
        assert_eq!(step.status, "stage 1/4: fleet plugged, limit 60 kW");

        let step = fx.run(peak_shaving_staged, 130.0);
        assert!(fx.model.devices.heatpump.ctrl.enabled);
        assert_eq!(fx.model.grid.limit_kw, 40.0);
        assert_eq!(step.status, "stage 3/4: limit 40 kW");
        assert_eq!(fx.data, ScenarioData::Staged { entered: Some(2) });
        let step = fx.run(peak_shaving_staged, 150.0);
        assert_eq!(step.status, "stage 3/4: limit 40 kW");

        fx.run(peak_shaving_staged, 200.0);
        assert!(!fx.model.devices.heatpump.ctrl.enabled);
        assert_eq!(fx.run(peak_shaving_staged, 240.0).phase, TimelinePhase::Done);
    }
}
