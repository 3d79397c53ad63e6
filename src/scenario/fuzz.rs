//! Reproducible random event stream for robustness testing of the EMS.

use std::fmt;

use crate::model::PlantModel;
use crate::rng::DeterministicRandom;

use super::catalog::{MAX_BURSTS_PER_TICK, ScenarioData, TimelineContext, TimelineStep};

/// Which fault switch a fault event toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Faulted,
    Unavailable,
    MeterFreeze,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Faulted => "faulted",
            Self::Unavailable => "unavailable",
            Self::MeterFreeze => "meter freeze",
        })
    }
}

/// A single applied fuzz event.
#[derive(Debug, Clone, PartialEq)]
pub enum FuzzEvent {
    PlugToggle { point: usize, plugged: bool },
    GridLimit { limit_kw: f64 },
    BaseLoad { base_kw: f64 },
    PvOverride { enabled: bool, power_kw: f64 },
    TariffShock { price_ct: f64 },
    Fault { point: usize, kind: FaultKind, active: bool },
    /// Drawn for an empty fleet where a point event was selected.
    Nothing,
}

impl fmt::Display for FuzzEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlugToggle { point, plugged } => {
                let verb = if *plugged { "plugged" } else { "unplugged" };
                write!(f, "c{:02} {verb}", point + 1)
            }
            Self::GridLimit { limit_kw } => write!(f, "grid limit {limit_kw:.1} kW"),
            Self::BaseLoad { base_kw } => write!(f, "base load {base_kw:.1} kW"),
            Self::PvOverride { enabled: true, power_kw } => write!(f, "PV forced to {power_kw:.1} kW"),
            Self::PvOverride { enabled: false, .. } => f.write_str("PV override off"),
            Self::TariffShock { price_ct } => write!(f, "price {price_ct:.1} ct/kWh"),
            Self::Fault { point, kind, active } => {
                let state = if *active { "on" } else { "off" };
                write!(f, "c{:02} {kind} {state}", point + 1)
            }
            Self::Nothing => f.write_str("no-op"),
        }
    }
}

/// Draws one categorical event and applies it to `model`.
///
/// Category partition of the first draw: plug/unplug `[0, .25)`, grid limit
/// `[.25, .40)`, base load `[.40, .55)`, PV override `[.55, .70)`, tariff
/// shock `[.70, .85)`, fault injection/recovery `[.85, 1)`. Each branch
/// consumes further draws.
pub fn apply_random_event(model: &mut PlantModel, rng: &mut DeterministicRandom) -> FuzzEvent {
    let u = rng.uniform();
    let n = model.evcs.len();
    if u < 0.25 {
        if n == 0 {
            return FuzzEvent::Nothing;
        }
        let point = rng.index(n);
        let soc = rng.range(5.0, 80.0);
        let Some(cp) = model.evcs.get_mut(point) else {
            return FuzzEvent::Nothing;
        };
        if cp.ctrl.plugged {
            cp.unplug();
        } else {
            cp.vehicle.soc_pct = soc;
            cp.plug();
        }
        FuzzEvent::PlugToggle {
            point,
            plugged: cp.ctrl.plugged,
        }
    } else if u < 0.40 {
        let limit_kw = rng.range(20.0, 150.0);
        model.grid.limit_kw = limit_kw;
        FuzzEvent::GridLimit { limit_kw }
    } else if u < 0.55 {
        let base_kw = rng.range(5.0, 60.0);
        model.grid.base_load.base_kw = base_kw;
        FuzzEvent::BaseLoad { base_kw }
    } else if u < 0.70 {
        let power_kw = rng.range(0.0, (model.pv.installed_kwp * 1.2).max(1.0));
        let enabled = !model.pv.forced.enabled;
        model.pv.forced.enabled = enabled;
        if enabled {
            model.pv.forced.power_kw = power_kw;
        }
        FuzzEvent::PvOverride { enabled, power_kw }
    } else if u < 0.85 {
        let price_ct = rng.range(-20.0, 300.0);
        model.tariff.set_manual_price(price_ct);
        FuzzEvent::TariffShock { price_ct }
    } else {
        if n == 0 {
            return FuzzEvent::Nothing;
        }
        let point = rng.index(n);
        let kind = match rng.index(3) {
            0 => FaultKind::Faulted,
            1 => FaultKind::Unavailable,
            _ => FaultKind::MeterFreeze,
        };
        let Some(cp) = model.evcs.get_mut(point) else {
            return FuzzEvent::Nothing;
        };
        let flag = match kind {
            FaultKind::Faulted => &mut cp.sim.faulted,
            FaultKind::Unavailable => &mut cp.sim.unavailable,
            FaultKind::MeterFreeze => &mut cp.sim.meter_freeze,
        };
        *flag = !*flag;
        FuzzEvent::Fault {
            point,
            kind,
            active: *flag,
        }
    }
}

/// Fuzz timeline: bursts of random events at the configured cadence.
/// Never finishes on its own; the global duration ends it.
pub fn fuzz(ctx: &mut TimelineContext<'_>) -> TimelineStep {
    let intensity = ctx.config.simulation.fuzz_intensity;
    let (mut next_event_s, mut events) = match *ctx.data {
        ScenarioData::Fuzz {
            next_event_s,
            events,
        } => (next_event_s, events),
        _ => (0.0, 0),
    };

    let mut last = None;
    let mut bursts = 0;
    while ctx.elapsed_s >= next_event_s && bursts < MAX_BURSTS_PER_TICK {
        for _ in 0..intensity.events_per_interval() {
            last = Some(apply_random_event(ctx.model, ctx.rng));
            events += 1;
        }
        next_event_s += intensity.interval_s();
        bursts += 1;
    }
    *ctx.data = ScenarioData::Fuzz {
        next_event_s,
        events,
    };

    match last {
        Some(event) => TimelineStep::active(format!("event #{events}: {event}")),
        None => TimelineStep::active(format!("{events} events")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FuzzIntensity, SimulatorConfig};
    use chrono::{NaiveDate, NaiveDateTime};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn run_fuzz(intensity: FuzzIntensity, seconds: u32, seed: u32) -> (PlantModel, ScenarioData, Vec<String>) {
        let mut config = SimulatorConfig::default();
        config.simulation.fuzz_intensity = intensity;
        let mut model = PlantModel::from_config(&config, now());
        let mut data = ScenarioData::Fuzz {
            next_event_s: 0.0,
            events: 0,
        };
        let mut rng = DeterministicRandom::new(seed);
        let mut statuses = Vec::new();
        for t in 0..seconds {
            let mut ctx = TimelineContext {
                model: &mut model,
                config: &config,
                data: &mut data,
                rng: &mut rng,
                elapsed_s: f64::from(t),
                now: now(),
            };
            statuses.push(fuzz(&mut ctx).status);
        }
        (model, data, statuses)
    }

    #[test]
    fn normal_intensity_cadence() {
        let (_, data, _) = run_fuzz(FuzzIntensity::Normal, 20, 1);
        // Bursts at 0, 5, 10, 15.
        assert_eq!(
            data,
            ScenarioData::Fuzz {
                next_event_s: 20.0,
                events: 4
            }
        );
    }

    #[test]
    fn high_intensity_cadence() {
        let (_, data, _) = run_fuzz(FuzzIntensity::High, 20, 1);
        assert_eq!(
            data,
            ScenarioData::Fuzz {
                next_event_s: 20.0,
                events: 40
            }
        );
    }

    #[test]
    fn same_seed_replays_identically() {
        let (model_a, _, status_a) = run_fuzz(FuzzIntensity::High, 60, 77);
        let (model_b, _, status_b) = run_fuzz(FuzzIntensity::High, 60, 77);
        assert_eq!(status_a, status_b);
        assert_eq!(model_a, model_b);
        let (_, _, status_c) = run_fuzz(FuzzIntensity::High, 60, 78);
        assert_ne!(status_a, status_c);
    }

    #[test]
    fn events_keep_model_sound() {
        let (model, _, _) = run_fuzz(FuzzIntensity::High, 300, 5);
        assert!(model.invariant_violations().is_empty(), "{:?}", model.invariant_violations());
        assert!(model.grid.limit_kw >= 20.0 && model.grid.limit_kw <= 150.0);
    }

    #[test]
    fn all_categories_are_reachable() {
        let config = SimulatorConfig::default();
        let mut model = PlantModel::from_config(&config, now());
        let mut rng = DeterministicRandom::new(3);
        let mut seen = [false; 6];
        for _ in 0..500 {
            let idx = match apply_random_event(&mut model, &mut rng) {
                FuzzEvent::PlugToggle { .. } => 0,
                FuzzEvent::GridLimit { .. } => 1,
                FuzzEvent::BaseLoad { .. } => 2,
                FuzzEvent::PvOverride { .. } => 3,
                FuzzEvent::TariffShock { .. } => 4,
                FuzzEvent::Fault { .. } => 5,
                FuzzEvent::Nothing => continue,
            };
            seen[idx] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
