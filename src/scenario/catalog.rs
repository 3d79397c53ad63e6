//! Declarative scenario registry.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::{ScenarioTimingConfig, SimulatorConfig};
use crate::model::PlantModel;
use crate::rng::DeterministicRandom;

use super::{setups, timelines};

/// Id of the scenario that restores the default plant.
pub const BASELINE_ID: &str = "baseline";

/// How a scenario drives the plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    /// Setup only.
    Oneshot,
    /// Setup plus a time-staged timeline.
    Timeline,
    /// Runs the whole catalog through the suite runner.
    Suite,
}

/// One entry of the published catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioInfo {
    pub id: &'static str,
    pub title: &'static str,
    pub kind: ScenarioKind,
    pub duration_s: u32,
    pub description: &'static str,
}

/// Working set of a running scenario, one variant per scenario that needs one.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScenarioData {
    #[default]
    None,
    /// Last stage whose entry actions already ran.
    Staged { entered: Option<usize> },
    /// Clear-sky PV output the cloud ramp scales.
    CloudRamp { clear_sky_kw: f64 },
    /// Price restored after the spike.
    TariffSpike { normal_ct: f64 },
    /// Last fault stage applied.
    FaultRecovery { entered: Option<usize> },
    /// Elapsed time of the next plug/unplug burst.
    PlugStorm { next_event_s: f64, toggles: u64 },
    /// Fuzz event schedule.
    Fuzz { next_event_s: f64, events: u64 },
}

/// Mutable view handed to a setup step.
pub struct SetupContext<'a> {
    pub model: &'a mut PlantModel,
    pub config: &'a SimulatorConfig,
    pub rng: &'a mut DeterministicRandom,
    pub now: NaiveDateTime,
}

/// Upper bound on catch-up bursts a timeline fires in one tick after a
/// long stall.
pub(crate) const MAX_BURSTS_PER_TICK: usize = 64;

/// Mutable view handed to a timeline step on every tick.
pub struct TimelineContext<'a> {
    pub model: &'a mut PlantModel,
    pub config: &'a SimulatorConfig,
    pub data: &'a mut ScenarioData,
    pub rng: &'a mut DeterministicRandom,
    pub elapsed_s: f64,
    pub now: NaiveDateTime,
}

/// Whether a timeline still has stages ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelinePhase {
    Active,
    Done,
}

/// Outcome of one timeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineStep {
    pub status: String,
    pub phase: TimelinePhase,
}

impl TimelineStep {
    pub fn active(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            phase: TimelinePhase::Active,
        }
    }

    pub fn done(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            phase: TimelinePhase::Done,
        }
    }
}

pub type SetupFn = fn(&mut SetupContext<'_>) -> ScenarioData;
pub type TimelineFn = fn(&mut TimelineContext<'_>) -> TimelineStep;

/// A registered scenario.
#[derive(Clone)]
pub struct ScenarioDef {
    pub id: &'static str,
    pub title: &'static str,
    pub kind: ScenarioKind,
    pub description: &'static str,
    pub setup: SetupFn,
    pub timeline: Option<TimelineFn>,
}

impl std::fmt::Debug for ScenarioDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioDef")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("has_timeline", &self.timeline.is_some())
            .finish()
    }
}

/// Registry mapping scenario ids to their setup and timeline.
#[derive(Debug, Clone)]
pub struct ScenarioRegistry {
    defs: Vec<ScenarioDef>,
}

impl ScenarioRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { defs: Vec::new() }
    }

    /// Adds or replaces a scenario.
    pub fn register(&mut self, def: ScenarioDef) {
        match self.defs.iter_mut().find(|d| d.id == def.id) {
            Some(slot) => *slot = def,
            None => self.defs.push(def),
        }
    }

    /// The built-in catalog, in publication order.
    pub fn standard() -> Self {
        let mut r = Self::new();
        let oneshot = |id, title, description, setup: SetupFn| ScenarioDef {
            id,
            title,
            kind: ScenarioKind::Oneshot,
            description,
            setup,
            timeline: None,
        };
        let timed = |id, title, description, setup: SetupFn, timeline: TimelineFn| ScenarioDef {
            id,
            title,
            kind: ScenarioKind::Timeline,
            description,
            setup,
            timeline: Some(timeline),
        };

        r.register(oneshot(
            BASELINE_ID,
            "Baseline",
            "Default plant from configuration, nothing forced.",
            setups::baseline,
        ));
        r.register(oneshot(
            "lm_6cars_deadline_0615",
            "Load management: 6 cars, departure 06:15",
            "Six vehicles with mixed SoC must reach 100 % by 06:15 under the grid limit.",
            setups::six_cars_deadline,
        ));
        r.register(oneshot(
            "lm_mixed_priorities",
            "Load management: mixed priorities",
            "Every point plugged with different priorities, SoC and departures on a tight grid limit.",
            setups::mixed_priorities,
        ));
        r.register(oneshot(
            "dc_fast_taper",
            "DC fast charging taper",
            "DC points start at 78 % SoC so the taper above 80 % is visible.",
            setups::dc_fast_taper,
        ));
        r.register(oneshot(
            "pv_surplus_midday",
            "PV surplus at midday",
            "Forced PV output well above site demand with storage ready to absorb.",
            setups::pv_surplus_midday,
        ));
        r.register(oneshot(
            "storage_soc0",
            "Storage empty",
            "Storage at 0 % SoC; discharge requests must be refused.",
            setups::storage_empty,
        ));
        r.register(oneshot(
            "storage_full",
            "Storage full",
            "Storage at 100 % SoC; charge requests must be refused.",
            setups::storage_full,
        ));
        r.register(timed(
            "grid_limit_drop",
            "Grid limit drop",
            "Limit 80 kW, drops to 25 kW after 60 s, recovers after 180 s.",
            setups::grid_limit_drop,
            timelines::grid_limit_drop,
        ));
        r.register(timed(
            "grid_blackout",
            "Grid blackout",
            "Grid connection lost from 30 s to 90 s.",
            setups::grid_blackout,
            timelines::grid_blackout,
        ));
        r.register(timed(
            "pv_cloud_ramp",
            "PV cloud ramp",
            "PV output ramps down to 20 % and back up as a cloud passes.",
            setups::pv_cloud_ramp,
            timelines::pv_cloud_ramp,
        ));
        r.register(timed(
            "tariff_spike",
            "Tariff spike",
            "Manual price jumps to 250 ct/kWh, then goes negative, then normalizes.",
            setups::tariff_spike,
            timelines::tariff_spike,
        ));
        r.register(timed(
            "charger_fault_recovery",
            "Charger fault and recovery",
            "Points fault, freeze their meter and go unavailable one after another, then recover.",
            setups::charger_fault_recovery,
            timelines::charger_fault_recovery,
        ));
        r.register(timed(
            "plug_storm",
            "Plug storm",
            "Random vehicles plug and unplug every two seconds.",
            setups::plug_storm,
            timelines::plug_storm,
        ));
        r.register(timed(
            "peak_shaving_staged",
            "Staged peak shaving",
            "Four stages raise load and lower the limit so storage must shave the peak.",
            setups::peak_shaving_staged,
            timelines::peak_shaving_staged,
        ));
        r.register(timed(
            "fuzz",
            "Fuzz",
            "Reproducible random events across grid, PV, tariff and charge points.",
            setups::fuzz,
            timelines::fuzz,
        ));
        r.register(ScenarioDef {
            id: "suite_all",
            title: "Run all scenarios",
            kind: ScenarioKind::Suite,
            description: "Runs every scenario in catalog order with a baseline reset in between.",
            setup: setups::baseline,
            timeline: None,
        });
        r
    }

    pub fn get(&self, id: &str) -> Option<&ScenarioDef> {
        self.defs.iter().find(|d| d.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Ids the suite runs: everything except the baseline and suites.
    pub fn suite_queue(&self) -> Vec<String> {
        self.defs
            .iter()
            .filter(|d| d.id != BASELINE_ID && d.kind != ScenarioKind::Suite)
            .map(|d| d.id.to_string())
            .collect()
    }

    /// Catalog snapshot with durations resolved against the timing config.
    pub fn catalog(&self, timing: &ScenarioTimingConfig) -> Vec<ScenarioInfo> {
        let queued = self.suite_queue().len() as u32;
        self.defs
            .iter()
            .map(|d| ScenarioInfo {
                id: d.id,
                title: d.title,
                kind: d.kind,
                duration_s: match d.kind {
                    ScenarioKind::Oneshot if d.id == BASELINE_ID => 0,
                    ScenarioKind::Suite => queued * (timing.duration_sec + timing.reset_pause_sec),
                    _ => timing.duration_sec,
                },
                description: d.description,
            })
            .collect()
    }
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
