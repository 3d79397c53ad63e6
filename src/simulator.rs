//! The per-tick pipeline and the inbound command path.
//!
//! [`Simulator`] owns the plant model and every state machine around it. A
//! tick runs: suite step, scenario timeline, physics, completion handling,
//! publish. External commands arrive as store notifications and are applied
//! between ticks.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::command::{
    Command, ScenarioControl, SuiteControl, apply_plant_command, parse_key, persisted_commands,
    restore_plant_value,
};
use crate::config::SimulatorConfig;
use crate::model::PlantModel;
use crate::publish::{ChangePublisher, PointValue};
use crate::report::{ReportBuilder, SuiteOutcome, WriteCategory};
use crate::scenario::{ApplyOptions, ScenarioEngine, ScenarioError, ScenarioKind, ScenarioRegistry};
use crate::sim::{TickResult, TickSimulator};
use crate::store::{StateStore, StoreError};
use crate::suite::{SuiteEvent, SuiteRunner};

/// Key families the simulator listens to for commands.
pub const COMMAND_PATTERNS: [&str; 10] = [
    "grid.*",
    "tariff.*",
    "pv.*",
    "storage.*",
    "heatpump.*",
    "chp.*",
    "generator.*",
    "evcs.*",
    "scenario.*",
    "suite.*",
];

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn timestamp(t: NaiveDateTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Id for `scenario.apply`/`scenario.start`: a text id, or `true` for the
/// current selection.
fn scenario_target(value: &PointValue, selected: &str) -> Option<String> {
    match value {
        PointValue::Text(s) if !s.trim().is_empty() && s.trim().parse::<bool>().is_err() => {
            Some(s.trim().to_string())
        }
        other if other.as_bool() == Some(true) => Some(selected.to_string()),
        _ => None,
    }
}

/// The running simulation bound to a state store.
pub struct Simulator<S: StateStore> {
    config: SimulatorConfig,
    store: S,
    model: Option<PlantModel>,
    physics: TickSimulator,
    scenarios: ScenarioEngine,
    suite: SuiteRunner,
    reports: ReportBuilder,
    publisher: ChangePublisher,
    last_tick: Option<TickResult>,
}

impl<S: StateStore> Simulator<S> {
    /// Creates an uninitialized simulator. The configuration is normalized
    /// here; commands are acknowledged but ignored until [`initialize`].
    ///
    /// [`initialize`]: Simulator::initialize
    pub fn new(config: &SimulatorConfig, store: S) -> Self {
        Self::with_registry(config, store, ScenarioRegistry::standard())
    }

    pub fn with_registry(config: &SimulatorConfig, store: S, registry: ScenarioRegistry) -> Self {
        let config = config.normalized();
        let physics = TickSimulator::new(config.simulation.random_seed, config.simulation.update_interval_ms);
        Self {
            config,
            store,
            model: None,
            physics,
            scenarios: ScenarioEngine::new(registry),
            suite: SuiteRunner::new(),
            reports: ReportBuilder::new(),
            publisher: ChangePublisher::new(),
            last_tick: None,
        }
    }

    /// Builds the plant, restores persisted values, subscribes to the
    /// command keys and publishes the initial state.
    ///
    /// # Errors
    ///
    /// Returns the store error if subscribing fails.
    pub fn initialize(&mut self, now: NaiveDateTime) -> Result<(), StoreError> {
        let mut model = PlantModel::from_config(&self.config, now);
        let mut restored = 0;
        for cmd in persisted_commands(model.evcs.len()) {
            match self.store.read(&cmd.key()) {
                Ok(Some(value)) => {
                    if restore_plant_value(&mut model, cmd, &value, now).is_some() {
                        restored += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(key = %cmd.key(), error = %e, "could not restore persisted value"),
            }
        }
        self.store.subscribe(&COMMAND_PATTERNS)?;
        info!(
            points = model.evcs.len(),
            restored,
            seed = self.config.simulation.random_seed,
            "plant initialized"
        );
        self.model = Some(model);

        let catalog = self.scenarios.registry().catalog(&self.config.scenario);
        self.publish_json("scenario.catalog", &catalog);
        self.publish_all(now);
        self.flush();
        Ok(())
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn model(&self) -> Option<&PlantModel> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut PlantModel> {
        self.model.as_mut()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn scenarios(&self) -> &ScenarioEngine {
        &self.scenarios
    }

    pub fn suite(&self) -> &SuiteRunner {
        &self.suite
    }

    pub fn reports(&self) -> &ReportBuilder {
        &self.reports
    }

    pub fn last_tick(&self) -> Option<&TickResult> {
        self.last_tick.as_ref()
    }

    /// Handles every pending external command. Echoes of our own writes
    /// (`ack = true`) are skipped. Returns the number of commands handled.
    pub fn process_commands(&mut self, now: NaiveDateTime) -> usize {
        let mut handled = 0;
        for note in self.store.poll_notifications() {
            if note.ack {
                continue;
            }
            self.handle_command(&note.key, note.value, now);
            handled += 1;
        }
        handled
    }

    /// Applies one external write and acknowledges it.
    pub fn handle_command(&mut self, key: &str, value: PointValue, now: NaiveDateTime) {
        let Some(cmd) = parse_key(key) else {
            // Read-only point: put our value back.
            debug!(key, "write to read-only or unknown key");
            if let Some(own) = self.publisher.cached(key).cloned() {
                self.publisher.acknowledge(&mut self.store, key, own);
            }
            return;
        };
        if self.model.is_none() {
            debug!(key, "command before initialization, acknowledged and ignored");
            self.publisher.acknowledge(&mut self.store, key, value);
            return;
        }

        let ack = match cmd {
            Command::Scenario(control) => self.handle_scenario_control(control, &value, now),
            Command::Suite(control) => self.handle_suite_control(control, &value, now),
            plant => {
                let applied = self
                    .model
                    .as_mut()
                    .and_then(|m| apply_plant_command(m, plant, &value, now));
                let category = if applied.is_some() {
                    plant.category()
                } else {
                    debug!(key, "command addresses a missing charge point");
                    WriteCategory::Other
                };
                let ack = applied.unwrap_or(value);
                if self.scenarios.is_running() || self.suite.is_running() {
                    self.reports.record(key, category, &ack, now);
                }
                ack
            }
        };
        self.publisher.acknowledge(&mut self.store, key, ack);
    }

    fn handle_scenario_control(
        &mut self,
        control: ScenarioControl,
        value: &PointValue,
        now: NaiveDateTime,
    ) -> PointValue {
        match control {
            ScenarioControl::Selected => {
                if let Some(id) = value.as_text() {
                    if let Err(e) = self.scenarios.select(id.trim()) {
                        warn!(error = %e, "selection ignored");
                    }
                }
                self.scenarios.state().selected.clone().into()
            }
            ScenarioControl::Apply | ScenarioControl::Start => {
                let start = control == ScenarioControl::Start;
                let selected = self.scenarios.state().selected.clone();
                if let Some(id) = scenario_target(value, &selected) {
                    if let Err(e) = self.apply_scenario(&id, start, now) {
                        warn!(error = %e, "scenario request ignored");
                    }
                }
                value.clone()
            }
            ScenarioControl::Stop => {
                if value.as_bool() == Some(true) && !self.stop_suite(now) {
                    self.stop_scenario(now);
                }
                value.clone()
            }
        }
    }

    fn handle_suite_control(&mut self, control: SuiteControl, value: &PointValue, now: NaiveDateTime) -> PointValue {
        if value.as_bool() == Some(true) {
            match control {
                SuiteControl::Start => self.start_suite(now),
                SuiteControl::Stop => {
                    self.stop_suite(now);
                }
            }
        }
        value.clone()
    }

    /// Applies a scenario, optionally starting it. Suite entries start the
    /// suite. A running suite or scenario is stopped first.
    ///
    /// # Errors
    ///
    /// `ScenarioError::Unknown` for unregistered ids.
    pub fn apply_scenario(&mut self, id: &str, start: bool, now: NaiveDateTime) -> Result<(), ScenarioError> {
        let kind = self
            .scenarios
            .registry()
            .get(id)
            .map(|d| d.kind)
            .ok_or_else(|| ScenarioError::Unknown(id.to_string()))?;
        if kind == ScenarioKind::Suite {
            if start {
                self.start_suite(now);
                return Ok(());
            }
            return Err(ScenarioError::SuiteOnly(id.to_string()));
        }
        if self.model.is_none() {
            return Ok(());
        }

        self.stop_suite(now);
        self.stop_scenario(now);
        if start {
            self.reports.begin();
        }
        let Some(model) = self.model.as_mut() else {
            return Ok(());
        };
        let opts = ApplyOptions { start, suite: None };
        self.scenarios.apply(id, opts, model, &self.config, now)
    }

    /// Stops the manually started scenario. Returns `false` if none ran.
    pub fn stop_scenario(&mut self, now: NaiveDateTime) -> bool {
        let Some(model) = self.model.as_mut() else {
            return false;
        };
        let stopped = self.scenarios.stop(model, &self.config, now);
        self.handle_finished(now);
        stopped
    }

    /// Starts the suite over the registry's queue, stopping whatever runs.
    pub fn start_suite(&mut self, now: NaiveDateTime) {
        if self.model.is_none() {
            return;
        }
        self.stop_suite(now);
        self.stop_scenario(now);
        let queue = self.scenarios.registry().suite_queue();
        self.reports.begin_suite(queue.len(), now);
        self.suite.start(queue, now);
        if let Some(model) = self.model.as_mut() {
            self.scenarios.reset_to_baseline(model, &self.config, now);
        }
    }

    /// Stops a running suite, including its current scenario, and
    /// publishes the suite report. Returns `false` if no suite ran.
    pub fn stop_suite(&mut self, now: NaiveDateTime) -> bool {
        if !self.suite.is_running() {
            return false;
        }
        if let Some(model) = self.model.as_mut() {
            self.scenarios.stop(model, &self.config, now);
        }
        // Still running, so the stopped scenario lands in the results.
        self.handle_finished(now);
        self.suite.stop();
        self.end_suite(SuiteOutcome::Stopped, now);
        true
    }

    fn end_suite(&mut self, outcome: SuiteOutcome, now: NaiveDateTime) {
        if let Some(model) = self.model.as_mut() {
            self.scenarios.reset_to_baseline(model, &self.config, now);
        }
        let summary = self.reports.finish_suite(&self.suite.state().results, outcome, now);
        self.publish_json("report.suite", &summary);
    }

    /// Consumes the scenario completion signal: publishes the scenario
    /// report and hands the result to the suite.
    fn handle_finished(&mut self, now: NaiveDateTime) {
        let Some(finished) = self.scenarios.take_just_finished() else {
            return;
        };
        let summary = self.reports.finish_scenario(&finished);
        self.publish_json("report.scenario", &summary);
        if finished.suite.is_some() && self.suite.is_running() {
            self.suite
                .on_scenario_finished(summary, now, self.config.scenario.reset_pause_sec);
            if let Some(model) = self.model.as_mut() {
                self.scenarios.reset_to_baseline(model, &self.config, now);
            }
        }
    }

    /// Runs one full tick at `now`. Returns `None` before initialization.
    pub fn tick(&mut self, now: NaiveDateTime) -> Option<TickResult> {
        self.model.as_ref()?;

        match self.suite.step(now) {
            Some(SuiteEvent::Start { id, link }) => {
                self.reports.begin();
                let opts = ApplyOptions {
                    start: true,
                    suite: Some(link),
                };
                let applied = match self.model.as_mut() {
                    Some(model) => self.scenarios.apply(&id, opts, model, &self.config, now),
                    None => Ok(()),
                };
                if let Err(e) = applied {
                    warn!(error = %e, "suite entry skipped");
                    self.suite.skip_current(now);
                }
            }
            Some(SuiteEvent::Completed) => self.end_suite(SuiteOutcome::Completed, now),
            None => {}
        }

        let model = self.model.as_mut()?;
        self.scenarios.advance(model, &self.config, now);
        let result = self.physics.step(model, now);
        self.scenarios.complete_if_due(&self.config, now);
        self.handle_finished(now);

        self.publish_all(now);
        self.flush();
        self.last_tick = Some(result.clone());
        Some(result)
    }

    fn flush(&mut self) {
        if let Err(e) = self.store.flush() {
            warn!(error = %e, "state flush failed");
        }
    }

    fn publish_json<T: Serialize>(&mut self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => {
                self.publisher.publish(&mut self.store, key, json);
            }
            Err(e) => warn!(key, error = %e, "could not encode report"),
        }
    }

    /// Publishes every point that changed since the last pass.
    pub fn publish_all(&mut self, now: NaiveDateTime) {
        let points = self.points(now);
        for (key, value) in points {
            self.publisher.publish(&mut self.store, &key, value);
        }
    }

    fn points(&self, now: NaiveDateTime) -> Vec<(String, PointValue)> {
        let mut out: Vec<(String, PointValue)> = Vec::with_capacity(256);
        let mut put = |key: String, value: PointValue| out.push((key, value));

        put("sim.tick".into(), self.physics.ticks().into());

        if let Some(m) = &self.model {
            let g = &m.grid;
            put("grid.available".into(), g.available.into());
            put("grid.limitKw".into(), g.limit_kw.into());
            put("grid.baseLoadKw".into(), g.base_load.base_kw.into());
            put("grid.powerKw".into(), g.power_kw.into());
            put("grid.overLimit".into(), g.over_limit.into());

            let t = &m.tariff;
            put("tariff.mode".into(), t.mode.as_str().into());
            put("tariff.priceCtPerKwh".into(), t.price_ct_per_kwh.into());
            let curve = serde_json::to_string(&t.forward_curve_24h).unwrap_or_default();
            put("tariff.forwardCurve".into(), curve.into());

            let pv = &m.pv;
            put("pv.powerKw".into(), pv.power_kw.into());
            put("pv.installedKwp".into(), pv.installed_kwp.into());
            put("pv.weatherFactor".into(), pv.weather_factor.into());
            put("pv.override.enabled".into(), pv.forced.enabled.into());
            put("pv.override.powerKw".into(), pv.forced.power_kw.into());

            let s = &m.storage;
            put("storage.socPct".into(), s.soc_pct.into());
            put("storage.powerKw".into(), s.power_kw.into());
            put("storage.capacityKwh".into(), s.capacity_kwh.into());
            put("storage.maxChargeKw".into(), s.max_charge_kw.into());
            put("storage.maxDischargeKw".into(), s.max_discharge_kw.into());
            put("storage.ctrl.enabled".into(), s.ctrl.enabled.into());
            put("storage.ctrl.powerSetKw".into(), s.ctrl.power_set_kw.into());

            for d in m.devices.iter() {
                let k = d.kind.key();
                put(format!("{k}.powerKw"), d.power_kw.into());
                put(format!("{k}.ctrl.enabled"), d.ctrl.enabled.into());
                put(format!("{k}.ctrl.powerSetKw"), d.ctrl.power_set_kw.into());
            }

            put("evcs.count".into(), m.evcs.len().into());
            put("evcs.totalPowerKw".into(), m.evcs.total_power_kw().into());
            for cp in m.evcs.points() {
                let p = format!("evcs.{}", cp.id);
                put(format!("{p}.type"), cp.charger_type.to_string().into());
                put(format!("{p}.maxKw"), cp.max_kw().into());
                put(format!("{p}.meas.status"), cp.meas.status.as_str().into());
                put(format!("{p}.meas.powerKw"), cp.meas.power_kw.into());
                put(format!("{p}.meas.energyKwh"), cp.meas.energy_kwh.into());
                put(format!("{p}.ctrl.enabled"), cp.ctrl.enabled.into());
                put(format!("{p}.ctrl.limitKw"), cp.ctrl.limit_kw.into());
                put(format!("{p}.ctrl.plugged"), cp.ctrl.plugged.into());
                put(format!("{p}.ctrl.priority"), cp.ctrl.priority.into());
                let v = &cp.vehicle;
                put(format!("{p}.vehicle.id"), v.id.as_str().into());
                put(format!("{p}.vehicle.socPct"), v.soc_pct.into());
                put(format!("{p}.vehicle.targetSocPct"), v.target_soc_pct.into());
                put(format!("{p}.vehicle.capacityKwh"), v.capacity_kwh.into());
                put(format!("{p}.vehicle.maxChargeKw"), v.max_charge_kw.into());
                put(format!("{p}.vehicle.departureTime"), v.departure_time.as_str().into());
                put(format!("{p}.vehicle.departureTs"), v.departure_ts.map(timestamp).into());
                put(format!("{p}.sim.faulted"), cp.sim.faulted.into());
                put(format!("{p}.sim.unavailable"), cp.sim.unavailable.into());
                put(format!("{p}.sim.meterFreeze"), cp.sim.meter_freeze.into());
            }
        }

        let sc = self.scenarios.state();
        put("scenario.selected".into(), sc.selected.as_str().into());
        put("scenario.active".into(), sc.active.as_str().into());
        put("scenario.running".into(), sc.running.into());
        put("scenario.phase".into(), sc.phase.as_str().into());
        put("scenario.status".into(), sc.status.as_str().into());
        put("scenario.startedAt".into(), sc.started_at.map(timestamp).into());
        put("scenario.durationS".into(), sc.duration_s.into());
        put("scenario.elapsedS".into(), self.scenarios.elapsed_s(now).round().into());
        put("scenario.remainingS".into(), self.scenarios.remaining_s(now).round().into());

        let su = self.suite.state();
        put("suite.running".into(), su.running.into());
        put("suite.stage".into(), su.stage.as_str().into());
        put("suite.index".into(), su.index.into());
        put("suite.total".into(), su.queue.len().into());
        put("suite.currentId".into(), su.current_id.as_str().into());
        put("suite.completed".into(), su.results.len().into());

        out
    }
}
