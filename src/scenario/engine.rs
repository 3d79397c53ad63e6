//! Scenario state machine: setup on activation, timeline while running,
//! global duration enforcement and the one-shot completion signal.

use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SimulatorConfig;
use crate::model::PlantModel;
use crate::rng::DeterministicRandom;

use super::catalog::{
    BASELINE_ID, ScenarioData, ScenarioKind, ScenarioRegistry, SetupContext, TimelineContext,
    TimelinePhase,
};

/// Errors returned when activating a scenario.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("unknown scenario \"{0}\"")]
    Unknown(String),
    #[error("scenario \"{0}\" is a suite and must be started through the suite runner")]
    SuiteOnly(String),
}

/// Lifecycle phase of the scenario engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioPhase {
    #[default]
    Idle,
    Applying,
    Applied,
    Running,
    Stopped,
    Done,
}

impl ScenarioPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ScenarioPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a running scenario ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    DurationElapsed,
    Stopped,
}

/// Position of a scenario inside a suite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SuiteLink {
    /// Zero-based position in the queue.
    pub index: usize,
    pub total: usize,
}

/// The one-shot completion signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishedScenario {
    pub id: String,
    pub title: String,
    pub reason: FinishReason,
    pub started_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
    /// Configured duration.
    pub duration_s: u32,
    pub suite: Option<SuiteLink>,
}

impl FinishedScenario {
    /// Actual run time in seconds.
    pub fn elapsed_s(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Transient run state, reset to idle on process start.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScenarioRunState {
    /// Scenario chosen for the next apply/start.
    pub selected: String,
    /// Scenario whose setup is currently in effect.
    pub active: String,
    pub running: bool,
    pub started_at: Option<NaiveDateTime>,
    pub duration_s: u32,
    pub phase: ScenarioPhase,
    pub status: String,
    pub data: ScenarioData,
    pub just_finished: Option<FinishedScenario>,
    /// Baseline restore deadline after a manual run completed.
    pub reset_due_at: Option<NaiveDateTime>,
    /// Timeline reached its natural end; its last state is being held.
    pub stabilized: bool,
    pub suite: Option<SuiteLink>,
}

impl ScenarioRunState {
    fn idle() -> Self {
        Self {
            selected: BASELINE_ID.to_string(),
            active: BASELINE_ID.to_string(),
            status: "baseline".to_string(),
            ..Self::default()
        }
    }
}

/// Options for [`ScenarioEngine::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Run the timeline and enforce the duration after the setup.
    pub start: bool,
    /// Set when the suite runner drives this scenario.
    pub suite: Option<SuiteLink>,
}

/// Applies scenarios to the plant and drives their timelines.
#[derive(Debug, Clone)]
pub struct ScenarioEngine {
    registry: ScenarioRegistry,
    rng: DeterministicRandom,
    state: ScenarioRunState,
}

impl ScenarioEngine {
    pub fn new(registry: ScenarioRegistry) -> Self {
        Self {
            registry,
            rng: DeterministicRandom::new(0),
            state: ScenarioRunState::idle(),
        }
    }

    pub fn registry(&self) -> &ScenarioRegistry {
        &self.registry
    }

    pub fn state(&self) -> &ScenarioRunState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Marks `id` as the scenario for the next apply. Unknown ids are refused.
    pub fn select(&mut self, id: &str) -> Result<(), ScenarioError> {
        if !self.registry.contains(id) {
            return Err(ScenarioError::Unknown(id.to_string()));
        }
        self.state.selected = id.to_string();
        Ok(())
    }

    /// Resets the plant to baseline and runs the scenario's setup.
    ///
    /// With `start` (and an id other than the baseline) the scenario then
    /// runs for the configured duration; otherwise it stays `applied`. The
    /// scenario noise stream is reseeded on every apply, so a scenario
    /// replays identically. A scenario still running is replaced without a
    /// completion signal; callers that want one stop it first.
    ///
    /// # Errors
    ///
    /// `ScenarioError::Unknown` for an unregistered id and
    /// `ScenarioError::SuiteOnly` for suite entries.
    pub fn apply(
        &mut self,
        id: &str,
        opts: ApplyOptions,
        model: &mut PlantModel,
        config: &SimulatorConfig,
        now: NaiveDateTime,
    ) -> Result<(), ScenarioError> {
        let def = self
            .registry
            .get(id)
            .ok_or_else(|| ScenarioError::Unknown(id.to_string()))?;
        if def.kind == ScenarioKind::Suite {
            return Err(ScenarioError::SuiteOnly(id.to_string()));
        }
        let setup = def.setup;
        let title = def.title;

        self.state.phase = ScenarioPhase::Applying;
        self.rng.reseed(config.simulation.random_seed);
        model.reset_to_baseline(config, now);
        let data = setup(&mut SetupContext {
            model,
            config,
            rng: &mut self.rng,
            now,
        });

        let start = opts.start && id != BASELINE_ID;
        self.state = ScenarioRunState {
            selected: id.to_string(),
            active: id.to_string(),
            running: start,
            started_at: start.then_some(now),
            duration_s: if start { config.scenario.duration_sec } else { 0 },
            phase: if start {
                ScenarioPhase::Running
            } else {
                ScenarioPhase::Applied
            },
            status: if start {
                format!("running: {title}")
            } else {
                format!("applied: {title}")
            },
            data,
            just_finished: None,
            reset_due_at: None,
            stabilized: false,
            suite: opts.suite,
        };
        info!(scenario = id, start, suite = opts.suite.is_some(), "scenario applied");
        Ok(())
    }

    /// Seconds since the running scenario started.
    pub fn elapsed_s(&self, now: NaiveDateTime) -> f64 {
        self.state
            .started_at
            .map_or(0.0, |s| ((now - s).num_milliseconds() as f64 / 1000.0).max(0.0))
    }

    /// Seconds left of the configured duration.
    pub fn remaining_s(&self, now: NaiveDateTime) -> f64 {
        if !self.state.running {
            return 0.0;
        }
        (f64::from(self.state.duration_s) - self.elapsed_s(now)).max(0.0)
    }

    /// Pre-physics work: the pending baseline reset and the timeline step.
    pub fn advance(&mut self, model: &mut PlantModel, config: &SimulatorConfig, now: NaiveDateTime) {
        if let Some(due) = self.state.reset_due_at {
            if !self.state.running && now >= due {
                info!("pending baseline reset");
                self.reset_to_baseline(model, config, now);
                return;
            }
        }
        if !self.state.running || self.state.stabilized {
            return;
        }
        let Some(timeline) = self
            .registry
            .get(&self.state.active)
            .and_then(|d| d.timeline)
        else {
            return;
        };
        let elapsed_s = self.elapsed_s(now);
        let step = timeline(&mut TimelineContext {
            model,
            config,
            data: &mut self.state.data,
            rng: &mut self.rng,
            elapsed_s,
            now,
        });
        match step.phase {
            TimelinePhase::Active => self.state.status = step.status,
            TimelinePhase::Done => {
                debug!(scenario = %self.state.active, elapsed_s, "timeline finished early, holding");
                self.state.stabilized = true;
                self.state.status = format!("{} (stabilized)", step.status);
            }
        }
    }

    /// Post-physics work: ends the scenario once the configured duration
    /// has elapsed and raises the completion signal.
    pub fn complete_if_due(&mut self, config: &SimulatorConfig, now: NaiveDateTime) {
        if !self.state.running {
            return;
        }
        if self.elapsed_s(now) < f64::from(self.state.duration_s) {
            return;
        }
        self.finish(FinishReason::DurationElapsed, now);
        self.state.phase = ScenarioPhase::Done;
        self.state.status = "done".to_string();
        if config.scenario.auto_reset_to_baseline && self.state.suite.is_none() {
            self.state.reset_due_at =
                Some(now + Duration::seconds(i64::from(config.scenario.reset_pause_sec)));
        }
    }

    /// Stops a running scenario. Restores the baseline right away when
    /// auto-reset is on and no suite manages the run. No-op when idle.
    pub fn stop(&mut self, model: &mut PlantModel, config: &SimulatorConfig, now: NaiveDateTime) -> bool {
        if !self.state.running {
            return false;
        }
        self.finish(FinishReason::Stopped, now);
        self.state.phase = ScenarioPhase::Stopped;
        self.state.status = "stopped".to_string();
        if config.scenario.auto_reset_to_baseline && self.state.suite.is_none() {
            self.reset_to_baseline(model, config, now);
        }
        true
    }

    fn finish(&mut self, reason: FinishReason, now: NaiveDateTime) {
        let title = self
            .registry
            .get(&self.state.active)
            .map_or("", |d| d.title)
            .to_string();
        self.state.running = false;
        self.state.just_finished = Some(FinishedScenario {
            id: self.state.active.clone(),
            title,
            reason,
            started_at: self.state.started_at.unwrap_or(now),
            ended_at: now,
            duration_s: self.state.duration_s,
            suite: self.state.suite,
        });
        info!(scenario = %self.state.active, ?reason, "scenario finished");
    }

    /// Consumes the completion signal. Returns it at most once per run.
    pub fn take_just_finished(&mut self) -> Option<FinishedScenario> {
        self.state.just_finished.take()
    }

    /// Puts the plant back to baseline and the engine to idle. The
    /// selection and any unconsumed completion signal survive.
    pub fn reset_to_baseline(&mut self, model: &mut PlantModel, config: &SimulatorConfig, now: NaiveDateTime) {
        model.reset_to_baseline(config, now);
        let selected = std::mem::take(&mut self.state.selected);
        let just_finished = self.state.just_finished.take();
        self.state = ScenarioRunState {
            selected,
            just_finished,
            ..ScenarioRunState::idle()
        };
    }
}
