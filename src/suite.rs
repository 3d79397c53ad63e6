//! Runs a queue of scenarios back to back with a pause in between.

use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use tracing::info;

use crate::report::ScenarioSummary;
use crate::scenario::SuiteLink;

/// Stage of a suite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteStage {
    #[default]
    Idle,
    Pause,
    Scenario,
    Done,
    Stopped,
}

impl SuiteStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pause => "pause",
            Self::Scenario => "scenario",
            Self::Done => "done",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SuiteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient state of the suite runner.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SuiteRunState {
    pub running: bool,
    pub queue: Vec<String>,
    /// Next queue position to start, or the one running.
    pub index: usize,
    /// Id of the running scenario, empty while pausing.
    pub current_id: String,
    pub stage: SuiteStage,
    pub results: Vec<ScenarioSummary>,
    pub pause_until: Option<NaiveDateTime>,
    pub started_at: Option<NaiveDateTime>,
}

/// What the caller must do after [`SuiteRunner::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuiteEvent {
    /// Apply and start this scenario.
    Start { id: String, link: SuiteLink },
    /// Queue exhausted; reset to baseline and report.
    Completed,
}

/// Suite sequencer: `pause → scenario → pause → … → done`.
#[derive(Debug, Clone, Default)]
pub struct SuiteRunner {
    state: SuiteRunState,
}

impl SuiteRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SuiteRunState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Begins a new run. The first scenario starts on the next step.
    pub fn start(&mut self, queue: Vec<String>, now: NaiveDateTime) {
        info!(scenarios = queue.len(), "suite started");
        self.state = SuiteRunState {
            running: true,
            queue,
            index: 0,
            current_id: String::new(),
            stage: SuiteStage::Pause,
            results: Vec::new(),
            pause_until: Some(now),
            started_at: Some(now),
        };
    }

    /// Advances the pause stage. Returns an event once the pause deadline
    /// has passed; `None` while pausing, running a scenario or idle.
    pub fn step(&mut self, now: NaiveDateTime) -> Option<SuiteEvent> {
        if !self.state.running || self.state.stage != SuiteStage::Pause {
            return None;
        }
        if self.state.pause_until.is_some_and(|until| now < until) {
            return None;
        }
        let total = self.state.queue.len();
        match self.state.queue.get(self.state.index).cloned() {
            Some(id) => {
                let link = SuiteLink {
                    index: self.state.index,
                    total,
                };
                info!(scenario = %id, index = link.index, total, "suite advancing");
                self.state.current_id.clone_from(&id);
                self.state.stage = SuiteStage::Scenario;
                self.state.pause_until = None;
                Some(SuiteEvent::Start { id, link })
            }
            None => {
                info!(results = self.state.results.len(), "suite done");
                self.state.running = false;
                self.state.stage = SuiteStage::Done;
                self.state.current_id.clear();
                self.state.pause_until = None;
                Some(SuiteEvent::Completed)
            }
        }
    }

    /// Records the finished scenario and enters the pause before the next.
    pub fn on_scenario_finished(&mut self, summary: ScenarioSummary, now: NaiveDateTime, pause_s: u32) {
        if !self.state.running {
            return;
        }
        self.state.results.push(summary);
        self.advance_after(now, pause_s);
    }

    /// Moves past the current entry without a result, e.g. when it could
    /// not be applied.
    pub fn skip_current(&mut self, now: NaiveDateTime) {
        if self.state.running {
            self.advance_after(now, 0);
        }
    }

    fn advance_after(&mut self, now: NaiveDateTime, pause_s: u32) {
        self.state.index += 1;
        self.state.current_id.clear();
        self.state.stage = SuiteStage::Pause;
        self.state.pause_until = Some(now + Duration::seconds(i64::from(pause_s)));
    }

    /// Stops the run. Returns `false` if no suite was running.
    pub fn stop(&mut self) -> bool {
        if !self.state.running {
            return false;
        }
        info!(index = self.state.index, "suite stopped");
        self.state.running = false;
        self.state.stage = SuiteStage::Stopped;
        self.state.current_id.clear();
        self.state.pause_until = None;
        true
    }
}
