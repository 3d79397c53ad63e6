//! Write accounting and scenario/suite summaries.
//!
//! While a scenario or suite runs, every accepted external write is
//! classified and counted. The counters end up in the summary published
//! when the scenario (or the whole suite) finishes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::publish::PointValue;
use crate::scenario::{FinishReason, FinishedScenario, SuiteLink};

/// Fixed classification of external writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteCategory {
    EvcsLimit,
    EvcsEnable,
    EvcsPlug,
    StoragePower,
    StorageEnable,
    Heatpump,
    Chp,
    Generator,
    GridLimit,
    Tariff,
    PvOverride,
    Other,
}

impl WriteCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EvcsLimit => "evcs_limit",
            Self::EvcsEnable => "evcs_enable",
            Self::EvcsPlug => "evcs_plug",
            Self::StoragePower => "storage_power",
            Self::StorageEnable => "storage_enable",
            Self::Heatpump => "heatpump",
            Self::Chp => "chp",
            Self::Generator => "generator",
            Self::GridLimit => "grid_limit",
            Self::Tariff => "tariff",
            Self::PvOverride => "pv_override",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for WriteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The most recent counted write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastWrite {
    pub key: String,
    pub value: PointValue,
    pub at: NaiveDateTime,
}

/// Write counters for one scenario or suite run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteStats {
    pub total: u64,
    pub by_category: BTreeMap<WriteCategory, u64>,
    pub last: Option<LastWrite>,
}

impl WriteStats {
    pub fn record(&mut self, key: &str, category: WriteCategory, value: &PointValue, at: NaiveDateTime) {
        self.total += 1;
        *self.by_category.entry(category).or_insert(0) += 1;
        self.last = Some(LastWrite {
            key: key.to_string(),
            value: value.clone(),
            at,
        });
    }

    pub fn count(&self, category: WriteCategory) -> u64 {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}

/// Report of one finished scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub id: String,
    pub title: String,
    pub started_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
    pub elapsed_s: f64,
    pub configured_duration_s: u32,
    pub reason: FinishReason,
    pub writes: WriteStats,
    pub suite: Option<SuiteLink>,
}

/// How a suite run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteOutcome {
    Completed,
    Stopped,
}

/// Aggregate report of a suite run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteSummary {
    pub started_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
    pub total: usize,
    pub completed: usize,
    pub outcome: SuiteOutcome,
    /// Every write counted during the suite, pauses included.
    pub writes: WriteStats,
    pub results: Vec<ScenarioSummary>,
}

#[derive(Debug, Clone, Default)]
struct SuiteAccumulator {
    started_at: Option<NaiveDateTime>,
    total: usize,
    writes: WriteStats,
}

/// Collects write statistics and builds summaries.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    scenario: WriteStats,
    suite: Option<SuiteAccumulator>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts counting for a new scenario run.
    pub fn begin(&mut self) {
        self.scenario = WriteStats::default();
    }

    /// Counts one accepted external write.
    pub fn record(&mut self, key: &str, category: WriteCategory, value: &PointValue, at: NaiveDateTime) {
        self.scenario.record(key, category, value, at);
        if let Some(suite) = &mut self.suite {
            suite.writes.record(key, category, value, at);
        }
    }

    /// Counters of the scenario currently being recorded.
    pub fn current(&self) -> &WriteStats {
        &self.scenario
    }

    /// Builds the summary of a finished scenario and clears its counters.
    pub fn finish_scenario(&mut self, finished: &FinishedScenario) -> ScenarioSummary {
        let writes = std::mem::take(&mut self.scenario);
        info!(
            scenario = %finished.id,
            reason = ?finished.reason,
            writes = writes.total,
            "scenario report"
        );
        ScenarioSummary {
            id: finished.id.clone(),
            title: finished.title.clone(),
            started_at: finished.started_at,
            ended_at: finished.ended_at,
            elapsed_s: finished.elapsed_s(),
            configured_duration_s: finished.duration_s,
            reason: finished.reason,
            writes,
            suite: finished.suite,
        }
    }

    /// Starts suite-level accounting.
    pub fn begin_suite(&mut self, total: usize, now: NaiveDateTime) {
        self.scenario = WriteStats::default();
        self.suite = Some(SuiteAccumulator {
            started_at: Some(now),
            total,
            writes: WriteStats::default(),
        });
    }

    /// Builds the suite summary from the per-scenario results.
    pub fn finish_suite(
        &mut self,
        results: &[ScenarioSummary],
        outcome: SuiteOutcome,
        now: NaiveDateTime,
    ) -> SuiteSummary {
        let acc = self.suite.take().unwrap_or_default();
        let completed = results
            .iter()
            .filter(|r| r.reason == FinishReason::DurationElapsed)
            .count();
        info!(?outcome, total = acc.total, completed, "suite report");
        SuiteSummary {
            started_at: acc.started_at.unwrap_or(now),
            ended_at: now,
            total: acc.total.max(results.len()),
            completed,
            outcome,
            writes: acc.writes,
            results: results.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn finished(id: &str, reason: FinishReason, secs: i64) -> FinishedScenario {
        FinishedScenario {
            id: id.into(),
            title: id.to_uppercase(),
            reason,
            started_at: t0(),
            ended_at: t0() + Duration::seconds(secs),
            duration_s: 60,
            suite: None,
        }
    }

    #[test]
    fn counts_by_category_and_keeps_last_write() {
        let mut rb = ReportBuilder::new();
        rb.begin();
        rb.record("evcs.c01.ctrl.limitKw", WriteCategory::EvcsLimit, &PointValue::from(11.0), t0());
        rb.record("evcs.c02.ctrl.limitKw", WriteCategory::EvcsLimit, &PointValue::from(7.0), t0());
        rb.record("storage.ctrl.powerSetKw", WriteCategory::StoragePower, &PointValue::from(-5.0), t0());

        let s = rb.finish_scenario(&finished("grid_limit_drop", FinishReason::DurationElapsed, 60));
        assert_eq!(s.writes.total, 3);
        assert_eq!(s.writes.count(WriteCategory::EvcsLimit), 2);
        assert_eq!(s.writes.count(WriteCategory::Tariff), 0);
        assert_eq!(s.writes.last.as_ref().unwrap().key, "storage.ctrl.powerSetKw");
        assert_eq!(s.elapsed_s, 60.0);
        assert_eq!(s.configured_duration_s, 60);

        // Counters restart for the next run.
        assert_eq!(rb.current().total, 0);
    }

    #[test]
    fn suite_summary_aggregates_results() {
        let mut rb = ReportBuilder::new();
        rb.begin_suite(3, t0());
        rb.begin();
        rb.record("grid.limitKw", WriteCategory::GridLimit, &PointValue::from(50.0), t0());
        let a = rb.finish_scenario(&finished("a", FinishReason::DurationElapsed, 60));
        rb.begin();
        let b = rb.finish_scenario(&finished("b", FinishReason::Stopped, 12));
        let sum = rb.finish_suite(&[a, b], SuiteOutcome::Stopped, t0() + Duration::seconds(80));
        assert_eq!(sum.total, 3);
        assert_eq!(sum.completed, 1);
        assert_eq!(sum.results.len(), 2);
        assert_eq!(sum.writes.count(WriteCategory::GridLimit), 1);
        assert_eq!(sum.outcome, SuiteOutcome::Stopped);
    }

    #[test]
    fn summary_json_uses_camel_case_and_snake_categories() {
        let mut rb = ReportBuilder::new();
        rb.record("pv.override.enabled", WriteCategory::PvOverride, &PointValue::from(true), t0());
        let s = rb.finish_scenario(&finished("pv", FinishReason::DurationElapsed, 60));
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"configuredDurationS\":60"));
        assert!(json.contains("\"pv_override\":1"));
        assert!(json.contains("\"reason\":\"duration_elapsed\""));
    }
}
