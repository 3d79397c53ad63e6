//! Scenario catalog and the engine that applies and runs scenarios.

pub mod catalog;
pub mod engine;
pub mod fuzz;
pub mod setups;
pub mod timelines;

pub use catalog::{BASELINE_ID, ScenarioInfo, ScenarioKind, ScenarioRegistry};
pub use engine::{
    ApplyOptions, FinishReason, FinishedScenario, ScenarioEngine, ScenarioError, ScenarioPhase,
    SuiteLink,
};
