/// Wall-clock tick timing.
pub mod clock;
pub mod engine;
pub mod power_balance;
/// Dynamic tariff and forward curve.
pub mod tariff;
pub mod types;

pub use engine::TickSimulator;
pub use types::TickResult;
