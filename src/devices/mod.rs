//! Per-device physics for the simulated plant.

/// Site base load with noise.
pub mod baseload;
/// Stationary battery storage model.
pub mod battery;
/// EV charge point model.
pub mod ev_charger;
/// Heat pump, CHP and generator setpoint followers.
pub mod flexible;
/// Solar photovoltaic generation model.
pub mod solar;
pub mod types;

pub use baseload::BaseLoad;
pub use battery::{Setpoint, Storage};
pub use ev_charger::{ChargePoint, ChargeStatus, ChargerType};
pub use flexible::{DeviceKind, FlexDevice};
pub use solar::{Pv, PvOverride};
pub use types::{Device, TickContext};
