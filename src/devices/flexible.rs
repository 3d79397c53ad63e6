use std::fmt;

use serde::Serialize;

use crate::devices::battery::Setpoint;
use crate::devices::types::{Device, TickContext, finite_or};

/// Kind of a setpoint-following flexible device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Heat pump, a consumer.
    Heatpump,
    /// Combined heat and power unit, a generator.
    Chp,
    /// Backup generator.
    Generator,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 3] = [DeviceKind::Heatpump, DeviceKind::Chp, DeviceKind::Generator];

    /// Power ceiling in kW.
    pub fn ceiling_kw(self) -> f64 {
        match self {
            Self::Heatpump => 500.0,
            Self::Chp | Self::Generator => 5000.0,
        }
    }

    /// Whether the device draws power from the site (true) or feeds it.
    pub fn is_consumer(self) -> bool {
        matches!(self, Self::Heatpump)
    }

    /// Key prefix used for published points and commands.
    pub fn key(self) -> &'static str {
        match self {
            Self::Heatpump => "heatpump",
            Self::Chp => "chp",
            Self::Generator => "generator",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A flexible load or generator that passes its setpoint through.
///
/// `power_kw` is always non-negative; the direction comes from the kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlexDevice {
    pub kind: DeviceKind,
    pub power_kw: f64,
    pub ctrl: Setpoint,
}

impl FlexDevice {
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            power_kw: 0.0,
            ctrl: Setpoint::default(),
        }
    }
}

impl Device for FlexDevice {
    fn step(&mut self, _ctx: &mut TickContext<'_>) {
        self.power_kw = if self.ctrl.enabled {
            finite_or(self.ctrl.power_set_kw, 0.0).clamp(0.0, self.kind.ceiling_kw())
        } else {
            0.0
        };
    }

    fn grid_kw(&self) -> f64 {
        if self.kind.is_consumer() { self.power_kw } else { -self.power_kw }
    }
}
