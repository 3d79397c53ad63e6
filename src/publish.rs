//! Change-only publishing of plant values to the state store.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::StateStore;

/// Absolute tolerance below which two numbers count as unchanged.
pub const NUMERIC_EPSILON: f64 = 1e-6;

/// A value held by a state point.
///
/// Serialized untagged, so JSON `null`, booleans, numbers and strings map
/// directly onto the variants.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl PointValue {
    /// Maps NaN and infinities to [`PointValue::Null`].
    pub fn normalized(self) -> Self {
        match self {
            Self::Number(n) if !n.is_finite() => Self::Null,
            other => other,
        }
    }

    /// Change detection: numbers within [`NUMERIC_EPSILON`] are equal,
    /// everything else compares strictly.
    pub fn same_as(&self, other: &PointValue) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => (a - b).abs() <= NUMERIC_EPSILON,
            (a, b) => a == b,
        }
    }

    /// Numeric view. Booleans map to 0/1 and numeric strings are parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Boolean view. Accepts numbers (non-zero is true) and the usual words.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(n) if n.is_finite() => Some(*n != 0.0),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "on" | "yes" => Some(true),
                "false" | "0" | "off" | "no" | "" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Text view; `None` for null.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(s.clone()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Number(n) => Some(n.to_string()),
        }
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for PointValue {
    fn from(n: f64) -> Self {
        Self::Number(n).normalized()
    }
}

impl From<bool> for PointValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<u8> for PointValue {
    fn from(n: u8) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for PointValue {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u64> for PointValue {
    fn from(n: u64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<usize> for PointValue {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for PointValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for PointValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<PointValue>> From<Option<T>> for PointValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Emits values to the store only when they differ from the last emission.
///
/// The cache is updated only after a successful write, so a failed write is
/// retried by the next publish pass.
#[derive(Debug, Default)]
pub struct ChangePublisher {
    cache: HashMap<String, PointValue>,
    emitted: u64,
}

impl ChangePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `value` under `key` as an acknowledged (own) write if it
    /// changed. Returns whether a write happened.
    pub fn publish<S: StateStore + ?Sized>(
        &mut self,
        store: &mut S,
        key: &str,
        value: impl Into<PointValue>,
    ) -> bool {
        let value = value.into().normalized();
        if self.cache.get(key).is_some_and(|cached| cached.same_as(&value)) {
            return false;
        }
        self.write(store, key, value)
    }

    /// Echoes a handled command with `ack = true`, bypassing the dedup
    /// check so the sender always sees its command answered.
    pub fn acknowledge<S: StateStore + ?Sized>(
        &mut self,
        store: &mut S,
        key: &str,
        value: impl Into<PointValue>,
    ) -> bool {
        let value = value.into().normalized();
        self.write(store, key, value)
    }

    fn write<S: StateStore + ?Sized>(&mut self, store: &mut S, key: &str, value: PointValue) -> bool {
        match store.write(key, value.clone(), true) {
            Ok(()) => {
                self.cache.insert(key.to_string(), value);
                self.emitted += 1;
                true
            }
            Err(e) => {
                warn!(key, error = %e, "state write failed, will retry on next publish");
                false
            }
        }
    }

    /// Last value emitted for `key`.
    pub fn cached(&self, key: &str) -> Option<&PointValue> {
        self.cache.get(key)
    }

    /// Total writes performed.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Forgets everything so the next pass republishes all points.
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
