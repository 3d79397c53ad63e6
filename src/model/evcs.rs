//! Charge point fleet, vehicles, and departure-time parsing.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::config::EvcsConfig;
use crate::devices::ev_charger::{ChargePoint, ChargerType};
use crate::devices::types::{Device, TickContext};

const AC_MAX_KW: f64 = 22.0;
const AC_VEHICLE_KW: f64 = 11.0;
const DC_MAX_KW: f64 = 150.0;
const DC_VEHICLE_KW: f64 = 150.0;
const DEFAULT_CAPACITY_KWH: f64 = 60.0;
const DEFAULT_SOC_PCT: f64 = 20.0;

/// The vehicle connected (or connectable) to a charge point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vehicle {
    pub id: String,
    pub soc_pct: f64,
    pub capacity_kwh: f64,
    pub max_charge_kw: f64,
    pub target_soc_pct: f64,
    /// Departure as entered (`HH:MM` or a timestamp).
    pub departure_time: String,
    /// Resolved departure deadline; `None` when unparseable.
    pub departure_ts: Option<NaiveDateTime>,
}

impl Vehicle {
    /// Sets the departure text and resolves its deadline against `now`.
    pub fn set_departure(&mut self, text: &str, now: NaiveDateTime) {
        self.departure_time = text.trim().to_string();
        self.departure_ts = parse_departure(text, now);
    }
}

/// Resolves a departure string to an absolute deadline.
///
/// `HH:MM` is placed on today's date and rolled to tomorrow unless it is
/// still ahead of `now`. RFC 3339 and `YYYY-MM-DD[T ]HH:MM[:SS]` timestamps
/// are taken as-is. Anything else yields `None`.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use plant_sim::model::evcs::parse_departure;
///
/// let now = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(22, 0, 0).unwrap();
/// let ts = parse_departure("06:15", now).unwrap();
/// assert_eq!(ts.to_string(), "2024-05-02 06:15:00");
/// assert!(parse_departure("soon", now).is_none());
/// ```
pub fn parse_departure(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(time) = NaiveTime::parse_from_str(text, "%H:%M") {
        let today = now.date().and_time(time);
        return Some(if today > now { today } else { today + Duration::days(1) });
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

/// Hardware layout of the point at `index`: every fourth point is DC.
fn point_layout(index: usize) -> (ChargerType, f64, f64) {
    if (index + 1) % 4 == 0 {
        (ChargerType::Dc, DC_MAX_KW, DC_VEHICLE_KW)
    } else {
        (ChargerType::Ac, AC_MAX_KW, AC_VEHICLE_KW)
    }
}

/// Point id for a zero-based index (`c01`, `c02`, ...).
pub fn point_id(index: usize) -> String {
    format!("c{:02}", index + 1)
}

/// Zero-based index for a point id, if it has the `cNN` shape.
pub fn point_index(id: &str) -> Option<usize> {
    let digits = id.strip_prefix('c')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<usize>().ok()?.checked_sub(1)
}

/// The ordered set of charge points. Its length is fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvcsFleet {
    points: Vec<ChargePoint>,
}

impl EvcsFleet {
    /// Builds the baseline fleet: default vehicles everywhere, the first
    /// `auto_connect_count` plugged in when auto-connect is on.
    pub fn from_config(cfg: &EvcsConfig, now: NaiveDateTime) -> Self {
        let points = (0..cfg.chargers_count)
            .map(|i| {
                let (kind, max_kw, vehicle_kw) = point_layout(i);
                let mut vehicle = Vehicle {
                    id: format!("EV-{:02}", i + 1),
                    soc_pct: DEFAULT_SOC_PCT,
                    capacity_kwh: DEFAULT_CAPACITY_KWH,
                    max_charge_kw: vehicle_kw,
                    target_soc_pct: cfg.default_target_soc_pct,
                    departure_time: String::new(),
                    departure_ts: None,
                };
                vehicle.set_departure(&cfg.default_departure_time, now);
                let mut cp = ChargePoint::new(point_id(i), kind, max_kw, vehicle);
                if cfg.auto_connect_enabled && i < cfg.auto_connect_count {
                    cp.plug();
                }
                cp
            })
            .collect();
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[ChargePoint] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [ChargePoint] {
        &mut self.points
    }

    pub fn get(&self, index: usize) -> Option<&ChargePoint> {
        self.points.get(index)
    }

    /// Mutable access by index; `None` for a point that does not exist.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut ChargePoint> {
        self.points.get_mut(index)
    }

    /// Sum of measured charge power.
    pub fn total_power_kw(&self) -> f64 {
        self.points.iter().map(|cp| cp.meas.power_kw).sum()
    }
}

impl Device for EvcsFleet {
    fn step(&mut self, ctx: &mut TickContext<'_>) {
        for cp in &mut self.points {
            cp.step(ctx);
        }
    }

    fn grid_kw(&self) -> f64 {
        self.points.iter().map(Device::grid_kw).sum()
    }
}
