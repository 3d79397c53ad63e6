use chrono::{NaiveDateTime, Timelike};

/// Shortest tick length accepted by the physics (seconds).
pub const MIN_DT_S: f64 = 0.2;
/// Longest tick length accepted by the physics (seconds).
pub const MAX_DT_S: f64 = 60.0;

/// Wall-clock driven tick counter.
///
/// Each call to [`TickClock::advance`] measures the time since the previous
/// tick and clamps it into `[MIN_DT_S, MAX_DT_S]`, so a stalled process or a
/// clock jump never integrates hours of charging in one step.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use plant_sim::sim::clock::TickClock;
///
/// let t0 = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
/// let mut clock = TickClock::new(1000);
/// assert_eq!(clock.advance(t0), 1.0);
/// assert_eq!(clock.advance(t0 + chrono::Duration::seconds(600)), 60.0);
/// assert_eq!(clock.ticks(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct TickClock {
    nominal_s: f64,
    last: Option<NaiveDateTime>,
    ticks: u64,
}

impl TickClock {
    /// Creates a clock whose first tick lasts one nominal interval.
    pub fn new(interval_ms: u64) -> Self {
        Self {
            nominal_s: clamp_dt(interval_ms as f64 / 1000.0),
            last: None,
            ticks: 0,
        }
    }

    /// Records a tick at `now` and returns its clamped length in seconds.
    pub fn advance(&mut self, now: NaiveDateTime) -> f64 {
        let dt = match self.last {
            Some(prev) => clamp_dt((now - prev).num_milliseconds() as f64 / 1000.0),
            None => self.nominal_s,
        };
        self.last = Some(now);
        self.ticks += 1;
        dt
    }

    /// Number of ticks recorded so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Nominal tick length in seconds.
    pub fn nominal_s(&self) -> f64 {
        self.nominal_s
    }
}

fn clamp_dt(dt_s: f64) -> f64 {
    if dt_s.is_finite() {
        dt_s.clamp(MIN_DT_S, MAX_DT_S)
    } else {
        MIN_DT_S
    }
}

/// Local time of day in fractional hours.
pub fn hour_of_day(now: NaiveDateTime) -> f64 {
    f64::from(now.hour()) + f64::from(now.minute()) / 60.0 + f64::from(now.second()) / 3600.0
}
