//! Business-hours calendar arithmetic.
//!
//! A fixed weekly window: working weekdays, one `[start_hour, end_hour)`
//! window per working day. All operations are pure and deterministic
//! given the config — no state, no I/O, no wall-clock reads.
//!
//! The window is half-open: an instant at exactly `end_hour` is outside
//! business hours. Sub-hour amounts are handled at minute granularity
//! (sub-minute precision is out of scope).

use crate::error::{SlaError, SlaResult};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Immutable weekly-window configuration, validated at construction.
/// Weekday numbering: 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub start_hour: u32,
    pub end_hour: u32,
    pub working_weekdays: BTreeSet<u32>,
}

impl Default for CalendarConfig {
    /// 9–18, Monday through Friday.
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 18,
            working_weekdays: (1..=5).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BusinessCalendar {
    start_hour: u32,
    end_hour: u32,
    working_weekdays: BTreeSet<u32>,
}

impl BusinessCalendar {
    pub fn new(config: CalendarConfig) -> SlaResult<Self> {
        if config.start_hour > 23 || config.end_hour > 23 {
            return Err(SlaError::InvalidConfig {
                reason: format!(
                    "business hours {}..{} out of range",
                    config.start_hour, config.end_hour
                ),
            });
        }
        if config.start_hour >= config.end_hour {
            return Err(SlaError::InvalidConfig {
                reason: format!(
                    "business-hours window [{}, {}) is empty",
                    config.start_hour, config.end_hour
                ),
            });
        }
        if config.working_weekdays.is_empty() {
            return Err(SlaError::InvalidConfig {
                reason: "working weekday set is empty".into(),
            });
        }
        if let Some(&d) = config.working_weekdays.iter().find(|&&d| d > 6) {
            return Err(SlaError::InvalidConfig {
                reason: format!("weekday {d} out of range 0-6"),
            });
        }
        Ok(Self {
            start_hour: config.start_hour,
            end_hour: config.end_hour,
            working_weekdays: config.working_weekdays,
        })
    }

    fn is_working_day(&self, date: NaiveDate) -> bool {
        self.working_weekdays
            .contains(&date.weekday().num_days_from_sunday())
    }

    /// `date` at `hour`:00:00. Hours are validated at construction, so
    /// the chrono constructor cannot fail here.
    fn at_hour(&self, date: NaiveDate, hour: u32) -> NaiveDateTime {
        date.and_hms_opt(hour, 0, 0)
            .expect("hour validated at construction")
    }

    /// True iff `t` falls on a working weekday inside `[start_hour, end_hour)`.
    pub fn is_working_instant(&self, t: NaiveDateTime) -> bool {
        self.is_working_day(t.date()) && t.hour() >= self.start_hour && t.hour() < self.end_hour
    }

    /// Smallest working instant `>= t`. Snapping to a day's opening zeroes
    /// minutes and seconds.
    pub fn next_working_start(&self, t: NaiveDateTime) -> NaiveDateTime {
        if self.is_working_instant(t) {
            return t;
        }
        let mut date = t.date();
        // Same-day snap: working day, before opening.
        if self.is_working_day(date) && t.hour() < self.start_hour {
            return self.at_hour(date, self.start_hour);
        }
        // Past closing, or non-working day: advance to the next working day.
        // Terminates within 7 iterations since the weekday set is non-empty.
        loop {
            date = date.succ_opt().expect("date overflow");
            if self.is_working_day(date) {
                return self.at_hour(date, self.start_hour);
            }
        }
    }

    /// The instant `hours` business-hours after `t`.
    ///
    /// `t` is snapped into working time first if it is outside it;
    /// `hours = 0` returns that (possibly snapped) start unchanged.
    pub fn add_business_hours(&self, t: NaiveDateTime, hours: f64) -> NaiveDateTime {
        let mut remaining = (hours * 60.0).round() as i64; // minutes
        let mut cursor = self.next_working_start(t);
        if remaining <= 0 {
            return cursor;
        }
        loop {
            let day_close = self.at_hour(cursor.date(), self.end_hour);
            let available = (day_close - cursor).num_minutes();
            if remaining <= available {
                return cursor + Duration::minutes(remaining);
            }
            remaining -= available;
            let next_midnight = self
                .at_hour(cursor.date(), 0)
                .checked_add_signed(Duration::days(1))
                .expect("date overflow");
            cursor = self.next_working_start(next_midnight);
        }
    }

    /// Business-hours elapsed in `[a, b)`; 0 when `a >= b`.
    ///
    /// Monotonic in `b` and additive over intermediate instants.
    pub fn business_hours_between(&self, a: NaiveDateTime, b: NaiveDateTime) -> f64 {
        if a >= b {
            return 0.0;
        }
        let mut total_minutes = 0i64;
        let mut date = a.date();
        while date <= b.date() {
            if self.is_working_day(date) {
                let window_open = self.at_hour(date, self.start_hour);
                let window_close = self.at_hour(date, self.end_hour);
                let lo = window_open.max(a);
                let hi = window_close.min(b);
                if hi > lo {
                    total_minutes += (hi - lo).num_minutes();
                }
            }
            date = date.succ_opt().expect("date overflow");
        }
        total_minutes as f64 / 60.0
    }

    /// A breach can only be observed during business hours: outside them
    /// the commitment is frozen until the calendar reopens.
    pub fn is_overdue(&self, deadline: NaiveDateTime, now: NaiveDateTime) -> bool {
        self.is_working_instant(now) && now > deadline
    }
}
