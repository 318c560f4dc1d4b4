//! Environment-driven configuration surface.
//!
//! Recognized variables:
//!   BUSINESS_HOURS_START  int hour, default 9
//!   BUSINESS_HOURS_END    int hour, default 18
//!   BUSINESS_DAYS         comma list of weekday ints (0=Sun..6=Sat),
//!                         default 1,2,3,4,5 (Mon-Fri)
//!   SLA_CHECK_INTERVAL    duration with s/m/h suffix, default 15m
//!   SLA_WARNING_WINDOW    duration with s/m/h suffix, default 2h
//!
//! Malformed values are an InvalidConfig error — fatal at startup, the
//! engine refuses to run on a broken calendar.

use crate::calendar::CalendarConfig;
use crate::error::{SlaError, SlaResult};
use crate::sweeper::SweepConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub calendar: CalendarConfig,
    pub sweep: SweepConfig,
}

impl EngineConfig {
    /// Read the configuration surface from the process environment,
    /// falling back to defaults for unset variables.
    pub fn from_env() -> SlaResult<Self> {
        let defaults = CalendarConfig::default();
        let sweep_defaults = SweepConfig::default();

        let calendar = CalendarConfig {
            start_hour: hour_var("BUSINESS_HOURS_START", defaults.start_hour)?,
            end_hour: hour_var("BUSINESS_HOURS_END", defaults.end_hour)?,
            working_weekdays: days_var("BUSINESS_DAYS", defaults.working_weekdays)?,
        };
        let sweep = SweepConfig {
            interval: duration_var("SLA_CHECK_INTERVAL", sweep_defaults.interval)?,
            warning_window_hours: duration_var(
                "SLA_WARNING_WINDOW",
                Duration::from_secs((sweep_defaults.warning_window_hours * 3600.0) as u64),
            )?
            .as_secs_f64()
                / 3600.0,
        };
        Ok(Self { calendar, sweep })
    }
}

fn hour_var(name: &str, default: u32) -> SlaResult<u32> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<u32>().map_err(|_| SlaError::InvalidConfig {
            reason: format!("{name}='{raw}' is not an hour"),
        }),
        Err(_) => Ok(default),
    }
}

fn days_var(name: &str, default: BTreeSet<u32>) -> SlaResult<BTreeSet<u32>> {
    let raw = match std::env::var(name) {
        Ok(raw) => raw,
        Err(_) => return Ok(default),
    };
    let mut days = BTreeSet::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let day = part.parse::<u32>().map_err(|_| SlaError::InvalidConfig {
            reason: format!("{name}: '{part}' is not a weekday number"),
        })?;
        days.insert(day);
    }
    Ok(days)
}

fn duration_var(name: &str, default: Duration) -> SlaResult<Duration> {
    match std::env::var(name) {
        Ok(raw) => parse_duration(raw.trim()).ok_or_else(|| SlaError::InvalidConfig {
            reason: format!("{name}='{raw}' is not a duration (try 900s, 15m, 2h)"),
        }),
        Err(_) => Ok(default),
    }
}

/// "900s", "15m", "2h"; a bare number is seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    if raw.is_empty() {
        return None;
    }
    let (value, multiplier) = match raw.chars().last() {
        Some('s') => (&raw[..raw.len() - 1], 1u64),
        Some('m') => (&raw[..raw.len() - 1], 60),
        Some('h') => (&raw[..raw.len() - 1], 3600),
        Some(c) if c.is_ascii_digit() => (raw, 1),
        _ => return None,
    };
    let n = value.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(n * multiplier))
}
