//! Configuration surface tests: duration parsing and the env-driven
//! overrides, including the malformed-value rejection paths.

use slaengine_core::config::{parse_duration, EngineConfig};
use slaengine_core::error::SlaError;
use std::collections::BTreeSet;
use std::env;
use std::time::Duration;

#[test]
fn duration_suffixes_parse() {
    assert_eq!(parse_duration("900s"), Some(Duration::from_secs(900)));
    assert_eq!(parse_duration("15m"), Some(Duration::from_secs(900)));
    assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
    // A bare number is seconds.
    assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
    assert_eq!(parse_duration("0s"), Some(Duration::ZERO));
}

#[test]
fn malformed_durations_are_rejected() {
    for raw in ["", "soon", "m", "h", "1.5h", "2d", "-3s"] {
        assert_eq!(parse_duration(raw), None, "'{raw}' should not parse");
    }
}

/// All environment manipulation lives in this one test so parallel test
/// threads in this binary never race on the process environment.
#[test]
fn env_overrides_and_rejections() {
    // Fully specified environment.
    env::set_var("BUSINESS_HOURS_START", "8");
    env::set_var("BUSINESS_HOURS_END", "16");
    env::set_var("BUSINESS_DAYS", "2, 4");
    env::set_var("SLA_CHECK_INTERVAL", "5m");
    env::set_var("SLA_WARNING_WINDOW", "30m");

    let config = EngineConfig::from_env().expect("valid environment");
    assert_eq!(config.calendar.start_hour, 8);
    assert_eq!(config.calendar.end_hour, 16);
    assert_eq!(
        config.calendar.working_weekdays,
        [2u32, 4].into_iter().collect::<BTreeSet<_>>()
    );
    assert_eq!(config.sweep.interval, Duration::from_secs(300));
    assert!((config.sweep.warning_window_hours - 0.5).abs() < 1e-9);

    // Each malformed value is fatal at startup.
    env::set_var("BUSINESS_HOURS_START", "banana");
    assert!(matches!(
        EngineConfig::from_env(),
        Err(SlaError::InvalidConfig { .. })
    ));
    env::set_var("BUSINESS_HOURS_START", "8");

    env::set_var("BUSINESS_DAYS", "1,x,5");
    assert!(matches!(
        EngineConfig::from_env(),
        Err(SlaError::InvalidConfig { .. })
    ));
    env::set_var("BUSINESS_DAYS", "2,4");

    env::set_var("SLA_CHECK_INTERVAL", "soon");
    assert!(matches!(
        EngineConfig::from_env(),
        Err(SlaError::InvalidConfig { .. })
    ));

    // Unset everything: the defaults apply.
    for name in [
        "BUSINESS_HOURS_START",
        "BUSINESS_HOURS_END",
        "BUSINESS_DAYS",
        "SLA_CHECK_INTERVAL",
        "SLA_WARNING_WINDOW",
    ] {
        env::remove_var(name);
    }
    let config = EngineConfig::from_env().expect("defaults");
    assert_eq!(config.calendar.start_hour, 9);
    assert_eq!(config.calendar.end_hour, 18);
    assert_eq!(
        config.calendar.working_weekdays,
        (1u32..=5).collect::<BTreeSet<_>>()
    );
    assert_eq!(config.sweep.interval, Duration::from_secs(15 * 60));
    assert!((config.sweep.warning_window_hours - 2.0).abs() < 1e-9);
}
