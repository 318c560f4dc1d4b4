//! Injected time source.
//!
//! RULE: No calendar or tracker logic reads the wall clock directly.
//! Everything that needs "now" takes a `Clock`, so tests can pin
//! instants deterministically.

use chrono::NaiveDateTime;
use std::sync::Mutex;

/// The contract every time source must fulfill.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Production clock: local wall-clock time, naive (single-timezone
/// calendars only — see the calendar module).
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// A clock that only moves when told to. Used in tests and demo runs.
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, t: NaiveDateTime) {
        *self.now.lock().expect("clock lock poisoned") = t;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().expect("clock lock poisoned")
    }
}
