//! Periodic escalation sweep.
//!
//! On each run the sweeper reads active commitments, partitions them into
//! breached and warning sets, and notifies each exactly once per breach
//! class. Idempotence rests on the store's conditional flag flip: the
//! flag only goes true if the notification was delivered, so a failed
//! send is retried on the next sweep (at-least-once) and a set flag is
//! never re-sent.
//!
//! Each commitment is an isolated unit of work — one bad record or one
//! slow channel never aborts the batch, and nothing here panics the
//! process.

use crate::calendar::BusinessCalendar;
use crate::clock::Clock;
use crate::error::SlaResult;
use crate::event::SlaEvent;
use crate::notifier::{BreachClass, Notification, Notifier};
use crate::store::SlaStore;
use crate::tracker::Commitment;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Wall-clock interval between runs.
    pub interval: Duration,
    /// Lead time before a deadline during which a pre-breach notice fires.
    pub warning_window_hours: f64,
}

impl Default for SweepConfig {
    /// 15-minute interval, 2-hour warning window.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            warning_window_hours: 2.0,
        }
    }
}

/// What one sweep run did. Returned to callers and logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub skipped_outside_hours: bool,
    pub evaluated: usize,
    pub warnings_sent: usize,
    pub breaches_sent: usize,
    pub notify_failures: usize,
    pub store_failures: usize,
}

pub struct EscalationSweeper {
    store: SlaStore,
    calendar: BusinessCalendar,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    config: SweepConfig,
}

impl EscalationSweeper {
    pub fn new(
        store: SlaStore,
        calendar: BusinessCalendar,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: SweepConfig,
    ) -> Self {
        Self {
            store,
            calendar,
            clock,
            notifier,
            config,
        }
    }

    /// One sweep over all active commitments.
    pub fn run_once(&self) -> SlaResult<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        // SLA evaluation is suspended outside business hours.
        if !self.calendar.is_working_instant(now) {
            report.skipped_outside_hours = true;
            log::debug!("sweep at {now}: outside business hours, skipped");
            return Ok(report);
        }

        let active = self.store.query_active_commitments()?;
        for commitment in &active {
            report.evaluated += 1;
            if let Err(e) = self.evaluate(commitment, now, &mut report) {
                // Transient store trouble on one record; the rest of the
                // batch proceeds.
                log::warn!("sweep: ticket {} abandoned: {e}", commitment.ticket_id);
                report.store_failures += 1;
            }
        }

        self.store.append_event(
            "sweeper",
            now,
            &SlaEvent::SweepCompleted {
                evaluated: report.evaluated,
                warnings_sent: report.warnings_sent,
                breaches_sent: report.breaches_sent,
                notify_failures: report.notify_failures,
            },
        )?;
        log::info!(
            "sweep at {now}: {} evaluated, {} warnings, {} breaches, {} notify failures",
            report.evaluated,
            report.warnings_sent,
            report.breaches_sent,
            report.notify_failures
        );
        Ok(report)
    }

    fn evaluate(
        &self,
        c: &Commitment,
        now: NaiveDateTime,
        report: &mut SweepReport,
    ) -> SlaResult<()> {
        // query_active_commitments guarantees a deadline is present.
        let Some(deadline) = c.deadline else {
            return Ok(());
        };

        if !c.notified_breach && self.calendar.is_overdue(deadline, now) {
            self.notify(c, deadline, now, BreachClass::Breach, report)?;
        } else if !c.notified_warning && now < deadline && self.in_warning_window(deadline, now) {
            self.notify(c, deadline, now, BreachClass::Warning, report)?;
        }
        Ok(())
    }

    fn in_warning_window(&self, deadline: NaiveDateTime, now: NaiveDateTime) -> bool {
        let window = chrono::Duration::minutes((self.config.warning_window_hours * 60.0) as i64);
        deadline - window <= now
    }

    fn notify(
        &self,
        c: &Commitment,
        deadline: NaiveDateTime,
        now: NaiveDateTime,
        class: BreachClass,
        report: &mut SweepReport,
    ) -> SlaResult<()> {
        let notification = Notification {
            ticket_id: c.ticket_id.clone(),
            counterparty_id: c.counterparty_id.clone(),
            class,
            priority: c.priority,
            deadline,
            observed_at: now,
        };

        if let Err(e) = self.notifier.send(&notification) {
            // Flag stays false; the next sweep retries.
            log::warn!(
                "sweep: {} notification for ticket {} failed: {e}",
                class.as_str(),
                c.ticket_id
            );
            report.notify_failures += 1;
            return Ok(());
        }

        // Conditional flip: only this sweep's successful send sets the flag.
        if self.store.mark_notified(&c.ticket_id, class)? {
            let event = match class {
                BreachClass::Warning => {
                    report.warnings_sent += 1;
                    SlaEvent::WarningIssued {
                        ticket_id: c.ticket_id.clone(),
                        deadline,
                    }
                }
                BreachClass::Breach => {
                    report.breaches_sent += 1;
                    SlaEvent::BreachIssued {
                        ticket_id: c.ticket_id.clone(),
                        deadline,
                    }
                }
            };
            self.store.append_event("sweeper", now, &event)?;
        }
        Ok(())
    }

    /// Start the recurring sweep on a dedicated thread: one run
    /// immediately, then one per interval until stopped.
    pub fn spawn(self) -> SweeperHandle {
        let interval = self.config.interval;
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_stop = Arc::clone(&stop);

        let join = std::thread::spawn(move || {
            loop {
                if let Err(e) = self.run_once() {
                    log::error!("sweep run failed: {e}");
                }
                let (lock, cvar) = &*thread_stop;
                let mut stopped = lock.lock().expect("sweeper lock poisoned");
                while !*stopped {
                    let (guard, timeout) = cvar
                        .wait_timeout(stopped, interval)
                        .expect("sweeper lock poisoned");
                    stopped = guard;
                    if timeout.timed_out() {
                        break;
                    }
                }
                if *stopped {
                    return;
                }
            }
        });

        SweeperHandle {
            stop,
            join: Some(join),
        }
    }
}

/// Clean-stop handle: the current run finishes, the timer is cancelled,
/// no further runs are scheduled.
pub struct SweeperHandle {
    stop: Arc<(Mutex<bool>, Condvar)>,
    join: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn stop(mut self) {
        let (lock, cvar) = &*self.stop;
        *lock.lock().expect("sweeper lock poisoned") = true;
        cvar.notify_all();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
