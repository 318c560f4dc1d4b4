//! Commitment tracking — the ticket lifecycle state machine.
//!
//! RULE: Commitment fields are mutated here and nowhere else. The sweeper
//! only reads them (plus the two notified flags, flipped through the
//! store's conditional write).
//!
//! Deadlines are always a product of calendar arithmetic anchored at the
//! ticket's creation or at "now" on resume — never a naive clock-time
//! addition.

use crate::calendar::BusinessCalendar;
use crate::clock::Clock;
use crate::error::{SlaError, SlaResult};
use crate::event::SlaEvent;
use crate::policy::SlaPolicy;
use crate::store::SlaStore;
use crate::types::{CounterpartyId, Priority, TicketId, TicketStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// The SLA obligation attached to a ticket: deadline plus accrual state.
///
/// `spent_business_hours` accumulates across pause/resume cycles: it is
/// rolled up whenever accrual stops (pause, close, priority re-anchor),
/// and `last_resume_at` marks where the live accrual window starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commitment {
    pub ticket_id: TicketId,
    pub counterparty_id: CounterpartyId,
    pub subject: String,
    pub priority: Priority,
    pub status: TicketStatus,
    pub created_at: NaiveDateTime,
    pub deadline: Option<NaiveDateTime>,
    pub paused_at: Option<NaiveDateTime>,
    pub spent_business_hours: f64,
    pub last_resume_at: NaiveDateTime,
    pub notified_warning: bool,
    pub notified_breach: bool,
    pub closed_at: Option<NaiveDateTime>,
}

pub struct CommitmentTracker {
    store: SlaStore,
    calendar: BusinessCalendar,
    policy: SlaPolicy,
    clock: Arc<dyn Clock>,
    // Serializes apply_transition: two transitions racing on one ticket
    // would both roll accrual from the same last_resume_at.
    transition_lock: Mutex<()>,
}

impl CommitmentTracker {
    pub fn new(
        store: SlaStore,
        calendar: BusinessCalendar,
        policy: SlaPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            calendar,
            policy,
            clock,
            transition_lock: Mutex::new(()),
        }
    }

    /// Open a ticket and compute its first response deadline.
    pub fn open_ticket(
        &self,
        counterparty_id: &str,
        subject: &str,
        priority: Priority,
    ) -> SlaResult<Commitment> {
        let now = self.clock.now();
        let budget = self.policy.resolve_budget(counterparty_id, priority)?;
        let deadline = self.calendar.add_business_hours(now, budget.response_hours);

        let commitment = Commitment {
            ticket_id: format!("tkt-{}", Uuid::new_v4()),
            counterparty_id: counterparty_id.to_string(),
            subject: subject.to_string(),
            priority,
            status: TicketStatus::Open,
            created_at: now,
            deadline: Some(deadline),
            paused_at: None,
            spent_business_hours: 0.0,
            last_resume_at: now,
            notified_warning: false,
            notified_breach: false,
            closed_at: None,
        };

        self.store.insert_ticket(&commitment)?;
        self.store.append_event(
            "tracker",
            now,
            &SlaEvent::CommitmentOpened {
                ticket_id: commitment.ticket_id.clone(),
                counterparty_id: commitment.counterparty_id.clone(),
                priority,
                deadline,
            },
        )?;
        log::info!(
            "ticket {} opened ({counterparty_id}, {priority}) — respond by {deadline}",
            commitment.ticket_id
        );
        Ok(commitment)
    }

    /// Apply a status and/or priority change to a ticket.
    ///
    /// The updated commitment is computed in full before a single store
    /// write; a rejected transition mutates nothing.
    pub fn apply_transition(
        &self,
        ticket_id: &str,
        new_status: Option<TicketStatus>,
        new_priority: Option<Priority>,
    ) -> SlaResult<Commitment> {
        let now = self.clock.now();
        let _guard = self
            .transition_lock
            .lock()
            .expect("tracker lock poisoned");
        let mut c = self.store.get_commitment(ticket_id)?;
        let old_deadline = c.deadline;
        let mut events: Vec<SlaEvent> = Vec::new();

        if let Some(next) = new_status {
            if next != c.status {
                if !c.status.can_transition_to(next) {
                    return Err(SlaError::InvalidTransition {
                        from: c.status.to_string(),
                        to: next.to_string(),
                    });
                }
                self.apply_status_change(&mut c, next, now, &mut events)?;
            }
        }

        if let Some(priority) = new_priority {
            if priority != c.priority {
                self.apply_priority_change(&mut c, priority, now, &mut events)?;
            }
        }

        // A strictly later deadline supersedes the window the old notices
        // referred to, so both idempotence flags re-arm. The reset happens
        // in the store alongside the field write; this snapshot's flag
        // values are never written back.
        let rearm = deadline_moved_later(old_deadline, c.deadline);
        if rearm {
            c.notified_warning = false;
            c.notified_breach = false;
            log::debug!("ticket {ticket_id}: notification flags re-armed for new deadline");
        }

        self.store.update_commitment(&c, rearm)?;
        for event in &events {
            self.store.append_event("tracker", now, event)?;
        }
        Ok(c)
    }

    fn apply_status_change(
        &self,
        c: &mut Commitment,
        next: TicketStatus,
        now: NaiveDateTime,
        events: &mut Vec<SlaEvent>,
    ) -> SlaResult<()> {
        let prev = c.status;
        match next {
            TicketStatus::WaitingCounterparty => {
                // Pause: roll live accrual into spent, freeze the deadline.
                c.spent_business_hours +=
                    self.calendar.business_hours_between(c.last_resume_at, now);
                c.paused_at = Some(now);
                events.push(SlaEvent::CommitmentPaused {
                    ticket_id: c.ticket_id.clone(),
                    spent_business_hours: c.spent_business_hours,
                });
                log::info!(
                    "ticket {} paused with {:.2} business-hours spent",
                    c.ticket_id,
                    c.spent_business_hours
                );
            }
            TicketStatus::Open | TicketStatus::InProgress => {
                if prev == TicketStatus::WaitingCounterparty {
                    // Resume: remaining budget re-anchored at now.
                    let remaining = self.recompute_deadline(c, now)?;
                    c.paused_at = None;
                    events.push(SlaEvent::CommitmentResumed {
                        ticket_id: c.ticket_id.clone(),
                        remaining_hours: remaining,
                        deadline: c.deadline.unwrap_or(now),
                    });
                    log::info!(
                        "ticket {} resumed with {remaining:.2} business-hours remaining",
                        c.ticket_id
                    );
                } else if prev.is_terminal() {
                    // Reopen: fresh remaining-budget window from now, with
                    // whatever was already accrued.
                    c.closed_at = None;
                    let _ = self.recompute_deadline(c, now)?;
                    events.push(SlaEvent::CommitmentReopened {
                        ticket_id: c.ticket_id.clone(),
                        deadline: c.deadline.unwrap_or(now),
                    });
                    log::info!("ticket {} reopened", c.ticket_id);
                }
                // open <-> in_progress carries no SLA effect.
            }
            TicketStatus::Resolved | TicketStatus::Closed => {
                if !prev.is_terminal() {
                    if c.paused_at.is_none() {
                        // Accrual up to closure counts toward a later reopen.
                        c.spent_business_hours +=
                            self.calendar.business_hours_between(c.last_resume_at, now);
                        c.last_resume_at = now;
                    }
                    c.paused_at = None;
                    c.closed_at = Some(now);
                    events.push(SlaEvent::CommitmentClosed {
                        ticket_id: c.ticket_id.clone(),
                        status: next,
                    });
                    log::info!("ticket {} {next} — SLA frozen", c.ticket_id);
                }
                // resolved -> closed: already frozen, nothing to roll.
            }
        }
        c.status = next;
        Ok(())
    }

    fn apply_priority_change(
        &self,
        c: &mut Commitment,
        priority: Priority,
        now: NaiveDateTime,
        events: &mut Vec<SlaEvent>,
    ) -> SlaResult<()> {
        let old = c.priority;
        c.priority = priority;
        events.push(SlaEvent::PriorityChanged {
            ticket_id: c.ticket_id.clone(),
            old_priority: old,
            new_priority: priority,
        });

        // A bump tightens (or loosens) the remaining window from the
        // current instant. Paused and frozen commitments keep their state;
        // a paused ticket picks up the new budget at resume.
        if !c.status.is_terminal() && c.paused_at.is_none() {
            let remaining = self.recompute_deadline(c, now)?;
            events.push(SlaEvent::DeadlineRecomputed {
                ticket_id: c.ticket_id.clone(),
                deadline: c.deadline.unwrap_or(now),
            });
            log::info!(
                "ticket {} priority {old} -> {priority}, {remaining:.2} business-hours remaining",
                c.ticket_id
            );
        }
        Ok(())
    }

    /// Roll live accrual into `spent`, then anchor a fresh deadline at
    /// `now` from the remaining response budget. Returns the remaining
    /// hours.
    fn recompute_deadline(&self, c: &mut Commitment, now: NaiveDateTime) -> SlaResult<f64> {
        if c.paused_at.is_none() && !c.status.is_terminal() {
            c.spent_business_hours += self.calendar.business_hours_between(c.last_resume_at, now);
        }
        c.last_resume_at = now;
        let budget = self
            .policy
            .resolve_budget(&c.counterparty_id, c.priority)?;
        let remaining = (budget.response_hours - c.spent_business_hours).max(0.0);
        c.deadline = Some(self.calendar.add_business_hours(now, remaining));
        Ok(remaining)
    }
}

fn deadline_moved_later(old: Option<NaiveDateTime>, new: Option<NaiveDateTime>) -> bool {
    match (old, new) {
        (Some(o), Some(n)) => n > o,
        (None, Some(_)) => true,
        _ => false,
    }
}
