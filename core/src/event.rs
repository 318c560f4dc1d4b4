//! Audit event log entries.
//!
//! Every SLA-relevant mutation and every notification is appended to the
//! event_log table as a tagged JSON payload. The log is append-only:
//! variants are added, never removed or reordered.

use crate::types::{CounterpartyId, Priority, TicketId, TicketStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlaEvent {
    CommitmentOpened {
        ticket_id: TicketId,
        counterparty_id: CounterpartyId,
        priority: Priority,
        deadline: NaiveDateTime,
    },
    CommitmentPaused {
        ticket_id: TicketId,
        spent_business_hours: f64,
    },
    CommitmentResumed {
        ticket_id: TicketId,
        remaining_hours: f64,
        deadline: NaiveDateTime,
    },
    CommitmentClosed {
        ticket_id: TicketId,
        status: TicketStatus,
    },
    CommitmentReopened {
        ticket_id: TicketId,
        deadline: NaiveDateTime,
    },
    PriorityChanged {
        ticket_id: TicketId,
        old_priority: Priority,
        new_priority: Priority,
    },
    DeadlineRecomputed {
        ticket_id: TicketId,
        deadline: NaiveDateTime,
    },
    WarningIssued {
        ticket_id: TicketId,
        deadline: NaiveDateTime,
    },
    BreachIssued {
        ticket_id: TicketId,
        deadline: NaiveDateTime,
    },
    SweepCompleted {
        evaluated: usize,
        warnings_sent: usize,
        breaches_sent: usize,
        notify_failures: usize,
    },
}

impl SlaEvent {
    /// Stable string name, used for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            SlaEvent::CommitmentOpened { .. } => "commitment_opened",
            SlaEvent::CommitmentPaused { .. } => "commitment_paused",
            SlaEvent::CommitmentResumed { .. } => "commitment_resumed",
            SlaEvent::CommitmentClosed { .. } => "commitment_closed",
            SlaEvent::CommitmentReopened { .. } => "commitment_reopened",
            SlaEvent::PriorityChanged { .. } => "priority_changed",
            SlaEvent::DeadlineRecomputed { .. } => "deadline_recomputed",
            SlaEvent::WarningIssued { .. } => "warning_issued",
            SlaEvent::BreachIssued { .. } => "breach_issued",
            SlaEvent::SweepCompleted { .. } => "sweep_completed",
        }
    }

    /// The ticket this event concerns, if any.
    pub fn ticket_id(&self) -> Option<&str> {
        match self {
            SlaEvent::CommitmentOpened { ticket_id, .. }
            | SlaEvent::CommitmentPaused { ticket_id, .. }
            | SlaEvent::CommitmentResumed { ticket_id, .. }
            | SlaEvent::CommitmentClosed { ticket_id, .. }
            | SlaEvent::CommitmentReopened { ticket_id, .. }
            | SlaEvent::PriorityChanged { ticket_id, .. }
            | SlaEvent::DeadlineRecomputed { ticket_id, .. }
            | SlaEvent::WarningIssued { ticket_id, .. }
            | SlaEvent::BreachIssued { ticket_id, .. } => Some(ticket_id),
            SlaEvent::SweepCompleted { .. } => None,
        }
    }
}

/// A persisted row of the event_log table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub ticket_id: Option<TicketId>,
    pub source: String,
    pub event_type: String,
    pub payload: String,
    pub occurred_at: NaiveDateTime,
}
