//! Outbound notification channel contract.
//!
//! The channel may be slow or unreliable; a failed send is reported as an
//! error, never a panic, and the sweeper retries it on the next run.

use crate::error::SlaResult;
use crate::types::{CounterpartyId, Priority, TicketId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Which SLA boundary the notice refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachClass {
    Warning,
    Breach,
}

impl BreachClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreachClass::Warning => "warning",
            BreachClass::Breach => "breach",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub ticket_id: TicketId,
    pub counterparty_id: CounterpartyId,
    pub class: BreachClass,
    pub priority: Priority,
    pub deadline: NaiveDateTime,
    pub observed_at: NaiveDateTime,
}

/// The contract every notification channel must fulfill.
pub trait Notifier: Send + Sync {
    fn send(&self, notification: &Notification) -> SlaResult<()>;
}

/// Reference channel: writes notices to the log. Real deployments plug in
/// mail or chat senders behind the same trait.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, n: &Notification) -> SlaResult<()> {
        match n.class {
            BreachClass::Warning => log::warn!(
                "SLA warning: ticket {} ({}) due {} (priority {})",
                n.ticket_id,
                n.counterparty_id,
                n.deadline,
                n.priority,
            ),
            BreachClass::Breach => log::error!(
                "SLA BREACH: ticket {} ({}) was due {} (priority {})",
                n.ticket_id,
                n.counterparty_id,
                n.deadline,
                n.priority,
            ),
        }
        Ok(())
    }
}
