//! slaengine-core — the SLA compliance engine of a support-ticket platform.
//!
//! The engine computes response deadlines against a fixed weekly business
//! calendar, tracks commitment state across ticket status transitions
//! (pausing while a ticket waits on the counterparty), and runs a
//! recurring sweep that reports breaches and near-breaches exactly once
//! per breach class.
//!
//! RULES:
//!   - Only the store touches the database.
//!   - Only the tracker mutates commitment fields; the sweeper reads
//!     them and conditionally flips the two notified flags.
//!   - All reads of "now" go through an injected Clock.
//!   - Calendar arithmetic is pure; no deadline is ever a naive
//!     clock-time addition.

pub mod calendar;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod notifier;
pub mod policy;
pub mod store;
pub mod sweeper;
pub mod tracker;
pub mod types;
