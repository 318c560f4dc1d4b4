//! SLA policy resolution.
//!
//! An explicit `sla_rule` row per (counterparty, priority) wins; otherwise
//! built-in defaults keyed by priority apply. Defaults are total — every
//! priority resolves to a budget, there is no error path.
//!
//! Editing a rule is never retroactive: deadlines already computed from the
//! old budget stay as they are.

use crate::error::SlaResult;
use crate::store::SlaStore;
use crate::types::Priority;
use serde::{Deserialize, Serialize};

/// Committed response/resolution budgets, in business-hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub response_hours: f64,
    pub resolution_hours: f64,
}

/// A persisted per-counterparty override. At most one row per
/// (counterparty, priority).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaRule {
    pub counterparty_id: String,
    pub priority: Priority,
    pub response_hours: f64,
    pub resolution_hours: f64,
}

/// Built-in budgets, monotonic in urgency: urgent < high < normal < low.
pub fn default_budget(priority: Priority) -> Budget {
    match priority {
        Priority::Urgent => Budget {
            response_hours: 2.0,
            resolution_hours: 8.0,
        },
        Priority::High => Budget {
            response_hours: 4.0,
            resolution_hours: 16.0,
        },
        Priority::Normal => Budget {
            response_hours: 8.0,
            resolution_hours: 40.0,
        },
        Priority::Low => Budget {
            response_hours: 24.0,
            resolution_hours: 80.0,
        },
    }
}

pub struct SlaPolicy {
    store: SlaStore,
}

impl SlaPolicy {
    pub fn new(store: SlaStore) -> Self {
        Self { store }
    }

    /// Committed budget for a (counterparty, priority) pair.
    pub fn resolve_budget(&self, counterparty_id: &str, priority: Priority) -> SlaResult<Budget> {
        let rule = self.store.get_sla_rule(counterparty_id, priority)?;
        Ok(match rule {
            Some(r) => Budget {
                response_hours: r.response_hours,
                resolution_hours: r.resolution_hours,
            },
            None => default_budget(priority),
        })
    }

    /// Seed explicit rows carrying the defaults for a newly onboarded
    /// counterparty. Existing rows are left untouched.
    pub fn seed_default_rules(&self, counterparty_id: &str) -> SlaResult<()> {
        for priority in Priority::ALL {
            let b = default_budget(priority);
            self.store.insert_sla_rule_if_absent(&SlaRule {
                counterparty_id: counterparty_id.to_string(),
                priority,
                response_hours: b.response_hours,
                resolution_hours: b.resolution_hours,
            })?;
        }
        log::debug!("seeded default SLA rules for counterparty {counterparty_id}");
        Ok(())
    }

    /// Create or replace an explicit rule.
    pub fn upsert_rule(&self, rule: &SlaRule) -> SlaResult<()> {
        self.store.upsert_sla_rule(rule)
    }
}
