//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database. The tracker, policy and
//! sweeper call store methods — they never execute SQL directly.
//!
//! The connection sits behind a mutex so the request path (tracker) and
//! the sweeper thread serialize their writes; `Clone` hands out another
//! handle to the same connection.

use crate::error::{SlaError, SlaResult};
use crate::event::{EventLogEntry, SlaEvent};
use crate::notifier::BreachClass;
use crate::policy::SlaRule;
use crate::tracker::Commitment;
use crate::types::{Priority, TicketStatus};
use chrono::NaiveDateTime;
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

const DT_FMT: &str = "%Y-%m-%dT%H:%M:%S";

fn fmt_dt(t: NaiveDateTime) -> String {
    t.format(DT_FMT).to_string()
}

fn parse_dt(idx: usize, s: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DT_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_priority(idx: usize, s: &str) -> rusqlite::Result<Priority> {
    Priority::parse(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown priority '{s}'").into(),
        )
    })
}

fn parse_status(idx: usize, s: &str) -> rusqlite::Result<TicketStatus> {
    TicketStatus::parse(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown status '{s}'").into(),
        )
    })
}

#[derive(Clone)]
pub struct SlaStore {
    conn: Arc<Mutex<Connection>>,
}

impl SlaStore {
    /// Open (or create) the ticket database at `path`.
    pub fn open(path: &str) -> SlaResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better concurrent read performance for real files.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SlaResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Poisoning only happens if another holder panicked mid-write;
        // nothing sane can continue from there.
        self.conn.lock().expect("store lock poisoned")
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SlaResult<()> {
        self.conn()
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Ticket / commitment ────────────────────────────────────

    pub fn insert_ticket(&self, c: &Commitment) -> SlaResult<()> {
        self.conn().execute(
            "INSERT INTO ticket (
                ticket_id, counterparty_id, subject, priority, status,
                created_at, deadline, paused_at, spent_business_hours,
                last_resume_at, notified_warning, notified_breach, closed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                &c.ticket_id,
                &c.counterparty_id,
                &c.subject,
                c.priority.as_str(),
                c.status.as_str(),
                fmt_dt(c.created_at),
                c.deadline.map(fmt_dt),
                c.paused_at.map(fmt_dt),
                c.spent_business_hours,
                fmt_dt(c.last_resume_at),
                if c.notified_warning { 1i32 } else { 0i32 },
                if c.notified_breach { 1i32 } else { 0i32 },
                c.closed_at.map(fmt_dt),
            ],
        )?;
        Ok(())
    }

    pub fn get_commitment(&self, ticket_id: &str) -> SlaResult<Commitment> {
        self.conn()
            .query_row(
                "SELECT ticket_id, counterparty_id, subject, priority, status,
                        created_at, deadline, paused_at, spent_business_hours,
                        last_resume_at, notified_warning, notified_breach, closed_at
                 FROM ticket WHERE ticket_id = ?1",
                params![ticket_id],
                commitment_row_mapper,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => SlaError::NotFound {
                    ticket_id: ticket_id.to_string(),
                },
                other => other.into(),
            })
    }

    /// Persist the tracker-owned commitment fields in one write
    /// (all-or-nothing).
    ///
    /// The notified flags are excluded from the write-back: they only move
    /// through `mark_notified` and the re-arm here, so a stale snapshot can
    /// never revert a flag the sweeper flipped mid-transition. With
    /// `rearm_notifications` both flags reset in the same connection guard
    /// as the field write, after the superseding deadline is durable.
    pub fn update_commitment(&self, c: &Commitment, rearm_notifications: bool) -> SlaResult<()> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE ticket SET
                priority = ?2, status = ?3, deadline = ?4, paused_at = ?5,
                spent_business_hours = ?6, last_resume_at = ?7, closed_at = ?8
             WHERE ticket_id = ?1",
            params![
                &c.ticket_id,
                c.priority.as_str(),
                c.status.as_str(),
                c.deadline.map(fmt_dt),
                c.paused_at.map(fmt_dt),
                c.spent_business_hours,
                fmt_dt(c.last_resume_at),
                c.closed_at.map(fmt_dt),
            ],
        )?;
        if changed == 0 {
            return Err(SlaError::NotFound {
                ticket_id: c.ticket_id.clone(),
            });
        }
        if rearm_notifications {
            conn.execute(
                "UPDATE ticket SET notified_warning = 0, notified_breach = 0
                 WHERE ticket_id = ?1",
                params![&c.ticket_id],
            )?;
        }
        Ok(())
    }

    /// Commitments the sweeper evaluates: non-terminal, not paused, with a
    /// computed deadline.
    pub fn query_active_commitments(&self) -> SlaResult<Vec<Commitment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT ticket_id, counterparty_id, subject, priority, status,
                    created_at, deadline, paused_at, spent_business_hours,
                    last_resume_at, notified_warning, notified_breach, closed_at
             FROM ticket
             WHERE status NOT IN ('resolved', 'closed')
               AND paused_at IS NULL
               AND deadline IS NOT NULL
             ORDER BY deadline ASC",
        )?;
        let rows = stmt.query_map([], commitment_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Conditionally flip a notified flag false -> true. Returns whether
    /// this call actually flipped it — the compare-and-swap that keeps a
    /// concurrent sweep from double-sending.
    pub fn mark_notified(&self, ticket_id: &str, class: BreachClass) -> SlaResult<bool> {
        let column = match class {
            BreachClass::Warning => "notified_warning",
            BreachClass::Breach => "notified_breach",
        };
        let sql = format!(
            "UPDATE ticket SET {column} = 1 WHERE ticket_id = ?1 AND {column} = 0"
        );
        let changed = self.conn().execute(&sql, params![ticket_id])?;
        Ok(changed == 1)
    }

    // ── SLA rules ──────────────────────────────────────────────

    pub fn get_sla_rule(
        &self,
        counterparty_id: &str,
        priority: Priority,
    ) -> SlaResult<Option<SlaRule>> {
        self.conn()
            .query_row(
                "SELECT counterparty_id, priority, response_hours, resolution_hours
                 FROM sla_rule WHERE counterparty_id = ?1 AND priority = ?2",
                params![counterparty_id, priority.as_str()],
                |row| {
                    Ok(SlaRule {
                        counterparty_id: row.get(0)?,
                        priority: parse_priority(1, &row.get::<_, String>(1)?)?,
                        response_hours: row.get(2)?,
                        resolution_hours: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn upsert_sla_rule(&self, rule: &SlaRule) -> SlaResult<()> {
        self.conn().execute(
            "INSERT INTO sla_rule (counterparty_id, priority, response_hours, resolution_hours)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(counterparty_id, priority) DO UPDATE SET
                response_hours = excluded.response_hours,
                resolution_hours = excluded.resolution_hours",
            params![
                &rule.counterparty_id,
                rule.priority.as_str(),
                rule.response_hours,
                rule.resolution_hours,
            ],
        )?;
        Ok(())
    }

    pub fn insert_sla_rule_if_absent(&self, rule: &SlaRule) -> SlaResult<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO sla_rule
                (counterparty_id, priority, response_hours, resolution_hours)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &rule.counterparty_id,
                rule.priority.as_str(),
                rule.response_hours,
                rule.resolution_hours,
            ],
        )?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(
        &self,
        source: &str,
        occurred_at: NaiveDateTime,
        event: &SlaEvent,
    ) -> SlaResult<()> {
        let payload = serde_json::to_string(event)?;
        self.conn().execute(
            "INSERT INTO event_log (ticket_id, source, event_type, payload, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.ticket_id(),
                source,
                event.type_name(),
                payload,
                fmt_dt(occurred_at),
            ],
        )?;
        Ok(())
    }

    pub fn events_for_ticket(&self, ticket_id: &str) -> SlaResult<Vec<EventLogEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, ticket_id, source, event_type, payload, occurred_at
             FROM event_log WHERE ticket_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![ticket_id], |row| {
            Ok(EventLogEntry {
                id: Some(row.get(0)?),
                ticket_id: row.get(1)?,
                source: row.get(2)?,
                event_type: row.get(3)?,
                payload: row.get(4)?,
                occurred_at: parse_dt(5, &row.get::<_, String>(5)?)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn event_count(&self, event_type: &str) -> SlaResult<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
                params![event_type],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    // ── Summary helpers ────────────────────────────────────────

    pub fn ticket_count(&self) -> SlaResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM ticket", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn notified_count(&self, class: BreachClass) -> SlaResult<i64> {
        let column = match class {
            BreachClass::Warning => "notified_warning",
            BreachClass::Breach => "notified_breach",
        };
        let sql = format!("SELECT COUNT(*) FROM ticket WHERE {column} = 1");
        self.conn()
            .query_row(&sql, [], |row| row.get(0))
            .map_err(Into::into)
    }
}

fn commitment_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Commitment> {
    Ok(Commitment {
        ticket_id: row.get(0)?,
        counterparty_id: row.get(1)?,
        subject: row.get(2)?,
        priority: parse_priority(3, &row.get::<_, String>(3)?)?,
        status: parse_status(4, &row.get::<_, String>(4)?)?,
        created_at: parse_dt(5, &row.get::<_, String>(5)?)?,
        deadline: row
            .get::<_, Option<String>>(6)?
            .map(|s| parse_dt(6, &s))
            .transpose()?,
        paused_at: row
            .get::<_, Option<String>>(7)?
            .map(|s| parse_dt(7, &s))
            .transpose()?,
        spent_business_hours: row.get(8)?,
        last_resume_at: parse_dt(9, &row.get::<_, String>(9)?)?,
        notified_warning: row.get::<_, i32>(10)? != 0,
        notified_breach: row.get::<_, i32>(11)? != 0,
        closed_at: row
            .get::<_, Option<String>>(12)?
            .map(|s| parse_dt(12, &s))
            .transpose()?,
    })
}
