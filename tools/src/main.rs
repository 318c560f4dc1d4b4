//! sla-runner: headless runner for the SLA compliance engine.
//!
//! Usage:
//!   sla-runner --db tickets.db            (demo scenario, deterministic clock)
//!   sla-runner --live --run-secs 60       (real clock, background sweeper)

use anyhow::Result;
use chrono::{Duration as ChronoDuration, NaiveDate};
use slaengine_core::{
    calendar::BusinessCalendar,
    clock::{ManualClock, SystemClock},
    config::EngineConfig,
    notifier::{BreachClass, LogNotifier},
    policy::SlaPolicy,
    store::SlaStore,
    sweeper::EscalationSweeper,
    tracker::CommitmentTracker,
    types::{Priority, TicketStatus},
};
use std::env;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let live = args.iter().any(|a| a == "--live");
    let run_secs = parse_arg(&args, "--run-secs", 60u64);

    let config = EngineConfig::from_env()?;
    let calendar = BusinessCalendar::new(config.calendar.clone())?;

    println!("sla-runner");
    println!("  db:              {db}");
    println!(
        "  business hours:  {}..{} on days {:?}",
        config.calendar.start_hour, config.calendar.end_hour, config.calendar.working_weekdays
    );
    println!("  check interval:  {:?}", config.sweep.interval);
    println!("  warning window:  {}h", config.sweep.warning_window_hours);
    println!();

    let store = if db == ":memory:" {
        SlaStore::in_memory()?
    } else {
        SlaStore::open(db)?
    };
    store.migrate()?;

    if live {
        run_live(store, calendar, config, run_secs)
    } else {
        run_demo(store, calendar, config)
    }
}

/// Real wall clock, background sweeper thread, clean stop after run_secs.
fn run_live(
    store: SlaStore,
    calendar: BusinessCalendar,
    config: EngineConfig,
    run_secs: u64,
) -> Result<()> {
    let clock = Arc::new(SystemClock);
    let sweeper = EscalationSweeper::new(
        store.clone(),
        calendar,
        clock,
        Arc::new(LogNotifier),
        config.sweep,
    );
    let handle = sweeper.spawn();
    println!("sweeper running for {run_secs}s (stop with a clean shutdown after that)...");
    std::thread::sleep(std::time::Duration::from_secs(run_secs));
    handle.stop();
    log::info!("sweeper stopped cleanly");
    print_summary(&store)
}

/// Deterministic walkthrough of the engine on a pinned clock: a Monday
/// morning, three tickets, a pause, a priority bump, and sweeps at
/// the interesting instants.
fn run_demo(store: SlaStore, calendar: BusinessCalendar, config: EngineConfig) -> Result<()> {
    let monday_0930 = NaiveDate::from_ymd_opt(2024, 1, 8)
        .expect("valid date")
        .and_hms_opt(9, 30, 0)
        .expect("valid time");
    let clock = Arc::new(ManualClock::new(monday_0930));

    let policy = SlaPolicy::new(store.clone());
    policy.seed_default_rules("acme")?;

    let tracker = CommitmentTracker::new(
        store.clone(),
        calendar.clone(),
        SlaPolicy::new(store.clone()),
        clock.clone(),
    );
    let sweeper = EscalationSweeper::new(
        store.clone(),
        calendar,
        clock.clone(),
        Arc::new(LogNotifier),
        config.sweep,
    );

    let urgent = tracker.open_ticket("acme", "production API down", Priority::Urgent)?;
    let normal = tracker.open_ticket("acme", "report export garbled", Priority::Normal)?;
    tracker.open_ticket("acme", "font nitpick on invoice PDF", Priority::Low)?;
    println!(
        "09:30  opened 3 tickets; urgent one is due {}",
        urgent.deadline.map(|d| d.to_string()).unwrap_or_default()
    );

    // 10:00 — urgent ticket enters its 2h warning window.
    clock.advance(ChronoDuration::minutes(30));
    let report = sweeper.run_once()?;
    println!("10:00  sweep: {} warning(s)", report.warnings_sent);

    // Waiting on the counterparty pauses accrual on the normal ticket.
    tracker.apply_transition(
        &normal.ticket_id,
        Some(TicketStatus::WaitingCounterparty),
        None,
    )?;

    // 12:00 — the urgent deadline (11:30) has passed.
    clock.advance(ChronoDuration::hours(2));
    let report = sweeper.run_once()?;
    println!("12:00  sweep: {} breach(es)", report.breaches_sent);

    // Same sweep again: idempotent, nothing new fires.
    let report = sweeper.run_once()?;
    println!(
        "12:00  sweep again: {} warnings, {} breaches (flags hold)",
        report.warnings_sent, report.breaches_sent
    );

    // Counterparty answered; resume and bump priority.
    tracker.apply_transition(&normal.ticket_id, Some(TicketStatus::InProgress), None)?;
    let bumped = tracker.apply_transition(&normal.ticket_id, None, Some(Priority::High))?;
    println!(
        "12:00  resumed + bumped {} to high, now due {}",
        bumped.ticket_id,
        bumped.deadline.map(|d| d.to_string()).unwrap_or_default()
    );

    tracker.apply_transition(&urgent.ticket_id, Some(TicketStatus::Resolved), None)?;
    println!("12:00  resolved the urgent ticket (SLA frozen)");
    println!();

    print_summary(&store)
}

fn print_summary(store: &SlaStore) -> Result<()> {
    println!("── summary ─────────────────────────────");
    println!("  tickets:          {}", store.ticket_count()?);
    println!(
        "  warnings issued:  {}",
        store.notified_count(BreachClass::Warning)?
    );
    println!(
        "  breaches issued:  {}",
        store.notified_count(BreachClass::Breach)?
    );
    println!("  sweeps completed: {}", store.event_count("sweep_completed")?);
    Ok(())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
