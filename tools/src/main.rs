//! ledger-runner: runs balance and correction workers against a ledger database.
//!
//! Usage:
//!   ledger-runner --db ledger.db --balance-workers 4 --run-secs 60
//!   ledger-runner --db load.db --spam 1000 --seed 7 --initial-balance 100.00
//!   ledger-runner --config ledger.json --json

use anyhow::{Context, Result};
use chrono::Utc;
use ledger_core::{
    amount::Amount,
    balance_worker::BalanceWorker,
    clock::{Clock, SystemClock},
    config::LedgerConfig,
    correction_worker::CorrectionWorker,
    ingest::{CreateTransaction, IngestOutcome},
    store::LedgerStore,
    transaction::TransactionStatus,
    types::BALANCE_ID,
    worker::{RunStats, WorkerSet},
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(serde::Serialize)]
struct RunSummary {
    db:               String,
    submitted:        u64,
    created:          u64,
    new:              i64,
    locked:           i64,
    done:             i64,
    cancelled:        i64,
    expected_balance: Option<Amount>,
    final_balance:    Amount,
    done_total:       Amount,
    drained:          bool,
    workers:          Vec<WorkerSummary>,
}

#[derive(serde::Serialize)]
struct WorkerSummary {
    thread:   String,
    passes:   u64,
    worked:   u64,
    failures: u64,
    panics:   u64,
}

impl WorkerSummary {
    fn new(thread: String, stats: RunStats) -> Self {
        Self {
            thread,
            passes: stats.passes,
            worked: stats.worked,
            failures: stats.failures,
            panics: stats.panics,
        }
    }
}

/// Result of feeding generated load through ingestion.
struct Load {
    submitted: u64,
    created:   u64,
    /// Balance a single FIFO worker would reach, guard included.
    expected:  Amount,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut config = match string_arg(&args, "--config") {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(db) = string_arg(&args, "--db") {
        config.db_path = db.to_string();
    }
    let balance_workers = parse_arg(&args, "--balance-workers", 2usize);
    let correction_workers = parse_arg(&args, "--correction-workers", 1usize);
    let spam = parse_arg(&args, "--spam", 0u64);
    let seed = parse_arg(&args, "--seed", 42u64);
    let run_secs = parse_arg(&args, "--run-secs", 10u64);
    let initial_balance = match string_arg(&args, "--initial-balance") {
        Some(raw) => raw
            .parse::<Amount>()
            .with_context(|| format!("--initial-balance {raw}"))?,
        None => Amount::ZERO,
    };
    let json = args.iter().any(|a| a == "--json");

    if !json {
        println!("ledger-runner");
        println!("  db:                 {}", config.db_path);
        println!("  balance workers:    {balance_workers}");
        println!("  correction workers: {correction_workers}");
        println!("  spam:               {spam} (seed {seed})");
        println!("  run secs:           {run_secs}");
        println!();
    }

    let (db_effective, _scratch) = resolve_db(&config.db_path)?;
    let store = LedgerStore::open_with_timeout(&db_effective, config.busy_timeout())?;
    store.migrate()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut workers = WorkerSet::new();
    for _ in 0..balance_workers {
        let worker = BalanceWorker::new(store.reopen()?, Arc::clone(&clock), &config.balance);
        workers.spawn(worker, config.balance.idle_backoff())?;
    }
    for _ in 0..correction_workers {
        let worker = CorrectionWorker::new(store.reopen()?, Arc::clone(&clock), &config.correction);
        workers.spawn(worker, config.correction.poll_interval())?;
    }
    log::info!("Started {} workers on {}", workers.len(), config.db_path);

    let load = if spam > 0 || !initial_balance.is_zero() {
        Some(submit_load(&store, spam, seed, initial_balance)?)
    } else {
        None
    };

    let deadline = Instant::now() + Duration::from_secs(run_secs);
    let drained = if load.is_some() {
        wait_for_drain(&store, deadline)?
    } else {
        thread::sleep(Duration::from_secs(run_secs));
        open_count(&store)? == 0
    };

    let stats = workers.shutdown();
    let summary = RunSummary {
        db: config.db_path.clone(),
        submitted: load.as_ref().map_or(0, |l| l.submitted),
        created: load.as_ref().map_or(0, |l| l.created),
        new: store.count_by_status(TransactionStatus::New)?,
        locked: store.count_by_status(TransactionStatus::Locked)?,
        done: store.count_by_status(TransactionStatus::Done)?,
        cancelled: store.count_by_status(TransactionStatus::Cancelled)?,
        expected_balance: load.as_ref().map(|l| l.expected),
        final_balance: store
            .find_balance(BALANCE_ID)?
            .map(|b| b.value)
            .unwrap_or(Amount::ZERO),
        done_total: store.done_total()?,
        drained,
        workers: stats
            .into_iter()
            .map(|(thread, stats)| WorkerSummary::new(thread, stats))
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

/// Every worker holds its own connection, so `:memory:` is backed by a file
/// in a scratch directory that lives as long as the returned guard.
fn resolve_db(db_path: &str) -> Result<(String, Option<TempDir>)> {
    if db_path != ":memory:" {
        return Ok((db_path.to_string(), None));
    }
    let dir = tempfile::tempdir().context("creating scratch directory for :memory:")?;
    let path = dir.path().join("ledger.db");
    let path = path
        .to_str()
        .context("scratch database path is not valid UTF-8")?
        .to_string();
    log::info!("Backing :memory: with {path}");
    Ok((path, Some(dir)))
}

/// Ingest the optional opening deposit, then `count` random transactions
/// in [-10.00, 10.00], deterministic per `seed`.
fn submit_load(store: &LedgerStore, count: u64, seed: u64, initial: Amount) -> Result<Load> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let mut load = Load {
        submitted: 0,
        created:   0,
        expected:  Amount::ZERO,
    };

    if !initial.is_zero() {
        submit(store, &mut load, "initial-balance".to_string(), initial, "payment")?;
    }
    for i in 0..count {
        let amount = Amount::from_cents(rng.gen_range(-1000..=1000));
        submit(store, &mut load, format!("spam-{seed}-{i}"), amount, "game")?;
    }
    log::info!("Submitted {} transactions ({} created)", load.submitted, load.created);
    Ok(load)
}

fn submit(
    store: &LedgerStore,
    load: &mut Load,
    id: String,
    amount: Amount,
    source_type: &str,
) -> Result<()> {
    let action = if amount.less_than_zero() { "lost" } else { "win" };
    let cmd = CreateTransaction::parse(&id, &amount.to_string(), action, source_type)?;
    load.submitted += 1;
    if cmd.execute(store, Utc::now())? == IngestOutcome::Created {
        load.created += 1;
        match load.expected.checked_add(amount) {
            Some(next) if !next.less_than_zero() => load.expected = next,
            _ => {}
        }
    }
    Ok(())
}

fn open_count(store: &LedgerStore) -> Result<i64> {
    Ok(store.count_by_status(TransactionStatus::New)?
        + store.count_by_status(TransactionStatus::Locked)?)
}

fn wait_for_drain(store: &LedgerStore, deadline: Instant) -> Result<bool> {
    loop {
        let open = open_count(store)?;
        if open == 0 {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            log::warn!("{open} transactions still open at deadline");
            return Ok(false);
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn print_summary(s: &RunSummary) {
    println!("=== RUN SUMMARY ===");
    println!("  submitted:      {}", s.submitted);
    println!("  created:        {}", s.created);
    println!("  new:            {}", s.new);
    println!("  locked:         {}", s.locked);
    println!("  done:           {}", s.done);
    println!("  cancelled:      {}", s.cancelled);
    println!("  drained:        {}", s.drained);
    println!("  final balance:  {}", s.final_balance);
    println!("  done total:     {}", s.done_total);
    if let Some(expected) = s.expected_balance {
        let verdict = if expected == s.final_balance { "OK" } else { "MISMATCH" };
        println!("  expected:       {expected} ({verdict})");
    }

    println!();
    println!("=== WORKERS ===");
    for w in &s.workers {
        println!(
            "  {:<14} passes {:>6}  rows {:>6}  failures {:>3}  panics {:>3}",
            w.thread, w.passes, w.worked, w.failures, w.panics
        );
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
