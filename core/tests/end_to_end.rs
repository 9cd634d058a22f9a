//! End-to-end tests.
//!
//! Tests verify the whole pipeline: ingestion → balance worker →
//! correction worker → balance worker, and concurrent balance workers
//! draining a shared file-backed store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ledger_core::{
    amount::Amount,
    balance,
    balance_worker::BalanceWorker,
    clock::{Clock, ManualClock, SystemClock},
    config::{BalanceWorkerConfig, CorrectionConfig, LedgerConfig},
    correction_worker::CorrectionWorker,
    ingest::{CreateTransaction, IngestOutcome},
    store::LedgerStore,
    transaction::TransactionStatus,
    types::BALANCE_ID,
    worker::{PassOutcome, Worker, WorkerSet},
};
use std::sync::Arc;
use std::time::Instant;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn ingest(store: &LedgerStore, id: &str, amount: &str, action: &str, now: DateTime<Utc>) {
    let outcome = CreateTransaction::parse(id, amount, action, "game")
        .unwrap()
        .execute(store, now)
        .unwrap();
    assert_eq!(outcome, IngestOutcome::Created);
}

fn balance_value(store: &LedgerStore) -> Amount {
    store.find_balance(BALANCE_ID).unwrap().expect("balance row").value
}

#[test]
fn win_then_overdraw_scenario() {
    init_logging();
    let store = LedgerStore::in_memory().unwrap();
    store.migrate().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    assert_eq!(balance::provide_balance(&store, t0()).unwrap().value, Amount::ZERO);

    ingest(&store, "win-1", "10.00", "win", t0());
    let mut worker = BalanceWorker::new(store, clock.clone(), &BalanceWorkerConfig::default());
    assert_eq!(worker.execute().unwrap(), PassOutcome::Worked(1));

    assert_eq!(balance_value(worker.store()), Amount::from_cents(1000));
    let win = worker.store().find_transaction("win-1").unwrap().unwrap();
    assert_eq!(win.status, TransactionStatus::Done);

    clock.advance(Duration::seconds(1));
    ingest(worker.store(), "lost-1", "-20.00", "lost", clock.now());
    assert_eq!(worker.execute().unwrap(), PassOutcome::Worked(1));

    let lost = worker.store().find_transaction("lost-1").unwrap().unwrap();
    assert_eq!(lost.status, TransactionStatus::Cancelled);
    assert_eq!(balance_value(worker.store()), Amount::from_cents(1000));
}

#[test]
fn compensation_feeds_back_into_the_balance() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let store = LedgerStore::open(path.to_str().unwrap()).unwrap();
    store.migrate().unwrap();

    for i in 1..=6 {
        ingest(&store, &format!("w{i}"), &format!("{i}.00"), "win", t0() + Duration::seconds(i));
    }

    let clock = Arc::new(ManualClock::new(t0() + Duration::seconds(10)));
    let mut balance_worker =
        BalanceWorker::new(store.reopen().unwrap(), clock.clone(), &BalanceWorkerConfig::default());
    let mut correction_worker =
        CorrectionWorker::new(store.reopen().unwrap(), clock.clone(), &CorrectionConfig::default());

    balance_worker.execute().unwrap();
    assert_eq!(balance_value(&store), Amount::from_cents(2100));

    // Fresh singleton: nothing happens until its lock goes stale.
    assert_eq!(correction_worker.execute().unwrap(), PassOutcome::Idle);
    clock.advance(Duration::minutes(11));
    assert_eq!(correction_worker.execute().unwrap(), PassOutcome::Worked(3));

    for id in ["w1", "w3", "w5"] {
        let tx = store.find_transaction(id).unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Cancelled);
    }
    // Compensation is queued, not yet applied.
    assert_eq!(balance_value(&store), Amount::from_cents(2100));
    assert_eq!(store.count_by_status(TransactionStatus::New).unwrap(), 1);

    assert_eq!(balance_worker.execute().unwrap(), PassOutcome::Worked(1));
    assert_eq!(store.count_by_status(TransactionStatus::New).unwrap(), 0);

    // What remains applied is exactly the surviving game transactions.
    let surviving: Amount = store
        .all_transactions()
        .unwrap()
        .into_iter()
        .filter(|tx| tx.status == TransactionStatus::Done && !tx.is_internal())
        .map(|tx| tx.amount)
        .sum();
    assert_eq!(surviving, Amount::from_cents(1200));
    assert_eq!(balance_value(&store), surviving);

    // Within the interval the cycle does not repeat.
    clock.advance(Duration::minutes(5));
    assert_eq!(correction_worker.execute().unwrap(), PassOutcome::Idle);
}

/// Deterministic amount in [-10.00, 10.00] for the i-th transaction.
fn spread_cents(i: i64) -> i64 {
    (i * 7919) % 2001 - 1000
}

#[test]
fn concurrent_balance_workers_drain_the_queue() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let ingest_store = LedgerStore::open(path.to_str().unwrap()).unwrap();
    ingest_store.migrate().unwrap();

    let config = LedgerConfig::default_test();
    let mut set = WorkerSet::new();
    for _ in 0..4 {
        let worker = BalanceWorker::new(
            ingest_store.reopen().unwrap(),
            Arc::new(SystemClock),
            &config.balance,
        );
        set.spawn(worker, config.balance.idle_backoff()).unwrap();
    }

    let mut created = 0;
    for i in 0..300 {
        let cents = spread_cents(i);
        let amount = Amount::from_cents(cents);
        let action = if cents < 0 { "lost" } else { "win" };
        let cmd = CreateTransaction::parse(&format!("spam-{i}"), &amount.to_string(), action, "payment")
            .unwrap();
        if cmd.execute(&ingest_store, Utc::now()).unwrap() == IngestOutcome::Created {
            created += 1;
        }
    }

    let deadline = Instant::now() + std::time::Duration::from_secs(30);
    loop {
        let open = ingest_store.count_by_status(TransactionStatus::New).unwrap()
            + ingest_store.count_by_status(TransactionStatus::Locked).unwrap();
        if open == 0 {
            break;
        }
        assert!(Instant::now() < deadline, "{open} transactions still open");
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    let results = set.shutdown();
    assert_eq!(results.len(), 4);

    let done = ingest_store.count_by_status(TransactionStatus::Done).unwrap();
    let cancelled = ingest_store.count_by_status(TransactionStatus::Cancelled).unwrap();
    assert_eq!(done + cancelled, created);
    assert!(cancelled > 0, "some losses should have been rejected");

    let balance = balance_value(&ingest_store);
    assert!(!balance.less_than_zero());
    assert_eq!(balance, ingest_store.done_total().unwrap());
}
