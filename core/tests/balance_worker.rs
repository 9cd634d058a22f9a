//! Balance worker tests.
//!
//! Tests verify the claim/process loop:
//! 1. Owned rows are applied oldest first
//! 2. The worker backs off at the first row owned by someone else
//! 3. Stale locks are reclaimed, fresh foreign locks are not
//! 4. Terminal rows are never reclaimed
//! 5. A failing pass rolls back everything, including the claim
//! 6. A deposit that would overflow the balance cannot stall the queue

use chrono::{DateTime, Duration, TimeZone, Utc};
use ledger_core::{
    amount::Amount,
    balance_worker::BalanceWorker,
    clock::{Clock, ManualClock},
    config::BalanceWorkerConfig,
    error::{LedgerError, LedgerResult},
    store::LedgerStore,
    transaction::{Action, SourceType, Transaction, TransactionStatus},
    transaction_processor::{TransactionHandler, TransactionOutcome, TransactionProcessor},
    types::{ClaimToken, BALANCE_ID},
    worker::{PassOutcome, Worker},
};
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn store() -> LedgerStore {
    let store = LedgerStore::in_memory().expect("in-memory store");
    store.migrate().expect("migrate");
    store
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(t0()))
}

fn worker(store: LedgerStore, clock: Arc<ManualClock>) -> BalanceWorker {
    BalanceWorker::new(store, clock, &BalanceWorkerConfig::default())
}

/// Insert a New transaction created `offset_secs` after t0.
fn ingest(store: &LedgerStore, id: &str, cents: i64, offset_secs: i64) -> Transaction {
    let amount = Amount::from_cents(cents);
    let tx = Transaction::new(
        id,
        amount,
        Action::for_amount(amount),
        SourceType::Game,
        t0() + Duration::seconds(offset_secs),
    );
    store.insert_transaction(&tx).unwrap();
    tx
}

fn lock_as(store: &LedgerStore, id: &str, owner: ClaimToken, at: DateTime<Utc>) {
    let mut tx = store.find_transaction(id).unwrap().unwrap();
    tx.lock(owner, at);
    store.save_transaction(&tx).unwrap();
}

fn status(store: &LedgerStore, id: &str) -> TransactionStatus {
    store.find_transaction(id).unwrap().unwrap().status
}

fn balance(store: &LedgerStore) -> Amount {
    store.find_balance(BALANCE_ID).unwrap().map(|b| b.value).unwrap_or(Amount::ZERO)
}

/// Delegates to the real processor and records the order it was called in.
#[derive(Default)]
struct RecordingProcessor {
    seen: Vec<String>,
}

impl TransactionHandler for RecordingProcessor {
    fn execute(
        &mut self,
        store: &LedgerStore,
        tx: &mut Transaction,
        now: DateTime<Utc>,
    ) -> LedgerResult<TransactionOutcome> {
        self.seen.push(tx.id.clone());
        TransactionProcessor.execute(store, tx, now)
    }
}

/// Applies transactions normally until it meets `fail_on`.
struct FailingProcessor {
    fail_on: &'static str,
}

impl TransactionHandler for FailingProcessor {
    fn execute(
        &mut self,
        store: &LedgerStore,
        tx: &mut Transaction,
        now: DateTime<Utc>,
    ) -> LedgerResult<TransactionOutcome> {
        if tx.id == self.fail_on {
            return Err(LedgerError::Other(anyhow::anyhow!("disk full")));
        }
        TransactionProcessor.execute(store, tx, now)
    }
}

#[test]
fn empty_queue_is_idle() {
    let mut w = worker(store(), clock());
    assert_eq!(w.execute().unwrap(), PassOutcome::Idle);
}

#[test]
fn owned_batch_is_applied_oldest_first() {
    let store = store();
    // Inserted out of order; created_at decides.
    ingest(&store, "second", -1000, 2);
    ingest(&store, "first", 1000, 1);
    ingest(&store, "third", 250, 3);

    let mut w = BalanceWorker::with_processor(
        store,
        clock(),
        &BalanceWorkerConfig::default(),
        RecordingProcessor::default(),
    );
    assert_eq!(w.execute().unwrap(), PassOutcome::Worked(3));

    assert_eq!(w.processor().seen, vec!["first", "second", "third"]);
    // Had "second" gone first it would have been cancelled.
    assert_eq!(status(w.store(), "second"), TransactionStatus::Done);
    assert_eq!(balance(w.store()), Amount::from_cents(250));
}

#[test]
fn win_then_overdraw_in_one_pass() {
    let store = store();
    ingest(&store, "win", 1000, 1);
    ingest(&store, "loss", -2000, 2);

    let mut w = worker(store, clock());
    w.execute().unwrap();

    assert_eq!(status(w.store(), "win"), TransactionStatus::Done);
    assert_eq!(status(w.store(), "loss"), TransactionStatus::Cancelled);
    assert_eq!(balance(w.store()), Amount::from_cents(1000));
}

#[test]
fn backs_off_at_first_foreign_row() {
    let store = store();
    let me = ClaimToken::generate();
    let other = ClaimToken::generate();
    ingest(&store, "t1", 100, 1);
    ingest(&store, "t2", 100, 2);
    ingest(&store, "t3", 100, 3);
    lock_as(&store, "t1", me, t0());
    lock_as(&store, "t2", other, t0());
    lock_as(&store, "t3", me, t0());

    let mut w = worker(store, clock()).with_token(me);
    assert_eq!(w.execute().unwrap(), PassOutcome::Worked(1));

    let s = w.store();
    assert_eq!(status(s, "t1"), TransactionStatus::Done);
    let t2 = s.find_transaction("t2").unwrap().unwrap();
    assert_eq!(t2.status, TransactionStatus::Locked);
    assert_eq!(t2.lock_owner, Some(other));
    let t3 = s.find_transaction("t3").unwrap().unwrap();
    assert_eq!(t3.status, TransactionStatus::Locked);
    assert_eq!(t3.lock_owner, Some(me));
}

#[test]
fn foreign_head_of_queue_blocks_whole_pass() {
    let store = store();
    let other = ClaimToken::generate();
    ingest(&store, "held", 100, 1);
    ingest(&store, "fresh", 100, 2);
    lock_as(&store, "held", other, t0());

    let mut w = worker(store, clock());
    assert_eq!(w.execute().unwrap(), PassOutcome::Idle);

    // "fresh" was claimed but must wait behind "held".
    let fresh = w.store().find_transaction("fresh").unwrap().unwrap();
    assert_eq!(fresh.status, TransactionStatus::Locked);
    assert_eq!(fresh.lock_owner, Some(w.token()));
}

#[test]
fn own_leftover_rows_resume_on_next_pass() {
    let store = store();
    let other = ClaimToken::generate();
    ingest(&store, "held", 100, 1);
    ingest(&store, "mine", 100, 2);
    lock_as(&store, "held", other, t0());

    let mut w = worker(store, clock());
    w.execute().unwrap();

    // The other worker finishes its row.
    let mut held = w.store().find_transaction("held").unwrap().unwrap();
    held.mark_done();
    w.store().save_transaction(&held).unwrap();

    assert_eq!(w.execute().unwrap(), PassOutcome::Worked(1));
    assert_eq!(status(w.store(), "mine"), TransactionStatus::Done);
}

#[test]
fn stale_foreign_lock_is_reclaimed() {
    let store = store();
    let crashed = ClaimToken::generate();
    let clock = clock();
    ingest(&store, "orphan", 500, 0);
    lock_as(&store, "orphan", crashed, clock.now() - Duration::minutes(2));

    let mut w = worker(store, clock.clone());
    assert_eq!(w.execute().unwrap(), PassOutcome::Worked(1));
    assert_eq!(status(w.store(), "orphan"), TransactionStatus::Done);
    assert_eq!(balance(w.store()), Amount::from_cents(500));
}

#[test]
fn fresh_foreign_lock_becomes_reclaimable_after_staleness() {
    let store = store();
    let other = ClaimToken::generate();
    let clock = clock();
    ingest(&store, "held", 500, 0);
    lock_as(&store, "held", other, clock.now());

    let mut w = worker(store, clock.clone());
    assert_eq!(w.execute().unwrap(), PassOutcome::Idle);
    assert_eq!(status(w.store(), "held"), TransactionStatus::Locked);

    clock.advance(Duration::seconds(30));
    assert_eq!(w.execute().unwrap(), PassOutcome::Idle);

    clock.advance(Duration::seconds(31));
    assert_eq!(w.execute().unwrap(), PassOutcome::Worked(1));
    assert_eq!(status(w.store(), "held"), TransactionStatus::Done);
}

#[test]
fn terminal_rows_with_old_locks_are_not_reclaimed() {
    let store = store();
    let clock = clock();
    ingest(&store, "settled", 500, 0);
    let mut tx = store.find_transaction("settled").unwrap().unwrap();
    tx.lock(ClaimToken::generate(), clock.now() - Duration::hours(1));
    tx.mark_done();
    store.save_transaction(&tx).unwrap();

    let mut w = worker(store, clock);
    assert_eq!(w.execute().unwrap(), PassOutcome::Idle);
    assert_eq!(status(w.store(), "settled"), TransactionStatus::Done);
    assert!(w.store().find_balance(BALANCE_ID).unwrap().is_none());
}

#[test]
fn failing_pass_rolls_back_claim_and_effects() {
    let store = store();
    ingest(&store, "ok", 1000, 1);
    ingest(&store, "boom", 100, 2);

    let mut w = BalanceWorker::with_processor(
        store,
        clock(),
        &BalanceWorkerConfig::default(),
        FailingProcessor { fail_on: "boom" },
    );
    assert!(w.execute().is_err());

    let store = w.into_store();
    for id in ["ok", "boom"] {
        let tx = store.find_transaction(id).unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::New, "{id} should be New again");
        assert_eq!(tx.lock_owner, None);
    }
    assert!(store.find_balance(BALANCE_ID).unwrap().is_none());

    // A healthy worker retries from scratch.
    let mut retry = worker(store, clock());
    assert_eq!(retry.execute().unwrap(), PassOutcome::Worked(2));
    assert_eq!(balance(retry.store()), Amount::from_cents(1100));
}

#[test]
fn overflowing_deposit_does_not_stall_the_queue() {
    let store = store();
    let huge = 9_000_000_000_000_000_000;
    ingest(&store, "big-1", huge, 1);
    ingest(&store, "big-2", huge, 2);
    ingest(&store, "small", 100, 3);

    let mut w = worker(store, clock());
    assert_eq!(w.execute().unwrap(), PassOutcome::Worked(3));

    let s = w.store();
    assert_eq!(status(s, "big-1"), TransactionStatus::Done);
    assert_eq!(status(s, "big-2"), TransactionStatus::Cancelled);
    assert_eq!(status(s, "small"), TransactionStatus::Done);
    assert_eq!(balance(s), Amount::from_cents(huge + 100));
    assert_eq!(w.execute().unwrap(), PassOutcome::Idle);
}

#[test]
fn huge_staleness_setting_does_not_panic() {
    let config = BalanceWorkerConfig {
        lock_staleness_secs: u64::MAX,
        ..BalanceWorkerConfig::default()
    };
    let store = store();
    ingest(&store, "t1", 100, 0);

    let mut w = BalanceWorker::new(store, clock(), &config);
    assert_eq!(w.execute().unwrap(), PassOutcome::Worked(1));
}
