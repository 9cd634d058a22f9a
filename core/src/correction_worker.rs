//! Correction worker: runs the compensation cycle on a fixed cadence.
//!
//! One pass, inside one atomic unit:
//!   1. Make sure the singleton exists (a fresh one starts pre-locked).
//!   2. Claim it if due: Ready and last done before the interval, or Locked
//!      with a stale lock (a crashed cycle).
//!   3. Re-read; if the token on the row is not ours, do nothing.
//!   4. Run the processor, then unlock with done_at = now.

use crate::{
    clock::Clock,
    config::CorrectionConfig,
    correction::provide_correction,
    correction_processor::{CorrectionHandler, CorrectionProcessor},
    error::{LedgerError, LedgerResult},
    store::LedgerStore,
    types::{ClaimToken, CORRECTION_ID},
    worker::{PassOutcome, Worker},
};
use chrono::Duration;
use std::sync::Arc;

pub struct CorrectionWorker<P = CorrectionProcessor> {
    store:          LedgerStore,
    clock:          Arc<dyn Clock>,
    token:          ClaimToken,
    interval:       Duration,
    lock_staleness: Duration,
    processor:      P,
}

impl CorrectionWorker<CorrectionProcessor> {
    pub fn new(store: LedgerStore, clock: Arc<dyn Clock>, config: &CorrectionConfig) -> Self {
        let processor = CorrectionProcessor::new(config.batch_size);
        Self::with_processor(store, clock, config, processor)
    }
}

impl<P: CorrectionHandler> CorrectionWorker<P> {
    pub fn with_processor(
        store: LedgerStore,
        clock: Arc<dyn Clock>,
        config: &CorrectionConfig,
        processor: P,
    ) -> Self {
        Self {
            store,
            clock,
            token: ClaimToken::generate(),
            interval: config.interval(),
            lock_staleness: config.lock_staleness(),
            processor,
        }
    }

    pub fn with_token(mut self, token: ClaimToken) -> Self {
        self.token = token;
        self
    }

    pub fn token(&self) -> ClaimToken {
        self.token
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn into_store(self) -> LedgerStore {
        self.store
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }
}

impl<P: CorrectionHandler> Worker for CorrectionWorker<P> {
    fn name(&self) -> &'static str {
        "correction"
    }

    fn execute(&mut self) -> LedgerResult<PassOutcome> {
        let now = self.clock.now();
        let done_before = now - self.interval;
        let stale_before = now - self.lock_staleness;
        let token = self.token;
        let processor = &mut self.processor;

        self.store.atomic(|store| {
            provide_correction(store, now)?;
            store.lock_correction(CORRECTION_ID, token, now, done_before, stale_before)?;

            let mut correction = store.find_correction(CORRECTION_ID)?.ok_or_else(|| {
                LedgerError::MissingRow {
                    table: "corrections",
                    id:    CORRECTION_ID.to_string(),
                }
            })?;
            if !correction.is_owned_by(token) {
                return Ok(PassOutcome::Idle);
            }

            log::info!("correction {token} starting cycle");
            let report = processor.execute(store, now)?;

            correction.unlock(now);
            correction.updated_at = now;
            store.save_correction(&correction)?;
            Ok(PassOutcome::Worked(report.cancelled.len()))
        })
    }
}
