//! Worker trait and the polling runtime.
//!
//! RULE: Every background loop implements Worker.
//! One call to execute() is one pass, and a pass is one atomic store unit:
//! it commits completely or rolls back completely.
//!
//! The stop flag is read only between passes. A pass in flight always
//! finishes before the loop exits.

use crate::error::LedgerResult;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing was owned or due.
    Idle,
    /// This many rows were driven to a terminal state.
    Worked(usize),
}

/// The contract every worker must fulfill.
pub trait Worker: Send {
    /// Stable name, used for thread names and logs.
    fn name(&self) -> &'static str;

    /// Run one pass.
    fn execute(&mut self) -> LedgerResult<PassOutcome>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub passes:   u64,
    pub worked:   u64,
    pub failures: u64,
    pub panics:   u64,
}

/// Loop `worker` until `stop` is raised.
///
/// Idle and failed passes sleep `idle_backoff`. A failed pass has already
/// rolled back, so the next pass simply starts over. Panics are caught per
/// pass and the loop carries on.
pub fn run_worker<W: Worker + ?Sized>(
    worker: &mut W,
    stop: &AtomicBool,
    idle_backoff: Duration,
) -> RunStats {
    let name = worker.name();
    let mut stats = RunStats::default();
    log::info!("{name} worker started");

    while !stop.load(Ordering::Acquire) {
        stats.passes += 1;
        match panic::catch_unwind(AssertUnwindSafe(|| worker.execute())) {
            Ok(Ok(PassOutcome::Worked(n))) => {
                stats.worked += n as u64;
            }
            Ok(Ok(PassOutcome::Idle)) => thread::sleep(idle_backoff),
            Ok(Err(e)) => {
                stats.failures += 1;
                log::error!("{name} pass failed, rolled back: {e}");
                thread::sleep(idle_backoff);
            }
            Err(payload) => {
                stats.panics += 1;
                log::error!("{name} pass panicked: {}", panic_message(payload.as_ref()));
                thread::sleep(idle_backoff);
            }
        }
    }

    log::info!(
        "{name} worker stopped after {} passes ({} rows, {} failures, {} panics)",
        stats.passes,
        stats.worked,
        stats.failures,
        stats.panics
    );
    stats
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A group of worker threads sharing one stop flag.
pub struct WorkerSet {
    stop:    Arc<AtomicBool>,
    handles: Vec<(String, JoinHandle<RunStats>)>,
}

impl WorkerSet {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Move `worker` onto its own named thread.
    pub fn spawn<W>(&mut self, mut worker: W, idle_backoff: Duration) -> std::io::Result<()>
    where
        W: Worker + 'static,
    {
        let thread_name = format!("{}-{}", worker.name(), self.handles.len());
        let stop = Arc::clone(&self.stop);
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run_worker(&mut worker, &stop, idle_backoff))?;
        self.handles.push((thread_name, handle));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Raise the stop flag and wait for every thread.
    pub fn shutdown(self) -> Vec<(String, RunStats)> {
        self.stop.store(true, Ordering::Release);
        self.handles
            .into_iter()
            .map(|(name, handle)| {
                let stats = handle.join().unwrap_or_else(|_| {
                    log::error!("{name} thread died outside a pass");
                    RunStats::default()
                });
                (name, stats)
            })
            .collect()
    }
}

impl Default for WorkerSet {
    fn default() -> Self {
        Self::new()
    }
}
