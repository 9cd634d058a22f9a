//! Balance ledger core: claim-based processing of signed monetary events
//! against a single non-negative balance, plus a periodic compensation cycle.
//!
//! Ingestion inserts New transactions. Balance workers claim and apply them.
//! Correction workers periodically reverse a fixed slice of recent entries and
//! enqueue one Internal compensating entry. All coordination between competing
//! workers happens through conditional updates in the store.

pub mod amount;
pub mod balance;
pub mod balance_worker;
pub mod clock;
pub mod config;
pub mod correction;
pub mod correction_processor;
pub mod correction_worker;
pub mod error;
pub mod ingest;
pub mod store;
pub mod transaction;
pub mod transaction_processor;
pub mod types;
pub mod worker;
