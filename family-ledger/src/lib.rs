//! Family Ledger
//!
//! A shared bank account hammered by concurrent actors: depositors who top it
//! up and withdrawers who drain it, each on its own thread and its own random
//! schedule, all serialized through one lock.
//!
//! # Architecture
//!
//! - **Ledger**: one `i64` balance behind one `parking_lot::Mutex`; reads and
//!   writes only through a lock guard
//! - **Policy**: pure functions from (balance, random draws) to an outcome
//! - **Actor**: one OS thread per actor running sleep → lock → decide → write
//! - **Orchestrator**: spawns the pool, waits for SIGINT/SIGTERM, joins every
//!   actor, then releases the ledger
//!
//! # Invariants
//!
//! - No lost updates: every write is based on a read from the same critical
//!   section
//! - The withdrawer never takes the balance below zero
//! - The ledger is released only after every actor thread has been joined

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod store;
pub mod ledger;
pub mod policy;
pub mod actor;
pub mod shutdown;
pub mod orchestrator;
pub mod error;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{ActorId, ActorState, Balance, Outcome, Role};
pub use ledger::{Ledger, LedgerGuard};
pub use config::{ActorCounts, Config};
pub use orchestrator::{Orchestrator, RunSummary, StopReport};
pub use shutdown::ShutdownSignal;
