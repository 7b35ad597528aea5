//! The shared ledger: one balance behind one lock
//!
//! The balance is only reachable through a [`LedgerGuard`], so reading it and
//! writing the value derived from that read always happen inside the same
//! critical section. There is no compare-and-swap and no way to read the
//! balance, drop the lock and write later.
//!
//! # Example
//!
//! ```
//! use family_ledger::Ledger;
//!
//! let ledger = Ledger::in_memory();
//! {
//!     let mut guard = ledger.lock();
//!     let balance = guard.read();
//!     guard.write(balance + 40);
//! }
//! assert_eq!(ledger.balance(), 40);
//! assert_eq!(ledger.release().unwrap(), 40);
//! ```

use crate::{
    config::StoreConfig,
    store::{open_store, BalanceStore, MemoryStore},
    types::Balance,
    Error, Result,
};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Shared ledger
pub struct Ledger {
    /// Run identifier, also written into file snapshots
    run_id: Uuid,

    /// The balance and its lock
    balance: Mutex<Balance>,

    /// Where writes are mirrored for external observers
    store: Box<dyn BalanceStore>,

    /// Set once by `release`
    released: AtomicBool,
}

impl Ledger {
    /// Open a ledger at balance 0 backed by the configured store
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let run_id = Uuid::new_v4();
        let store = open_store(config, run_id)?;
        Ok(Self::from_parts(run_id, store))
    }

    /// Ledger backed by an in-memory store
    pub fn in_memory() -> Self {
        Self::from_parts(Uuid::new_v4(), Box::new(MemoryStore::new()))
    }

    /// Ledger backed by a caller-provided store
    pub fn with_store(store: Box<dyn BalanceStore>) -> Self {
        Self::from_parts(Uuid::new_v4(), store)
    }

    fn from_parts(run_id: Uuid, store: Box<dyn BalanceStore>) -> Self {
        tracing::debug!(%run_id, store = %store.describe(), "Ledger opened");
        Self {
            run_id,
            balance: Mutex::new(0),
            store,
            released: AtomicBool::new(false),
        }
    }

    /// Enter the critical section. Blocks until the lock is free.
    pub fn lock(&self) -> LedgerGuard<'_> {
        LedgerGuard {
            balance: self.balance.lock(),
            store: self.store.as_ref(),
        }
    }

    /// Current balance, read under the lock
    pub fn balance(&self) -> Balance {
        *self.balance.lock()
    }

    /// Run identifier
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Has the ledger been released
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Release the backing store and return the final balance
    ///
    /// Only the first call touches the store; later calls return the balance
    /// again without error.
    pub fn release(&self) -> Result<Balance> {
        // Wait out any critical section still in flight
        let balance = *self.balance.lock();

        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(balance);
        }

        self.store.release().map_err(|e| {
            Error::Store(format!("failed to release {}: {}", self.store.describe(), e))
        })?;

        tracing::debug!(run_id = %self.run_id, balance, "Ledger released");
        Ok(balance)
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("run_id", &self.run_id)
            .field("store", &self.store.describe())
            .field("released", &self.is_released())
            .finish()
    }
}

/// Lock guard over the balance
///
/// Dropping the guard ends the critical section.
pub struct LedgerGuard<'a> {
    balance: MutexGuard<'a, Balance>,
    store: &'a dyn BalanceStore,
}

impl LedgerGuard<'_> {
    /// Read the balance
    pub fn read(&self) -> Balance {
        *self.balance
    }

    /// Write a new balance and mirror it into the store
    ///
    /// A store failure is logged; the in-memory balance stays authoritative.
    pub fn write(&mut self, balance: Balance) {
        *self.balance = balance;
        if let Err(e) = self.store.record(balance) {
            tracing::warn!(balance, "Failed to mirror balance to {}: {}", self.store.describe(), e);
        }
    }
}

impl fmt::Debug for LedgerGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerGuard")
            .field("balance", &*self.balance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;
    use std::sync::Arc;

    #[test]
    fn test_ledger_starts_at_zero() {
        let ledger = Ledger::in_memory();
        assert_eq!(ledger.balance(), 0);
        assert!(!ledger.is_released());
    }

    #[test]
    fn test_read_write_in_one_critical_section() {
        let ledger = Ledger::in_memory();
        {
            let mut guard = ledger.lock();
            let balance = guard.read();
            guard.write(balance + 40);
            assert_eq!(guard.read(), 40);
        }
        assert_eq!(ledger.balance(), 40);
    }

    #[test]
    fn test_no_lost_updates_under_contention() {
        let ledger = Arc::new(Ledger::in_memory());
        let threads = 8;
        let iterations = 1_000;

        std::thread::scope(|s| {
            for t in 0..threads {
                let ledger = &ledger;
                s.spawn(move || {
                    let delta = if t % 2 == 0 { 3 } else { -1 };
                    for _ in 0..iterations {
                        let mut guard = ledger.lock();
                        let balance = guard.read();
                        std::thread::yield_now();
                        guard.write(balance + delta);
                    }
                });
            }
        });

        // 4 threads add 3, 4 threads subtract 1, 1000 times each
        assert_eq!(ledger.balance(), 4 * 3 * 1_000 - 4 * 1_000);
    }

    #[test]
    fn test_release_is_idempotent() {
        let ledger = Ledger::in_memory();
        ledger.lock().write(25);

        assert_eq!(ledger.release().unwrap(), 25);
        assert!(ledger.is_released());
        assert_eq!(ledger.release().unwrap(), 25);
    }

    #[test]
    fn test_file_backed_ledger_mirrors_writes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("bank_account.json");
        let config = StoreConfig {
            path: Some(path.clone()),
        };

        let ledger = Ledger::open(&config).unwrap();
        assert_eq!(FileStore::read_snapshot(&path).unwrap().balance, 0);

        ledger.lock().write(70);
        let snapshot = FileStore::read_snapshot(&path).unwrap();
        assert_eq!(snapshot.balance, 70);
        assert_eq!(snapshot.run_id, ledger.run_id());

        ledger.release().unwrap();
        assert!(!path.exists());
    }
}
