//! Backing store the ledger mirrors its balance into
//!
//! - [`MemoryStore`] - keeps the last recorded balance in memory
//! - [`FileStore`] - writes a JSON snapshot to disk after every write and
//!   removes the file on release
//!
//! The ledger calls [`BalanceStore::record`] while holding its lock, so a
//! store sees balances in critical-section order and needs no locking of its
//! own beyond what `&self` methods require.

use crate::{
    config::StoreConfig,
    error::{Error, Result},
    types::Balance,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use uuid::Uuid;

/// Somewhere an external observer can see the balance
pub trait BalanceStore: Send + Sync {
    /// Record the current balance
    fn record(&self, balance: Balance) -> Result<()>;

    /// Release the backing resource. Calling it again is a no-op.
    fn release(&self) -> Result<()>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Snapshot persisted by [`FileStore`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Run that produced the snapshot
    pub run_id: Uuid,
    /// Balance at the time of the write
    pub balance: Balance,
    /// Write time
    pub updated_at: DateTime<Utc>,
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    last: AtomicI64,
    released: AtomicBool,
}

impl MemoryStore {
    /// Create new store holding balance 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Last recorded balance
    pub fn last(&self) -> Balance {
        self.last.load(Ordering::Acquire)
    }

    /// Has the store been released
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl BalanceStore for MemoryStore {
    fn record(&self, balance: Balance) -> Result<()> {
        self.last.store(balance, Ordering::Release);
        Ok(())
    }

    fn release(&self) -> Result<()> {
        self.released.store(true, Ordering::Release);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// File-backed store
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    run_id: Uuid,
    released: AtomicBool,
}

impl FileStore {
    /// Create or truncate the snapshot file and record balance 0
    pub fn create(path: impl AsRef<Path>, run_id: Uuid) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self {
            path,
            run_id,
            released: AtomicBool::new(false),
        };
        store.record(0)?;
        Ok(store)
    }

    /// Snapshot file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot currently on disk
    pub fn read_snapshot(path: impl AsRef<Path>) -> Result<Snapshot> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl BalanceStore for FileStore {
    fn record(&self, balance: Balance) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(Error::Store(format!(
                "write to released store {}",
                self.path.display()
            )));
        }

        let snapshot = Snapshot {
            run_id: self.run_id,
            balance,
            updated_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&snapshot)?;

        // Readers never see a half-written snapshot
        let staging = self.path.with_extension("tmp");
        std::fs::write(&staging, bytes)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Store(format!(
                "failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Open the store selected by configuration
pub fn open_store(config: &StoreConfig, run_id: Uuid) -> Result<Box<dyn BalanceStore>> {
    match &config.path {
        Some(path) => Ok(Box::new(FileStore::create(path, run_id)?)),
        None => Ok(Box::new(MemoryStore::new())),
    }
}
