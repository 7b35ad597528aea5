//! Configuration for the ledger simulation

use crate::{types::Role, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Simulation configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many actors of each role to spawn
    pub actors: ActorCounts,

    /// Sleep scheduling
    pub schedule: ScheduleConfig,

    /// Balance backing store
    pub store: StoreConfig,

    /// Shutdown behaviour
    pub shutdown: ShutdownConfig,
}

/// Actor counts per role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorCounts {
    /// Primary depositors
    pub primary_depositors: usize,

    /// Secondary depositors
    pub secondary_depositors: usize,

    /// Withdrawers
    pub withdrawers: usize,
}

impl Default for ActorCounts {
    fn default() -> Self {
        Self {
            primary_depositors: 1,
            secondary_depositors: 0,
            withdrawers: 1,
        }
    }
}

impl ActorCounts {
    /// Validate signed counts coming from an outer surface
    pub fn new(primary: i64, secondary: i64, withdrawers: i64) -> Result<Self> {
        Ok(Self {
            primary_depositors: checked_count(Role::PrimaryDepositor, primary)?,
            secondary_depositors: checked_count(Role::SecondaryDepositor, secondary)?,
            withdrawers: checked_count(Role::Withdrawer, withdrawers)?,
        })
    }

    /// Legacy two-number form: the first parent is a primary depositor and
    /// every further parent is a secondary depositor
    pub fn from_parents(parents: i64, withdrawers: i64) -> Result<Self> {
        if parents < 0 {
            return Err(Error::InvalidActorCount {
                role: "parents",
                count: parents,
            });
        }
        let primary = parents.min(1);
        Self::new(primary, parents - primary, withdrawers)
    }

    /// Count for a single role
    pub fn count(&self, role: Role) -> usize {
        match role {
            Role::PrimaryDepositor => self.primary_depositors,
            Role::SecondaryDepositor => self.secondary_depositors,
            Role::Withdrawer => self.withdrawers,
        }
    }

    /// Total number of actors
    pub fn total(&self) -> usize {
        self.primary_depositors + self.secondary_depositors + self.withdrawers
    }
}

fn checked_count(role: Role, count: i64) -> Result<usize> {
    usize::try_from(count).map_err(|_| Error::InvalidActorCount {
        role: role.as_str(),
        count,
    })
}

/// Sleep scheduling configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Length of one sleep time unit (milliseconds)
    pub tick_ms: u64,

    /// Base seed; actor `i` (in spawn order) uses `seed + i`. Entropy if unset.
    pub seed: Option<u64>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000, // one second, like the classic demo
            seed: None,
        }
    }
}

impl ScheduleConfig {
    /// Tick as a duration
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Backing store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Snapshot file; in-memory store when unset
    pub path: Option<PathBuf>,
}

/// Shutdown configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Warn about an actor still running after this long in join (milliseconds)
    pub join_warn_after_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            join_warn_after_ms: 15_000,
        }
    }
}

impl ShutdownConfig {
    /// Join warning threshold as a duration
    pub fn join_warn_after(&self) -> Duration {
        Duration::from_millis(self.join_warn_after_ms)
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Override fields from environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(count) = env_i64("LEDGER_PRIMARY_DEPOSITORS")? {
            self.actors.primary_depositors = checked_count(Role::PrimaryDepositor, count)?;
        }

        if let Some(count) = env_i64("LEDGER_SECONDARY_DEPOSITORS")? {
            self.actors.secondary_depositors = checked_count(Role::SecondaryDepositor, count)?;
        }

        if let Some(count) = env_i64("LEDGER_WITHDRAWERS")? {
            self.actors.withdrawers = checked_count(Role::Withdrawer, count)?;
        }

        if let Ok(tick) = std::env::var("LEDGER_TICK_MS") {
            self.schedule.tick_ms = tick
                .parse()
                .map_err(|e| Error::Config(format!("Invalid LEDGER_TICK_MS '{}': {}", tick, e)))?;
        }

        if let Ok(seed) = std::env::var("LEDGER_SEED") {
            self.schedule.seed = Some(
                seed.parse()
                    .map_err(|e| Error::Config(format!("Invalid LEDGER_SEED '{}': {}", seed, e)))?,
            );
        }

        if let Ok(path) = std::env::var("LEDGER_STORE_PATH") {
            self.store.path = Some(PathBuf::from(path));
        }

        Ok(())
    }
}

fn env_i64(name: &str) -> Result<Option<i64>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", name, value, e))),
        Err(_) => Ok(None),
    }
}
