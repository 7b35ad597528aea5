//! Error types for the ledger simulation

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Only resource and configuration failures live here. Declined deposits and
/// insufficient funds are policy outcomes, see [`crate::types::Outcome`].
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Negative or otherwise unusable actor count
    #[error("Invalid actor count for {role}: {count}")]
    InvalidActorCount {
        /// Role the count was given for
        role: &'static str,
        /// Rejected value
        count: i64,
    },

    /// Actor thread could not be created
    #[error("Failed to spawn actor {actor}: {source}")]
    Spawn {
        /// Actor that failed to start
        actor: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Backing store error
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown path error (signal listener, join)
    #[error("Shutdown error: {0}")]
    Shutdown(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
