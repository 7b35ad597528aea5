//! Metrics collection for observability
//!
//! Every orchestrator owns its own [`Registry`], so several runs can live in
//! one process (tests do this) without duplicate-registration errors.
//!
//! # Metrics
//!
//! - `ledger_actor_outcomes_total{role,outcome}` - Policy outcomes per role
//! - `ledger_balance` - Balance after the latest critical section
//! - `ledger_active_actors` - Actors not yet stopped
//! - `ledger_lock_wait_seconds` - Time spent waiting for the ledger lock

use crate::types::{Outcome, Role};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Policy outcomes by role and outcome label
    pub outcomes: IntCounterVec,

    /// Latest balance
    pub balance: IntGauge,

    /// Actors not yet stopped
    pub active_actors: IntGauge,

    /// Lock wait histogram
    pub lock_wait: Histogram,

    registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let outcomes = IntCounterVec::new(
            Opts::new("ledger_actor_outcomes_total", "Policy outcomes per actor role"),
            &["role", "outcome"],
        )?;
        registry.register(Box::new(outcomes.clone()))?;

        let balance = IntGauge::new("ledger_balance", "Balance after the latest critical section")?;
        registry.register(Box::new(balance.clone()))?;

        let active_actors = IntGauge::new("ledger_active_actors", "Actors not yet stopped")?;
        registry.register(Box::new(active_actors.clone()))?;

        let lock_wait = Histogram::with_opts(
            HistogramOpts::new("ledger_lock_wait_seconds", "Time spent waiting for the ledger lock")
                .buckets(vec![0.000_01, 0.000_1, 0.001, 0.010, 0.100, 1.0]),
        )?;
        registry.register(Box::new(lock_wait.clone()))?;

        Ok(Self {
            outcomes,
            balance,
            active_actors,
            lock_wait,
            registry,
        })
    }

    /// Record one policy outcome
    pub fn record_outcome(&self, role: Role, outcome: &Outcome) {
        self.outcomes
            .with_label_values(&[role.as_str(), outcome.label()])
            .inc();
        self.balance.set(outcome.balance());
    }

    /// Record lock acquisition latency
    pub fn record_lock_wait(&self, seconds: f64) {
        self.lock_wait.observe(seconds);
    }

    /// Actor started
    pub fn actor_started(&self) {
        self.active_actors.inc();
    }

    /// Actor reached `Stopped`
    pub fn actor_stopped(&self) {
        self.active_actors.dec();
    }

    /// Outcome count for one role/outcome pair
    pub fn outcome_count(&self, role: Role, outcome_label: &str) -> u64 {
        self.outcomes
            .with_label_values(&[role.as_str(), outcome_label])
            .get()
    }

    /// Total outcomes recorded for a role
    pub fn cycles(&self, role: Role) -> u64 {
        [
            "deposited",
            "no_money_to_give",
            "balance_sufficient",
            "checked_balance",
            "withdrew",
            "insufficient_funds",
        ]
        .iter()
        .map(|label| self.outcome_count(role, label))
        .sum()
    }

    /// Render in the Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("balance", &self.balance.get())
            .field("active_actors", &self.active_actors.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.balance.get(), 0);
        assert_eq!(metrics.active_actors.get(), 0);

        // Independent registries, no global collision
        let _second = Metrics::new().unwrap();
    }

    #[test]
    fn test_record_outcome() {
        let metrics = Metrics::new().unwrap();
        metrics.record_outcome(
            Role::PrimaryDepositor,
            &Outcome::Deposited { amount: 40, balance: 40 },
        );
        metrics.record_outcome(
            Role::Withdrawer,
            &Outcome::InsufficientFunds { need: 50, balance: 40 },
        );

        assert_eq!(metrics.outcome_count(Role::PrimaryDepositor, "deposited"), 1);
        assert_eq!(metrics.outcome_count(Role::Withdrawer, "insufficient_funds"), 1);
        assert_eq!(metrics.cycles(Role::Withdrawer), 1);
        assert_eq!(metrics.balance.get(), 40);
    }

    #[test]
    fn test_active_actor_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.actor_started();
        metrics.actor_started();
        metrics.actor_stopped();
        assert_eq!(metrics.active_actors.get(), 1);
    }

    #[test]
    fn test_encode_contains_metric_names() {
        let metrics = Metrics::new().unwrap();
        metrics.record_outcome(Role::SecondaryDepositor, &Outcome::BalanceSufficient { balance: 150 });
        metrics.record_lock_wait(0.0001);

        let text = metrics.encode();
        assert!(text.contains("ledger_actor_outcomes_total"));
        assert!(text.contains("ledger_balance 150"));
        assert!(text.contains("ledger_lock_wait_seconds"));
    }
}
