//! Integration tests for the actor pool lifecycle
//!
//! Covers the documented scenarios end to end:
//! - Scripted depositor/withdrawer interleaving
//! - Shutdown while every actor is mid-sleep
//! - Idempotent shutdown signal
//! - Startup failure cleans up already-spawned actors
//! - File-backed store created at start and removed at teardown

use family_ledger::{
    actor::{spawn_actor, Actor, ActorSpawner, StopFlag, ThreadSpawner},
    config::ActorCounts,
    metrics::Metrics,
    policy::ScriptedDraws,
    ActorId, ActorState, Config, Error, Ledger, Orchestrator, Outcome, Role,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// Test configuration
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn test_config(primary: i64, secondary: i64, withdrawers: i64, tick_ms: u64) -> Config {
    let mut config = Config::default();
    config.actors = ActorCounts::new(primary, secondary, withdrawers).unwrap();
    config.schedule.tick_ms = tick_ms;
    config.schedule.seed = Some(7);
    config
}

fn scripted_actor(role: Role, draws: Vec<i64>, ledger: &Arc<Ledger>) -> Actor<ScriptedDraws> {
    Actor::new(
        ActorId::new(role, 0),
        ledger.clone(),
        ScriptedDraws::new(draws),
        StopFlag::new(),
        Duration::from_millis(1),
        Metrics::new().unwrap(),
    )
}

/// Spawner that fails after a fixed number of successful spawns
struct FailingSpawner {
    allowed: usize,
    spawned: AtomicUsize,
}

impl FailingSpawner {
    fn new(allowed: usize) -> Self {
        Self {
            allowed,
            spawned: AtomicUsize::new(0),
        }
    }
}

impl ActorSpawner for FailingSpawner {
    fn spawn(
        &self,
        name: String,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> std::io::Result<JoinHandle<()>> {
        if self.spawned.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "thread limit reached",
            ));
        }
        ThreadSpawner.spawn(name, body)
    }
}

#[test]
fn test_scripted_deposit_withdraw_scenario() {
    let ledger = Arc::new(Ledger::in_memory());

    // even / even / 40, then even / even / 70
    let mut dad = scripted_actor(Role::PrimaryDepositor, vec![10, 20, 40, 30, 8, 70], &ledger);
    // even / need 50, then even / need 30
    let mut student = scripted_actor(Role::Withdrawer, vec![2, 50, 64, 30], &ledger);

    assert_eq!(dad.cycle(), Outcome::Deposited { amount: 40, balance: 40 });
    assert_eq!(student.cycle(), Outcome::InsufficientFunds { need: 50, balance: 40 });
    assert_eq!(ledger.balance(), 40);

    assert_eq!(dad.cycle(), Outcome::Deposited { amount: 70, balance: 110 });
    assert_eq!(student.cycle(), Outcome::Withdrew { need: 30, balance: 80 });
    assert_eq!(ledger.balance(), 80);
}

#[test]
fn test_secondary_depositor_leaves_high_balance_alone() {
    let ledger = Arc::new(Ledger::in_memory());
    ledger.lock().write(150);

    let mut mom = scripted_actor(Role::SecondaryDepositor, vec![100], &ledger);
    assert_eq!(mom.cycle(), Outcome::BalanceSufficient { balance: 150 });
    assert_eq!(ledger.balance(), 150);
}

#[test]
fn test_shutdown_while_actors_sleep() {
    // 50ms ticks: every actor spends most of its life asleep
    let mut orchestrator = Orchestrator::start(test_config(1, 1, 1, 50)).unwrap();
    let states = orchestrator.actor_states();
    assert_eq!(states.len(), 3);
    assert!(states.iter().all(|(_, state)| *state == ActorState::Running));
    let cells = orchestrator.state_cells();

    std::thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    let report = orchestrator.stop_all();
    assert_eq!(report.joined, 3);
    assert!(report.is_clean());
    // Longest possible remaining sleep is 10 ticks plus one critical section
    assert!(started.elapsed() < TEST_TIMEOUT);

    for (id, cell) in &cells {
        assert_eq!(cell.get(), ActorState::Stopped, "{} did not stop", id);
    }

    let summary = orchestrator.teardown().unwrap();
    assert!(summary.final_balance >= 0);
}

#[test]
fn test_all_actors_stopped_before_ledger_release() {
    let orchestrator = Orchestrator::start(test_config(2, 2, 3, 1)).unwrap();
    let ledger = Arc::downgrade(orchestrator.ledger());
    std::thread::sleep(Duration::from_millis(30));

    let summary = orchestrator.teardown().unwrap();
    assert_eq!(summary.report.joined, 7);

    // Every actor thread dropped its ledger handle before release
    assert!(ledger.upgrade().is_none());
}

#[tokio::test]
async fn test_shutdown_signal_twice_same_terminal_state() {
    let orchestrator = Orchestrator::start(test_config(1, 0, 2, 1)).unwrap();
    let signal = orchestrator.shutdown_signal();

    assert!(signal.trigger());
    assert!(!signal.trigger());

    tokio::time::timeout(TEST_TIMEOUT, orchestrator.await_shutdown())
        .await
        .unwrap();
    assert!(!signal.trigger());

    let summary = tokio::task::spawn_blocking(move || orchestrator.teardown())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.report.joined, 3);
}

#[test]
fn test_spawn_failure_stops_already_spawned_actors() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("bank_account.json");
    let mut config = test_config(2, 1, 2, 1);
    config.store.path = Some(path.clone());

    let spawner = FailingSpawner::new(3);
    let result = Orchestrator::start_with(config, &spawner);

    match result {
        Err(Error::Spawn { actor, .. }) => assert_eq!(actor, "withdrawer-0"),
        other => panic!("expected spawn failure, got {:?}", other),
    }
    assert_eq!(spawner.spawned.load(Ordering::SeqCst), 4);
    // Store released even though startup failed
    assert!(!path.exists());
}

#[test]
fn test_file_store_follows_run() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("bank_account.json");
    let mut config = test_config(0, 1, 0, 1);
    config.store.path = Some(path.clone());

    let orchestrator = Orchestrator::start(config).unwrap();
    assert!(path.exists());

    // A lone secondary depositor deposits at least 50 on its first cycle
    let deadline = Instant::now() + TEST_TIMEOUT;
    while orchestrator.ledger().balance() == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    let summary = orchestrator.teardown().unwrap();
    assert!(summary.final_balance >= 50);
    assert!(!path.exists());
}

#[test]
fn test_metrics_track_actor_activity() {
    let orchestrator = Orchestrator::start(test_config(1, 1, 1, 1)).unwrap();
    let metrics = orchestrator.metrics().clone();

    let deadline = Instant::now() + TEST_TIMEOUT;
    while Role::ALL.iter().any(|role| metrics.cycles(*role) == 0) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    for role in Role::ALL {
        assert!(metrics.cycles(role) > 0, "{} never cycled", role);
    }

    let summary = orchestrator.teardown().unwrap();
    assert_eq!(metrics.active_actors.get(), 0);
    assert_eq!(metrics.balance.get(), summary.final_balance);
}

#[test]
fn test_actor_exit_notice_after_stop() {
    let ledger = Arc::new(Ledger::in_memory());
    let stop = StopFlag::new();
    let (tx, rx) = mpsc::channel();

    let handles: Vec<_> = (0..3)
        .map(|ordinal| {
            let actor = Actor::new(
                ActorId::new(Role::PrimaryDepositor, ordinal),
                ledger.clone(),
                ScriptedDraws::default(),
                stop.clone(),
                Duration::from_millis(1),
                Metrics::new().unwrap(),
            );
            spawn_actor(&ThreadSpawner, actor, tx.clone()).unwrap()
        })
        .collect();
    drop(tx);

    stop.request();
    let exited: Vec<ActorId> = rx.iter().collect();
    assert_eq!(exited.len(), 3);

    for handle in handles {
        let cell = handle.state_cell();
        handle.join().unwrap();
        assert_eq!(cell.get(), ActorState::Stopped);
    }
}

#[test]
fn test_negative_counts_rejected_before_spawn() {
    assert!(matches!(
        ActorCounts::new(1, 0, -1),
        Err(Error::InvalidActorCount { role: "withdrawer", count: -1 })
    ));
}
