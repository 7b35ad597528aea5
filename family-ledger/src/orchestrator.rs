//! Startup and shutdown of the actor pool
//!
//! Lifecycle:
//!
//! 1. [`Orchestrator::start`] opens the ledger at balance 0 and spawns every
//!    actor. If any spawn fails, the actors already running are stopped and
//!    joined and the ledger is released before the error is returned.
//! 2. [`Orchestrator::await_shutdown`] blocks on SIGINT/SIGTERM (or a
//!    programmatic [`ShutdownSignal::trigger`]). When `start` runs inside a
//!    Tokio runtime the signal handlers are installed before the first actor
//!    is spawned, so a signal arriving at any point after `start` begins is
//!    turned into a graceful shutdown.
//! 3. [`Orchestrator::stop_all`] raises the stop flag and joins every actor,
//!    with no timeout.
//! 4. [`Orchestrator::teardown`] releases the ledger. It runs `stop_all`
//!    first if the caller has not, so the ledger is never released while an
//!    actor thread is alive.

use crate::{
    actor::{spawn_actor, Actor, ActorHandle, ActorSpawner, StateCell, StopFlag, ThreadSpawner},
    config::Config,
    ledger::Ledger,
    metrics::Metrics,
    shutdown::{listen_for_termination, ShutdownSignal},
    types::{ActorId, ActorState, Balance, Role},
    Error, Result,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::future::Future;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Outcome of joining the actor pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Actors joined cleanly
    pub joined: usize,

    /// Actors whose thread panicked
    pub panicked: Vec<ActorId>,
}

impl StopReport {
    /// Every actor exited normally
    pub fn is_clean(&self) -> bool {
        self.panicked.is_empty()
    }
}

/// Summary of a complete run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Balance when the ledger was released
    pub final_balance: Balance,

    /// Join results
    pub report: StopReport,
}

/// Owns the ledger, the actor threads and the shutdown signal
pub struct Orchestrator {
    /// Configuration the run was started with
    config: Config,

    /// Shared ledger
    ledger: Arc<Ledger>,

    /// Actors not yet joined
    actors: Vec<ActorHandle>,

    /// Exit notices from actor threads
    exits: mpsc::Receiver<ActorId>,

    /// Stop condition seen by every actor
    stop: StopFlag,

    /// External termination request
    shutdown: ShutdownSignal,

    /// SIGINT/SIGTERM listener task, when started inside a runtime
    listener: Option<JoinHandle<()>>,

    /// Metrics for this run
    metrics: Metrics,
}

impl Orchestrator {
    /// Open the ledger and spawn every actor on its own OS thread
    pub fn start(config: Config) -> Result<Self> {
        Self::start_with(config, &ThreadSpawner)
    }

    /// Like [`Orchestrator::start`], with a caller-provided thread spawner
    pub fn start_with<S: ActorSpawner + ?Sized>(config: Config, spawner: &S) -> Result<Self> {
        let metrics = Metrics::new()?;
        let shutdown = ShutdownSignal::new();
        let listener = match tokio::runtime::Handle::try_current() {
            Ok(_) => Some(listen_for_termination(shutdown.clone())?),
            Err(_) => {
                tracing::debug!("No Tokio runtime, signal handlers not installed");
                None
            }
        };

        let ledger = match Ledger::open(&config.store) {
            Ok(ledger) => Arc::new(ledger),
            Err(e) => {
                if let Some(listener) = listener {
                    listener.abort();
                }
                return Err(e);
            }
        };
        let stop = StopFlag::new();
        let (exit_tx, exits) = mpsc::channel();
        let mut actors = Vec::with_capacity(config.actors.total());

        tracing::info!(
            run_id = %ledger.run_id(),
            primary_depositors = config.actors.primary_depositors,
            secondary_depositors = config.actors.secondary_depositors,
            withdrawers = config.actors.withdrawers,
            "Starting {} actor(s)",
            config.actors.total()
        );

        let mut spawn_index: u64 = 0;
        for role in Role::ALL {
            for ordinal in 0..config.actors.count(role) {
                let draws = match config.schedule.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(spawn_index)),
                    None => StdRng::from_entropy(),
                };
                spawn_index += 1;

                let actor = Actor::new(
                    ActorId::new(role, ordinal),
                    ledger.clone(),
                    draws,
                    stop.clone(),
                    config.schedule.tick(),
                    metrics.clone(),
                );

                match spawn_actor(spawner, actor, exit_tx.clone()) {
                    Ok(handle) => actors.push(handle),
                    Err(e) => {
                        tracing::error!("Aborting startup: {}", e);
                        drop(exit_tx);
                        stop.request();
                        let report = join_all(
                            &mut actors,
                            &exits,
                            config.shutdown.join_warn_after(),
                        );
                        tracing::info!(
                            joined = report.joined,
                            "Stopped {} already-spawned actor(s)",
                            report.joined + report.panicked.len()
                        );
                        if let Err(release_err) = ledger.release() {
                            tracing::warn!("Failed to release ledger: {}", release_err);
                        }
                        if let Some(listener) = listener {
                            listener.abort();
                        }
                        return Err(e);
                    }
                }
            }
        }

        // Only actor threads hold senders from here on
        drop(exit_tx);

        Ok(Self {
            config,
            ledger,
            actors,
            exits,
            stop,
            shutdown,
            listener,
            metrics,
        })
    }

    /// Shared ledger
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Metrics for this run
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Handle to the shutdown signal, for triggering it programmatically
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Number of actors not yet joined
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// State of every actor not yet joined
    pub fn actor_states(&self) -> Vec<(ActorId, ActorState)> {
        self.actors.iter().map(|a| (a.id(), a.state())).collect()
    }

    /// Live state handles of every actor not yet joined; they stay readable
    /// after teardown
    pub fn state_cells(&self) -> Vec<(ActorId, StateCell)> {
        self.actors.iter().map(|a| (a.id(), a.state_cell())).collect()
    }

    /// Block until SIGINT, SIGTERM or a programmatic trigger
    ///
    /// The returned future does not borrow the orchestrator, so it can be
    /// spawned or awaited while the orchestrator moves elsewhere. Signals
    /// received before it is first polled are not lost.
    pub fn await_shutdown(&self) -> impl Future<Output = ()> + Send + 'static {
        let shutdown = self.shutdown.clone();
        async move { shutdown.wait().await }
    }

    /// Tell every actor to stop and wait for all of them
    ///
    /// Blocks without a timeout. Calling it again returns an empty report.
    pub fn stop_all(&mut self) -> StopReport {
        if self.stop.request() {
            tracing::info!("Stopping {} actor(s)", self.actors.len());
        }

        join_all(
            &mut self.actors,
            &self.exits,
            self.config.shutdown.join_warn_after(),
        )
    }

    /// Join every actor (if not done yet) and release the ledger
    pub fn teardown(mut self) -> Result<RunSummary> {
        let report = self.stop_all();
        let ledger = Arc::clone(&self.ledger);
        drop(self);

        let final_balance = match Arc::try_unwrap(ledger) {
            Ok(ledger) => ledger.release()?,
            Err(shared) => {
                // Somebody outside the actor pool still holds the ledger.
                // Reclaim the store anyway rather than leak it.
                tracing::error!(
                    holders = Arc::strong_count(&shared) - 1,
                    "Ledger still referenced at teardown"
                );
                shared.release()?
            }
        };

        tracing::info!(final_balance, joined = report.joined, "Ledger released");
        Ok(RunSummary {
            final_balance,
            report,
        })
    }

    /// Start, wait for a termination signal, stop everything and release the
    /// ledger
    pub async fn run(config: Config) -> Result<RunSummary> {
        let orchestrator = Self::start(config)?;
        orchestrator.await_shutdown().await;

        tokio::task::spawn_blocking(move || orchestrator.teardown())
            .await
            .map_err(|e| Error::Shutdown(format!("Teardown task failed: {}", e)))?
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }

        // Dropped without teardown: let the threads wind down on their own
        if !self.actors.is_empty() && self.stop.request() {
            tracing::warn!(
                "Orchestrator dropped with {} running actor(s); requested stop",
                self.actors.len()
            );
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("ledger", &self.ledger)
            .field("actors", &self.actors.len())
            .field("stop_requested", &self.stop.is_requested())
            .field("shutdown", &self.shutdown.is_triggered())
            .finish()
    }
}

/// Wait for every actor thread to exit, then join them all
///
/// Logs once at warn level if actors are still running after `warn_after`,
/// then keeps waiting. Expects the caller to hold no exit sender.
fn join_all(
    actors: &mut Vec<ActorHandle>,
    exits: &mpsc::Receiver<ActorId>,
    warn_after: Duration,
) -> StopReport {
    let mut warned = false;
    loop {
        match exits.recv_timeout(warn_after) {
            Ok(id) => tracing::debug!(actor = %id, "Actor exited"),
            Err(RecvTimeoutError::Timeout) => {
                if !warned {
                    let running: Vec<String> = actors
                        .iter()
                        .filter(|a| !a.is_finished())
                        .map(|a| a.id().to_string())
                        .collect();
                    tracing::warn!(
                        "Actors still running after {:?}: {}",
                        warn_after,
                        running.join(", ")
                    );
                    warned = true;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let mut report = StopReport::default();
    for handle in actors.drain(..) {
        let id = handle.id();
        match handle.join() {
            Ok(()) => report.joined += 1,
            Err(panic) => {
                tracing::error!(actor = %id, "Actor panicked: {}", panic);
                report.panicked.push(id);
            }
        }
    }
    report
}
