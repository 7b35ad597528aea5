//! Actor loop: one OS thread per actor
//!
//! Each actor repeats the same cycle until it is told to stop:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  top of cycle: stop requested? ── yes ──► Stopping    │
//! │        │ no                                   │       │
//! │        ▼                                      ▼       │
//! │  sleep 0..=max ticks (lock NOT held)       Stopped    │
//! │        │                                              │
//! │        ▼                                              │
//! │  ┌────────────── critical section ───────────────┐   │
//! │  │ lock → read balance → policy → write? → unlock│   │
//! │  └───────────────────────────────────────────────┘   │
//! │        │                                              │
//! │        ▼                                              │
//! │  report outcome, back to top                          │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Stopping is cooperative. A sleeping actor finishes its sleep and its
//! cycle; it never leaves mid-critical-section.

use crate::{
    ledger::Ledger,
    metrics::Metrics,
    policy::{self, Draw},
    types::{ActorId, ActorState, Outcome, Role},
    Error, Result,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Stop condition shared by an orchestrator and its actors
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder to stop. Returns `true` for the first request only.
    pub fn request(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    /// Has a stop been requested
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Observable lifecycle state of one actor
#[derive(Clone, Debug)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ActorState::Running as u8)))
    }

    /// Current state
    pub fn get(&self) -> ActorState {
        ActorState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ActorState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// A single actor and everything it owns
pub struct Actor<D: Draw> {
    /// Identity (role + ordinal)
    id: ActorId,

    /// Shared ledger
    ledger: Arc<Ledger>,

    /// Private random stream
    draws: D,

    /// Shared stop condition
    stop: StopFlag,

    /// Published lifecycle state
    state: StateCell,

    /// Length of one sleep unit
    tick: Duration,

    /// Metrics sink
    metrics: Metrics,
}

impl<D: Draw> Actor<D> {
    /// Create new actor in the `Running` state
    pub fn new(
        id: ActorId,
        ledger: Arc<Ledger>,
        draws: D,
        stop: StopFlag,
        tick: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            id,
            ledger,
            draws,
            stop,
            state: StateCell::new(),
            tick,
            metrics,
        }
    }

    /// Actor identity
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Handle to the published state
    pub fn state(&self) -> StateCell {
        self.state.clone()
    }

    /// Run cycles until a stop is requested
    pub fn run(mut self) {
        let span = tracing::info_span!("actor", id = %self.id);
        let _enter = span.enter();

        self.metrics.actor_started();
        tracing::debug!("Actor started");

        loop {
            if self.stop.is_requested() {
                self.state.set(ActorState::Stopping);
                break;
            }

            let ticks = policy::sleep_ticks(self.id.role, &mut self.draws);
            thread::sleep(self.tick.saturating_mul(ticks as u32));

            self.cycle();
        }

        self.state.set(ActorState::Stopped);
        self.metrics.actor_stopped();
        tracing::info!("Actor stopped");
    }

    /// One critical section: read, decide, maybe write, report
    pub fn cycle(&mut self) -> Outcome {
        let role = self.id.role;
        tracing::info!("{}: Attempting to Check Balance", role.display_name());

        let wait_started = Instant::now();
        let outcome = {
            let mut guard = self.ledger.lock();
            self.metrics
                .record_lock_wait(wait_started.elapsed().as_secs_f64());

            let balance = guard.read();
            let outcome = policy::decide(role, balance, &mut self.draws);
            if outcome.is_mutation() {
                guard.write(outcome.balance());
            }
            self.metrics.record_outcome(role, &outcome);
            outcome
        };

        report(role, &outcome);
        outcome
    }
}

impl<D: Draw> fmt::Debug for Actor<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("tick", &self.tick)
            .finish()
    }
}

/// Emit the status line for one outcome
fn report(role: Role, outcome: &Outcome) {
    tracing::info!(
        outcome = outcome.label(),
        delta = outcome.delta(),
        balance = outcome.balance(),
        "{}",
        outcome.describe(role)
    );
}

/// Creates the thread an actor runs on
///
/// The default [`ThreadSpawner`] uses named OS threads. Other implementations
/// exist mostly to exercise the startup failure path.
pub trait ActorSpawner {
    /// Start `body` on a new thread called `name`
    fn spawn(
        &self,
        name: String,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> std::io::Result<JoinHandle<()>>;
}

/// Spawns one named OS thread per actor
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl ActorSpawner for ThreadSpawner {
    fn spawn(
        &self,
        name: String,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name).spawn(body)
    }
}

/// Handle to a running actor thread
pub struct ActorHandle {
    id: ActorId,
    state: StateCell,
    thread: JoinHandle<()>,
}

impl ActorHandle {
    /// Actor identity
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> ActorState {
        self.state.get()
    }

    /// Shared view of the state, usable after the handle is joined
    pub fn state_cell(&self) -> StateCell {
        self.state.clone()
    }

    /// Has the thread exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the thread. `Err` carries the panic payload message.
    pub fn join(self) -> std::result::Result<(), String> {
        self.thread.join().map_err(|payload| {
            payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string())
        })
    }
}

impl fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish()
    }
}

/// Spawn an actor thread
///
/// `exits` receives the actor id when the loop returns normally. The sender is
/// dropped either way, so a receiver sees the channel close once every actor
/// thread is gone, panicked ones included.
pub fn spawn_actor<S, D>(
    spawner: &S,
    actor: Actor<D>,
    exits: mpsc::Sender<ActorId>,
) -> Result<ActorHandle>
where
    S: ActorSpawner + ?Sized,
    D: Draw + Send + 'static,
{
    let id = actor.id();
    let state = actor.state();

    let thread = spawner
        .spawn(
            id.to_string(),
            Box::new(move || {
                actor.run();
                let _ = exits.send(id);
            }),
        )
        .map_err(|source| Error::Spawn {
            actor: id.to_string(),
            source,
        })?;

    tracing::debug!(actor = %id, "Actor spawned");
    Ok(ActorHandle { id, state, thread })
}
