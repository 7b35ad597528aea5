//! Process-wide shutdown signal
//!
//! A set-once flag backed by a [`tokio::sync::watch`] channel. SIGINT and
//! SIGTERM both trigger it; repeated signals are ignored. Waiters block on the
//! channel instead of polling.

use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Set-once shutdown flag
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Create an unset signal
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Set the flag. Returns `true` only for the call that actually set it.
    pub fn trigger(&self) -> bool {
        self.sender.send_if_modified(|triggered| {
            if *triggered {
                false
            } else {
                *triggered = true;
                true
            }
        })
    }

    /// Has the flag been set
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Wait until the flag is set
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let _ = receiver.wait_for(|triggered| *triggered).await;
    }
}

/// Spawn a task that triggers `signal` on SIGINT or SIGTERM
///
/// Handlers are installed before this returns, so a signal arriving right
/// after the call is not lost. Must be called from inside a Tokio runtime.
pub fn listen_for_termination(signal: ShutdownSignal) -> Result<JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        let mut interrupt = unix_signal(SignalKind::interrupt())
            .map_err(|e| Error::Shutdown(format!("Unable to listen for SIGINT: {}", e)))?;
        let mut terminate = unix_signal(SignalKind::terminate())
            .map_err(|e| Error::Shutdown(format!("Unable to listen for SIGTERM: {}", e)))?;

        Ok(tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    received = interrupt.recv() => match received {
                        Some(()) => "SIGINT",
                        None => break,
                    },
                    received = terminate.recv() => match received {
                        Some(()) => "SIGTERM",
                        None => break,
                    },
                };

                if signal.trigger() {
                    tracing::info!("Received {}, shutting down", name);
                } else {
                    tracing::debug!("Received {} again, shutdown already in progress", name);
                }
            }
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Unable to listen for shutdown signal: {}", e);
                    break;
                }
                if signal.trigger() {
                    tracing::info!("Received Ctrl-C, shutting down");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_is_set_once() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());

        assert!(signal.trigger());
        assert!(!signal.trigger());
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_clones_share_state() {
        let signal = ShutdownSignal::new();
        let other = signal.clone();
        other.trigger();
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_wait_returns_after_trigger() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        signal.trigger();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_after_trigger_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
    }
}
