//! Family ledger simulation binary
//!
//! ```text
//! family-ledger [PRIMARY] [WITHDRAWERS] [--secondary N] [--legacy-parents]
//! ```
//!
//! Runs until SIGINT or SIGTERM, then stops every actor, waits for all of them
//! and releases the ledger.

use anyhow::Context;
use clap::Parser;
use family_ledger::{ActorCounts, Config, Orchestrator, Role};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "family-ledger")]
#[command(about = "Concurrent depositors and withdrawers sharing one bank account")]
#[command(version)]
struct Cli {
    /// Primary depositors (parents with --legacy-parents)
    #[arg(allow_negative_numbers = true)]
    primary: Option<i64>,

    /// Withdrawers
    #[arg(allow_negative_numbers = true)]
    withdrawers: Option<i64>,

    /// Secondary depositors
    #[arg(long, allow_negative_numbers = true)]
    secondary: Option<i64>,

    /// Treat PRIMARY as a parent count: the first parent is a primary
    /// depositor, every further parent a secondary depositor
    #[arg(long, conflicts_with = "secondary")]
    legacy_parents: bool,

    /// Length of one sleep time unit in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Base seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Mirror the balance into this file; removed on exit
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, env = "LEDGER_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Defaults, then file, then environment, then flags
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Config::default(),
        };
        config.apply_env()?;

        let current = config.actors;
        let withdrawers = self.withdrawers.unwrap_or(current.withdrawers as i64);
        config.actors = if self.legacy_parents {
            ActorCounts::from_parents(self.primary.unwrap_or(1), withdrawers)?
        } else {
            ActorCounts::new(
                self.primary.unwrap_or(current.primary_depositors as i64),
                self.secondary.unwrap_or(current.secondary_depositors as i64),
                withdrawers,
            )?
        };

        if let Some(tick_ms) = self.tick_ms {
            config.schedule.tick_ms = tick_ms;
        }
        if self.seed.is_some() {
            config.schedule.seed = self.seed;
        }
        if self.store_path.is_some() {
            config.store.path = self.store_path;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    let config = Cli::parse().into_config()?;

    tracing::info!(
        "Starting with {} primary depositor(s), {} secondary depositor(s) and {} withdrawer(s)",
        config.actors.primary_depositors,
        config.actors.secondary_depositors,
        config.actors.withdrawers
    );

    let orchestrator = Orchestrator::start(config).context("failed to start the actor pool")?;
    orchestrator.await_shutdown().await;

    tracing::info!("Terminating actors...");
    let metrics = orchestrator.metrics().clone();
    let summary = tokio::task::spawn_blocking(move || orchestrator.teardown())
        .await
        .context("teardown task failed")??;

    for role in Role::ALL {
        tracing::info!(role = %role, cycles = metrics.cycles(role), "Role summary");
    }
    tracing::debug!("Final metrics:\n{}", metrics.encode());

    if !summary.report.is_clean() {
        tracing::warn!(
            "{} actor(s) panicked before shutdown",
            summary.report.panicked.len()
        );
    }

    tracing::info!(
        final_balance = summary.final_balance,
        "Program terminated successfully"
    );
    Ok(())
}
