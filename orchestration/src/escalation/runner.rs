//! Tokio driver for periodic escalation sweeps.
//!
//! The orchestrator itself has no thread pool; embedders either call
//! `run_escalation_sweep` from their own scheduler or spawn this runner,
//! which ticks on a fixed interval until shut down.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::sweeper::EscalationSweeper;

/// Periodic sweep loop.
pub struct SweepRunner {
    sweeper: Arc<EscalationSweeper>,
    period: Duration,
}

/// Handle for stopping a spawned runner.
pub struct SweepRunnerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweepRunner {
    pub fn new(sweeper: Arc<EscalationSweeper>, period: Duration) -> Self {
        Self { sweeper, period }
    }

    /// Spawn the loop onto the current tokio runtime.
    pub fn spawn(self) -> SweepRunnerHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let sweeper = self.sweeper;
        let period = self.period;

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match sweeper.run() {
                            Ok(outcome) => {
                                info!("sweep cycle: {}", outcome.summary());
                            }
                            Err(err) => {
                                // Store-level failure; the next tick retries.
                                warn!(error = %err, "sweep cycle failed");
                            }
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            info!("sweep runner stopping");
                            break;
                        }
                    }
                }
            }
        });

        SweepRunnerHandle { shutdown, join }
    }
}

impl SweepRunnerHandle {
    /// Signal the loop to stop and wait for it to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        self.join.await.context("sweep runner task panicked")?;
        Ok(())
    }
}
