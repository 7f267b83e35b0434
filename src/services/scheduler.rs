//! Fixed-interval measurement scheduler.
//!
//! One background task ticks the supervisor. Cycles are awaited inline,
//! so a slow cycle delays the next tick instead of stacking a second one
//! on the bus. Cancellation stops the timer; an in-flight cycle always
//! runs to completion first.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::chain::{ChainSupervisor, CycleOutcome};
use crate::config::ChainConfig;
use crate::error::Result;

pub struct Scheduler {
    supervisor: Arc<ChainSupervisor>,
    poll_interval: Duration,
    failure_backoff: Duration,
    token: CancellationToken,
}

impl Scheduler {
    pub fn new(
        supervisor: Arc<ChainSupervisor>,
        chain: &ChainConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            supervisor,
            poll_interval: Duration::from_secs(chain.poll_interval_secs),
            failure_backoff: Duration::from_secs(chain.failure_backoff_secs),
            token,
        }
    }

    /// Start the measurement loop on its own task.
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    /// Returns `Err` only when a cycle reports a fatal fault, after
    /// cancelling the token so the rest of the service shuts down too.
    async fn run(self) -> Result<()> {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "measurement scheduler started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    info!("measurement scheduler stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            match self.supervisor.run_cycle().await {
                Ok(CycleOutcome::Fault) => {
                    // Let a glitching bus settle before polling again
                    tokio::select! {
                        _ = self.token.cancelled() => {
                            info!("measurement scheduler stopping");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(self.failure_backoff) => {}
                    }
                },
                Ok(_) => {},
                Err(e) => {
                    error!("fatal chain fault, shutting down: {}", e);
                    self.token.cancel();
                    return Err(e);
                },
            }
        }
    }
}
