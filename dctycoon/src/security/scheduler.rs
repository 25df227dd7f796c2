//! Timer that drives [`SecurityTick`] in the background.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::SecurityTick;

pub struct SecurityTickScheduler {
    tick: SecurityTick,
    interval: Duration,
}

impl SecurityTickScheduler {
    pub fn new(tick: SecurityTick, interval: Duration) -> Self {
        Self { tick, interval }
    }

    /// Run sweeps until `shutdown` is cancelled.
    ///
    /// The first sweep waits one full interval so a restart does not sweep twice in quick succession.
    /// Sweeps that overrun the interval cause the missed ticks to be skipped rather than bunched.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("Starting security tick scheduler (every {:?})", self.interval);

        let start = tokio::time::Instant::now() + self.interval;
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Security tick scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    // A failed sweep is already logged, the next tick retries
                    if let Err(e) = self.tick.run_once().await {
                        tracing::error!("Security tick failed: {:#}", e);
                    }
                }
            }
        }
    }
}
