use crate::domain::ports::{ClockRef, TopupRepositoryRef};
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Housekeeping task that marks stale issued quotes as expired.
///
/// Redemption checks expiry on its own; this only keeps stored statuses honest.
#[derive(Clone)]
pub struct QuoteSweeper {
    repository: TopupRepositoryRef,
    clock: ClockRef,
    interval: Duration,
}

impl QuoteSweeper {
    pub fn new(repository: TopupRepositoryRef, clock: ClockRef, interval: Duration) -> Self {
        Self {
            repository,
            clock,
            interval,
        }
    }

    /// One sweep. Returns how many quotes were expired.
    pub async fn run_once(&self) -> Result<usize> {
        let expired = self.repository.expire_quotes(self.clock.now()).await?;
        if expired > 0 {
            info!(expired, "Expired stale quotes");
        } else {
            debug!("No stale quotes");
        }
        Ok(expired)
    }

    /// Sweeps on every tick until `shutdown` resolves. Sweep failures are logged and retried next tick.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Quote sweep failed");
                    }
                }
            }
        }
    }
}
