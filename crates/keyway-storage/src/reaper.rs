use jiff::Timestamp;
use keyway_core::store::{MappingStore, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodically deletes expired mappings.
///
/// Expired mappings are already invisible to reads and writes; the reaper
/// only reclaims the space they occupy.
pub struct Reaper<S> {
    store: S,
    interval: Duration,
}

impl<S: MappingStore> Reaper<S> {
    pub fn new(store: S, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Runs a single purge pass.
    pub async fn sweep_once(&self) -> Result<usize> {
        let purged = self.store.purge_expired(Timestamp::now()).await?;
        if purged > 0 {
            info!(purged, "purged expired mappings");
        } else {
            debug!("no expired mappings to purge");
        }
        Ok(purged)
    }

    /// Sweeps every interval until `shutdown` resolves.
    ///
    /// A failing sweep is logged and retried on the next tick.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("reaper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "expired mapping sweep failed");
                    }
                }
            }
        }
    }
}
