//! Lock-guarded execution of periodic work.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::lock::DistributedLock;

/// Runs a unit of work only while holding a distributed lock.
///
/// When redundant replicas all tick at the same cadence, exactly one wins
/// the lock and does the work; the rest skip the round without error. The
/// lock is always released afterwards, even when the work fails.
pub struct Daemon {
    name: String,
    lock_id: String,
    lock: Arc<dyn DistributedLock>,
}

impl Daemon {
    pub fn new(name: &str, lock_id: &str, lock: Arc<dyn DistributedLock>) -> Self {
        Self {
            name: name.to_string(),
            lock_id: lock_id.to_string(),
            lock,
        }
    }

    /// Execute `work` once if the lock is free. Returns `Ok(())` without
    /// running anything when another holder has the lock.
    pub async fn run<F, Fut>(&self, work: F) -> anyhow::Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        if !self.lock.acquire(&self.lock_id)? {
            debug!(daemon = %self.name, lock_id = %self.lock_id, "lock held elsewhere, skipping");
            return Ok(());
        }

        debug!(daemon = %self.name, lock_id = %self.lock_id, "lock acquired");
        let result = work().await;

        if let Err(e) = self.lock.release(&self.lock_id) {
            error!(daemon = %self.name, lock_id = %self.lock_id, error = %e, "failed to release lock");
        }

        result
    }

    /// Tick forever on `interval`, running the guarded work each round.
    /// Work errors are logged, never fatal to the loop.
    pub async fn run_every<F, Fut>(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        work: F,
    ) where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        info!(daemon = %self.name, interval_secs = interval.as_secs(), "daemon started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.run(&work).await {
                        error!(daemon = %self.name, error = %e, "daemon run failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!(daemon = %self.name, "daemon shutting down");
                    break;
                }
            }
        }
    }
}
