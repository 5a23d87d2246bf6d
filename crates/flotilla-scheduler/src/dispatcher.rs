//! Scaling triggers: debounced per-environment runs and a periodic sweep.
//!
//! Mutating API calls request a scale via `schedule_run`; a burst of calls
//! for the same environment collapses into one run after the grace period.
//! The periodic sweep exists as a safety net for missed triggers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flotilla_core::error::MultiError;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::scaler::Scaler;

/// Default grace period between a trigger and the actual run.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Lists the environments the periodic sweep should cover.
pub trait EnvironmentLister: Send + Sync {
    fn list_environments(&self) -> anyhow::Result<Vec<String>>;
}

/// Debounces and fans out scaler runs.
pub struct Dispatcher {
    scaler: Arc<dyn Scaler>,
    environments: Arc<dyn EnvironmentLister>,
    grace_period: Duration,
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(
        scaler: Arc<dyn Scaler>,
        environments: Arc<dyn EnvironmentLister>,
        grace_period: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            scaler,
            environments,
            grace_period,
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Schedule a deferred run for one environment. Rescheduling an
    /// already-pending environment pushes the timer back, so a burst of
    /// mutations costs a single run.
    pub async fn schedule_run(self: &Arc<Self>, environment_id: &str) {
        let mut pending = self.pending.lock().await;

        if let Some(previous) = pending.remove(environment_id) {
            debug!(environment_id, "pushing back scheduled scaler run");
            previous.abort();
        }

        debug!(
            environment_id,
            grace_secs = self.grace_period.as_secs(),
            "scaler run scheduled"
        );

        let this = self.clone();
        let env = environment_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(this.grace_period).await;
            this.pending.lock().await.remove(&env);

            match this.scaler.scale(&env) {
                Ok(outcome) => {
                    for e in &outcome.errors {
                        warn!(environment_id = %env, error = %e, "scaler run reported an error");
                    }
                }
                Err(e) => error!(environment_id = %env, error = %e, "scaler run failed"),
            }
        });

        pending.insert(environment_id.to_string(), handle);
    }

    /// Scale every environment immediately and sequentially. Failures are
    /// collected so one broken environment cannot shadow the rest.
    pub async fn run_all(&self) -> anyhow::Result<()> {
        let environments = self.environments.list_environments()?;
        info!(count = environments.len(), "scaling all environments");

        let mut errors = MultiError::new();
        for environment_id in environments {
            match self.scaler.scale(&environment_id) {
                // A run can succeed while still reporting placement or
                // scaling errors; those count against the sweep too.
                Ok(outcome) => {
                    for e in outcome.errors {
                        error!(environment_id, error = %e, "scaler run reported an error");
                        errors.push(e.into());
                    }
                }
                Err(e) => {
                    error!(environment_id, error = %e, "scaler run failed");
                    errors.push(e.into());
                }
            }
        }

        errors.into_result()
    }

    /// Periodic sweep until the shutdown signal fires.
    pub async fn run_every(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(interval_secs = interval.as_secs(), "scaler dispatcher started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.run_all().await {
                        error!(error = %e, "periodic scaling sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("scaler dispatcher shutting down");
                    break;
                }
            }
        }
    }
}
