//! The environment scaler: one `scale` call per environment per trigger.

use std::sync::Arc;

use tracing::info;

use crate::engine::{pack, PackOutcome, ProviderManager};
use crate::error::{ScalerError, ScalerResult};
use crate::getter::ConsumerGetter;

/// Computes and applies the scale decision for one environment.
pub trait Scaler: Send + Sync {
    fn scale(&self, environment_id: &str) -> ScalerResult<PackOutcome>;
}

/// `Scaler` that rebuilds demand and supply from scratch on every call.
/// Holds no state between runs.
pub struct EnvironmentScaler {
    consumers: Arc<dyn ConsumerGetter>,
    providers: Arc<dyn ProviderManager>,
}

impl EnvironmentScaler {
    pub fn new(consumers: Arc<dyn ConsumerGetter>, providers: Arc<dyn ProviderManager>) -> Self {
        Self {
            consumers,
            providers,
        }
    }
}

impl Scaler for EnvironmentScaler {
    fn scale(&self, environment_id: &str) -> ScalerResult<PackOutcome> {
        let providers = self
            .providers
            .get_providers(environment_id)
            .map_err(|e| ScalerError::Providers(e.to_string()))?;

        let consumers = self.consumers.get_consumers(environment_id)?;

        let outcome = pack(environment_id, providers, consumers, self.providers.as_ref());
        info!(
            environment_id,
            scale_before = outcome.info.scale_before_run,
            desired_scale = outcome.info.desired_scale_after_run,
            actual_scale = outcome.info.actual_scale_after_run,
            unused = outcome.info.unused_resource_providers,
            errors = outcome.errors.len(),
            "scaler run finished"
        );

        Ok(outcome)
    }
}
