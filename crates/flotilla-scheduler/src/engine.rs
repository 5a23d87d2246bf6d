//! The packing pass: greedy first-fit placement and the scale decision.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ScalerError;
use crate::resource::{sort_providers_for_placement, ResourceConsumer, ResourceProvider};

/// Placeholder id for providers the packer speculates into existence.
const NEW_PROVIDER_ID: &str = "<new resource provider>";

/// External boundary to the compute fleet.
pub trait ProviderManager: Send + Sync {
    /// Snapshot the current providers for an environment.
    fn get_providers(&self, environment_id: &str) -> anyhow::Result<Vec<ResourceProvider>>;

    /// Capacity of one newly launched provider, in bytes. Fleets are
    /// homogeneous; the packer never invents a bigger instance.
    fn memory_per_provider(&self) -> u64;

    /// Reconcile the fleet to `desired` providers, preferring to retire the
    /// given unused ones. Returns the scale actually achieved (a minimum
    /// fleet floor may raise it above `desired`).
    fn scale_to(
        &self,
        environment_id: &str,
        desired: usize,
        unused: &[ResourceProvider],
    ) -> anyhow::Result<usize>;
}

/// Serializable record of one packing run, for logs and operator queries.
#[derive(Debug, Clone, Serialize)]
pub struct ScalerRunInfo {
    pub environment_id: String,
    pub pending_resources: Vec<ResourceConsumer>,
    pub resource_providers: Vec<ResourceProvider>,
    pub scale_before_run: usize,
    pub desired_scale_after_run: usize,
    pub actual_scale_after_run: usize,
    pub unused_resource_providers: usize,
}

/// Result of a packing run. Placement and scaling problems ride alongside
/// the run info rather than aborting it: a consumer nobody can place must
/// not stop the rest of the fleet from being right-sized.
#[derive(Debug)]
pub struct PackOutcome {
    pub info: ScalerRunInfo,
    pub errors: Vec<ScalerError>,
}

impl PackOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Greedily pack `consumers` onto `providers` and reconcile the fleet.
///
/// For each consumer in input order the providers are re-sorted (tightest
/// memory first, unused last) and the consumer lands on the first provider
/// that fits. A consumer nothing fits gets a speculative new provider sized
/// at `memory_per_provider`; a consumer too large even for that is reported
/// and skipped. Providers still unused after placement are surplus: the
/// desired scale is the in-use count, and `scale_to` is told which ones to
/// retire first.
pub fn pack(
    environment_id: &str,
    mut providers: Vec<ResourceProvider>,
    consumers: Vec<ResourceConsumer>,
    provider_manager: &dyn ProviderManager,
) -> PackOutcome {
    let scale_before_run = providers.len();
    let mut errors = Vec::new();

    for consumer in &consumers {
        sort_providers_for_placement(&mut providers);

        // Subtraction cannot fail after the fit check.
        let placed = providers
            .iter_mut()
            .find(|p| p.has_resources_for(consumer))
            .is_some_and(|p| p.subtract_resources_for(consumer).is_ok());

        if placed {
            continue;
        }

        let memory = provider_manager.memory_per_provider();
        let mut new_provider = ResourceProvider::new(NEW_PROVIDER_ID, false, memory, vec![]);
        if new_provider.subtract_resources_for(consumer).is_err() {
            warn!(
                environment_id,
                consumer_id = %consumer.id,
                memory_per_provider = memory,
                "consumer too large for an empty provider"
            );
            errors.push(ScalerError::ConsumerTooLarge {
                consumer_id: consumer.id.clone(),
                memory_per_provider: memory,
            });
            continue;
        }

        providers.push(new_provider);
    }

    let unused: Vec<ResourceProvider> = providers
        .iter()
        .filter(|p| !p.is_in_use())
        .cloned()
        .collect();

    let desired_scale = providers.len() - unused.len();
    debug!(
        environment_id,
        scale_before_run,
        desired_scale,
        unused = unused.len(),
        "packing complete"
    );

    let actual_scale = match provider_manager.scale_to(environment_id, desired_scale, &unused) {
        Ok(actual) => actual,
        Err(e) => {
            errors.push(ScalerError::Scale {
                environment_id: environment_id.to_string(),
                message: e.to_string(),
            });
            // The fleet was not changed.
            scale_before_run
        }
    };

    PackOutcome {
        info: ScalerRunInfo {
            environment_id: environment_id.to_string(),
            pending_resources: consumers,
            resource_providers: providers,
            scale_before_run,
            desired_scale_after_run: desired_scale,
            actual_scale_after_run: actual_scale,
            unused_resource_providers: unused.len(),
        },
        errors,
    }
}
