//! Resource consumers and providers.
//!
//! A consumer is one pending container placement: the memory it reserves
//! and the host ports it pins. A provider is one compute instance with its
//! remaining capacity. Providers are rebuilt from backend state on every
//! scaler run and mutated only in memory during packing.

use serde::Serialize;

use crate::error::{ScalerError, ScalerResult};

/// One unit of pending demand. Immutable once built.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResourceConsumer {
    /// Human-readable id, used for logs and error messages only.
    pub id: String,
    /// Memory the consumer reserves, in bytes.
    pub memory: u64,
    /// Host ports the consumer pins exclusively.
    pub ports: Vec<u16>,
}

impl ResourceConsumer {
    pub fn new(id: &str, memory: u64, ports: Vec<u16>) -> Self {
        Self {
            id: id.to_string(),
            memory,
            ports,
        }
    }
}

/// One unit of supply: a compute instance and its remaining capacity.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResourceProvider {
    id: String,
    in_use: bool,
    available_memory: u64,
    used_ports: Vec<u16>,
}

impl ResourceProvider {
    pub fn new(id: &str, in_use: bool, available_memory: u64, used_ports: Vec<u16>) -> Self {
        Self {
            id: id.to_string(),
            in_use,
            available_memory,
            used_ports,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether any consumer occupies this provider (pre-existing workload
    /// or placed during the current packing run).
    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    pub fn available_memory(&self) -> u64 {
        self.available_memory
    }

    /// The consumer fits if none of its ports are taken and its memory
    /// reservation fits in what remains.
    pub fn has_resources_for(&self, consumer: &ResourceConsumer) -> bool {
        for wanted in &consumer.ports {
            if self.used_ports.contains(wanted) {
                return false;
            }
        }

        consumer.memory <= self.available_memory
    }

    /// Reserve the consumer's resources on this provider and mark it in use.
    pub fn subtract_resources_for(&mut self, consumer: &ResourceConsumer) -> ScalerResult<()> {
        if !self.has_resources_for(consumer) {
            return Err(ScalerError::InsufficientResources);
        }

        self.used_ports.extend_from_slice(&consumer.ports);
        self.available_memory -= consumer.memory;
        self.in_use = true;

        Ok(())
    }
}

/// Order providers for first-fit placement: tightest memory first so
/// consumers pack densely, then unused providers last so they stay
/// candidates for removal. Both sorts are stable.
pub fn sort_providers_for_placement(providers: &mut [ResourceProvider]) {
    providers.sort_by_key(|p| p.available_memory);
    providers.sort_by_key(|p| !p.in_use);
}
