//! flotilla-scheduler — capacity planning for elastic environments.
//!
//! Each scaler run rebuilds the picture from scratch: fetch the fleet of
//! resource providers, collect every pending resource consumer (unscheduled
//! service copies, pending backend tasks, in-flight create-task jobs), then
//! greedily bin-pack consumers onto providers to compute the desired fleet
//! size. Nothing is persisted between runs.
//!
//! - [`resource`] — consumer/provider model and fit arithmetic
//! - [`engine`] — the packing pass and scale decision
//! - [`getter`] — aggregates pending demand from the backend and job store
//! - [`scaler`] — ties getter + provider manager into one `scale` call
//! - [`dispatcher`] — debounced and periodic scaling triggers

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod getter;
pub mod resource;
pub mod scaler;

pub use dispatcher::{Dispatcher, EnvironmentLister};
pub use engine::{pack, PackOutcome, ProviderManager, ScalerRunInfo};
pub use error::{ScalerError, ScalerResult};
pub use getter::{ConsumerGetter, DeploySource, EnvironmentConsumerGetter, ServiceSource, TaskSource};
pub use resource::{ResourceConsumer, ResourceProvider};
pub use scaler::{EnvironmentScaler, Scaler};
