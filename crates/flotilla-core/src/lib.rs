//! flotilla-core — shared domain models for the Flotilla control plane.
//!
//! Holds the types every other crate speaks:
//!
//! - Backend view models (services, tasks, load balancers, deploys)
//! - Job and tag records persisted by `flotilla-state`
//! - `MultiError` aggregation for fan-out operations
//! - The `flotilla.toml` control-plane configuration

pub mod config;
pub mod error;
pub mod types;

pub use config::ControlPlaneConfig;
pub use error::MultiError;
pub use types::*;
