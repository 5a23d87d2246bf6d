//! Error types for the scheduler.

use thiserror::Error;

/// Result type alias for scheduler operations.
pub type ScalerResult<T> = Result<T, ScalerError>;

/// Errors that can occur while computing or applying a scale decision.
///
/// `ConsumerTooLarge` and `Scale` are non-fatal within a packing run: they
/// are collected into the run outcome and the pass continues. The source
/// variants abort the run before any packing happens.
#[derive(Debug, Error)]
pub enum ScalerError {
    #[error("failed to fetch resource providers: {0}")]
    Providers(String),

    #[error("failed to fetch service state: {0}")]
    Services(String),

    #[error("failed to fetch task state: {0}")]
    Tasks(String),

    #[error("failed to fetch deploy {deploy_id}: {message}")]
    Deploy { deploy_id: String, message: String },

    #[error("failed to read jobs: {0}")]
    Jobs(String),

    #[error("malformed request payload on job {job_id}: {message}")]
    BadJobRequest { job_id: String, message: String },

    #[error("consumer '{consumer_id}' cannot fit into an empty provider ({memory_per_provider} bytes)")]
    ConsumerTooLarge {
        consumer_id: String,
        memory_per_provider: u64,
    },

    #[error("provider does not have adequate resources to subtract")]
    InsufficientResources,

    #[error("failed to scale environment {environment_id}: {message}")]
    Scale {
        environment_id: String,
        message: String,
    },
}
