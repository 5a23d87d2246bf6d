//! Error types for job execution.

use thiserror::Error;

/// Result type alias for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors that can occur while loading or running a job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to load job {job_id}: {message}")]
    Load { job_id: String, message: String },

    #[error("job {job_id} does not exist")]
    NotFound { job_id: String },

    #[error("malformed request payload: {0}")]
    BadRequest(String),

    #[error("step '{step}' timed out after {timeout_secs}s")]
    StepTimeout { step: String, timeout_secs: u64 },

    #[error("step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("quit signalled")]
    QuitSignalled,

    #[error("store error: {0}")]
    Store(String),
}
