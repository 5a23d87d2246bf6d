//! flotilla-jobs — asynchronous job execution.
//!
//! Mutating API operations persist a job record and hand its id to a
//! runner process. The runner resolves the record into an ordered step
//! pipeline, executes each step with a timeout, and compensates on failure
//! by walking rollbacks in reverse. Long-running deletions (an environment
//! and everything in it) and bulk task creation both run through this
//! pipeline.
//!
//! - [`step`] — `Step`/`Action` types, `fold`, `run_and_retry`
//! - [`context`] — per-job context and the backend ops traits
//! - [`runner`] — loads a job and drives its steps to a terminal status
//! - [`environment`], [`load_balancer`], [`service`], [`task`] — the step
//!   pipelines per job type
//! - [`janitor`] — cleanup of expired jobs and orphaned tags

pub mod context;
pub mod environment;
pub mod error;
pub mod janitor;
pub mod load_balancer;
pub mod runner;
pub mod service;
pub mod step;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{
    CreateTaskOutcome, EnvironmentOps, JobContext, JobOps, LoadBalancerOps, RetryCreateTask,
    ServiceOps, TaskOps,
};
pub use error::{JobError, JobResult};
pub use janitor::{JobJanitor, TagJanitor};
pub use runner::{JobRunner, LoadedJob};
pub use step::{action, fold, run_and_retry, Action, RollbackFn, Step};
