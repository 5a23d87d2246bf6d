//! Job execution context and the operation traits steps call into.
//!
//! Steps never talk to the backend directly; they go through the ops
//! traits carried by the [`JobContext`]. A context can be re-requested via
//! [`JobContext::with_request`] so a parent job can fan out into child
//! operations while every clone still reports through the same job record.

use std::sync::Arc;

use flotilla_core::types::{
    CreateTaskRequest, LoadBalancerSummary, ServiceSummary, TaskSummary,
};
use flotilla_state::{JobStore, TagStore};
use tokio::sync::Mutex;

use crate::error::{JobError, JobResult};

/// Meta key under which created task ids are accumulated.
const CREATED_TASKS_META_KEY: &str = "created_task_ids";

/// Outcome of a bulk task creation, decided once at the backend boundary.
///
/// `Partial` carries a continuation instead of the original request: the
/// caller finishes its side effects for the copies that did get created
/// (tagging, meta), then invokes `retry` for the remainder. Re-deriving the
/// request from scratch would double-create the successful copies.
pub enum CreateTaskOutcome {
    Created { task_ids: Vec<String> },
    Partial {
        created: Vec<String>,
        retry: RetryCreateTask,
    },
}

/// Continuation that retries the not-yet-created copies of a task request.
pub type RetryCreateTask = Box<dyn FnOnce() -> anyhow::Result<CreateTaskOutcome> + Send>;

/// Environment operations the steps may invoke.
pub trait EnvironmentOps: Send + Sync {
    fn delete_environment(&self, environment_id: &str) -> anyhow::Result<()>;
}

/// Load balancer operations the steps may invoke.
pub trait LoadBalancerOps: Send + Sync {
    fn list_load_balancers(&self) -> anyhow::Result<Vec<LoadBalancerSummary>>;
    fn delete_load_balancer(&self, load_balancer_id: &str) -> anyhow::Result<()>;
}

/// Service operations the steps may invoke.
pub trait ServiceOps: Send + Sync {
    fn list_services(&self) -> anyhow::Result<Vec<ServiceSummary>>;
    fn delete_service(&self, service_id: &str) -> anyhow::Result<()>;
}

/// Task operations the steps may invoke.
pub trait TaskOps: Send + Sync {
    fn list_tasks(&self) -> anyhow::Result<Vec<TaskSummary>>;
    fn create_task(&self, request: &CreateTaskRequest) -> anyhow::Result<CreateTaskOutcome>;
    fn delete_task(&self, task_id: &str) -> anyhow::Result<()>;
}

/// The full set of handles a job needs: backend ops plus the stores.
#[derive(Clone)]
pub struct JobOps {
    pub environments: Arc<dyn EnvironmentOps>,
    pub load_balancers: Arc<dyn LoadBalancerOps>,
    pub services: Arc<dyn ServiceOps>,
    pub tasks: Arc<dyn TaskOps>,
    pub jobs: Arc<dyn JobStore>,
    pub tags: Arc<dyn TagStore>,
}

/// Per-job execution context handed to every step action.
#[derive(Clone)]
pub struct JobContext {
    job_id: String,
    request: String,
    ops: JobOps,
    // Serializes composite meta updates across context clones.
    meta_lock: Arc<Mutex<()>>,
}

impl JobContext {
    pub fn new(job_id: &str, request: &str, ops: JobOps) -> Self {
        Self {
            job_id: job_id.to_string(),
            request: request.to_string(),
            ops,
            meta_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Clone this context with a different request payload. The clone
    /// shares the same ops handles and meta lock, so parallel child
    /// operations report through one job record without racing.
    pub fn with_request(&self, request: &str) -> Self {
        Self {
            job_id: self.job_id.clone(),
            request: request.to_string(),
            ops: self.ops.clone(),
            meta_lock: self.meta_lock.clone(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    pub fn environments(&self) -> &dyn EnvironmentOps {
        self.ops.environments.as_ref()
    }

    pub fn load_balancers(&self) -> &dyn LoadBalancerOps {
        self.ops.load_balancers.as_ref()
    }

    pub fn services(&self) -> &dyn ServiceOps {
        self.ops.services.as_ref()
    }

    pub fn tasks(&self) -> &dyn TaskOps {
        self.ops.tasks.as_ref()
    }

    pub fn jobs(&self) -> &dyn JobStore {
        self.ops.jobs.as_ref()
    }

    pub fn tags(&self) -> &dyn TagStore {
        self.ops.tags.as_ref()
    }

    /// Append a created task id to the job's meta record. Rollback reads
    /// this list back to know what to delete.
    pub async fn record_created_task(&self, task_id: &str) -> JobResult<()> {
        let _guard = self.meta_lock.lock().await;

        let job = self
            .ops
            .jobs
            .select_by_id(&self.job_id)
            .map_err(|e| JobError::Store(e.to_string()))?
            .ok_or_else(|| JobError::NotFound {
                job_id: self.job_id.clone(),
            })?;

        let value = match job.meta.get(CREATED_TASKS_META_KEY) {
            Some(existing) if !existing.is_empty() => format!("{existing},{task_id}"),
            _ => task_id.to_string(),
        };

        self.ops
            .jobs
            .set_meta(&self.job_id, CREATED_TASKS_META_KEY, &value)
            .map_err(|e| JobError::Store(e.to_string()))
    }

    /// Task ids this job has created so far.
    pub fn created_tasks(&self) -> JobResult<Vec<String>> {
        let job = self
            .ops
            .jobs
            .select_by_id(&self.job_id)
            .map_err(|e| JobError::Store(e.to_string()))?
            .ok_or_else(|| JobError::NotFound {
                job_id: self.job_id.clone(),
            })?;

        Ok(job
            .meta
            .get(CREATED_TASKS_META_KEY)
            .map(|v| v.split(',').map(String::from).collect())
            .unwrap_or_default())
    }
}
