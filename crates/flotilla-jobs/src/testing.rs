//! Shared fakes for the crate's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use flotilla_core::types::{
    CreateTaskRequest, Job, JobStatus, JobType, LoadBalancerSummary, ServiceSummary, TaskSummary,
};
use flotilla_state::RedbStore;

use crate::context::{
    CreateTaskOutcome, EnvironmentOps, JobContext, JobOps, LoadBalancerOps, ServiceOps, TaskOps,
};

/// Scriptable backend that records every mutation.
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub load_balancers: Mutex<Vec<LoadBalancerSummary>>,
    pub services: Mutex<Vec<ServiceSummary>>,
    pub tasks: Mutex<Vec<TaskSummary>>,
    pub deleted_environments: Mutex<Vec<String>>,
    pub deleted_load_balancers: Mutex<Vec<String>>,
    pub deleted_services: Mutex<Vec<String>>,
    pub deleted_tasks: Mutex<Vec<String>>,
    pub environment_delete_failures: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl EnvironmentOps for FakeBackend {
    fn delete_environment(&self, environment_id: &str) -> anyhow::Result<()> {
        if self.environment_delete_failures.load(Ordering::SeqCst) > 0 {
            self.environment_delete_failures.fetch_sub(1, Ordering::SeqCst);
            anyhow::bail!("environment busy");
        }

        self.deleted_environments
            .lock()
            .unwrap()
            .push(environment_id.to_string());
        Ok(())
    }
}

impl LoadBalancerOps for FakeBackend {
    fn list_load_balancers(&self) -> anyhow::Result<Vec<LoadBalancerSummary>> {
        Ok(self.load_balancers.lock().unwrap().clone())
    }

    fn delete_load_balancer(&self, load_balancer_id: &str) -> anyhow::Result<()> {
        self.deleted_load_balancers
            .lock()
            .unwrap()
            .push(load_balancer_id.to_string());
        Ok(())
    }
}

impl ServiceOps for FakeBackend {
    fn list_services(&self) -> anyhow::Result<Vec<ServiceSummary>> {
        Ok(self.services.lock().unwrap().clone())
    }

    fn delete_service(&self, service_id: &str) -> anyhow::Result<()> {
        self.deleted_services
            .lock()
            .unwrap()
            .push(service_id.to_string());
        Ok(())
    }
}

impl TaskOps for FakeBackend {
    fn list_tasks(&self) -> anyhow::Result<Vec<TaskSummary>> {
        Ok(self.tasks.lock().unwrap().clone())
    }

    fn create_task(&self, request: &CreateTaskRequest) -> anyhow::Result<CreateTaskOutcome> {
        let task_ids = (1..=request.copies)
            .map(|i| format!("{}-{}", request.task_name, i))
            .collect();
        Ok(CreateTaskOutcome::Created { task_ids })
    }

    fn delete_task(&self, task_id: &str) -> anyhow::Result<()> {
        self.deleted_tasks.lock().unwrap().push(task_id.to_string());
        Ok(())
    }
}

pub(crate) fn ops_with_tasks(
    backend: Arc<FakeBackend>,
    tasks: Arc<dyn TaskOps>,
) -> (JobOps, Arc<RedbStore>) {
    let store = Arc::new(RedbStore::open_in_memory().unwrap());
    let ops = JobOps {
        environments: backend.clone(),
        load_balancers: backend.clone(),
        services: backend,
        tasks,
        jobs: store.clone(),
        tags: store.clone(),
    };
    (ops, store)
}

pub(crate) fn test_ops_with(backend: Arc<FakeBackend>) -> (JobOps, Arc<RedbStore>) {
    let store = Arc::new(RedbStore::open_in_memory().unwrap());
    let ops = JobOps {
        environments: backend.clone(),
        load_balancers: backend.clone(),
        services: backend.clone(),
        tasks: backend,
        jobs: store.clone(),
        tags: store.clone(),
    };
    (ops, store)
}

pub(crate) fn test_context() -> JobContext {
    let (ops, _) = test_ops_with(FakeBackend::new());
    JobContext::new("j-1", "", ops)
}

pub(crate) fn job(job_id: &str, job_type: JobType, request: &str) -> Job {
    Job {
        job_id: job_id.to_string(),
        task_id: String::new(),
        job_status: JobStatus::Pending,
        job_type,
        request: request.to_string(),
        time_created: 1000,
        last_updated: 1000,
        meta: HashMap::new(),
    }
}
