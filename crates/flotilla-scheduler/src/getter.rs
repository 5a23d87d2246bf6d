//! Aggregates pending demand for an environment.
//!
//! Demand comes from three places: service deployments with unscheduled
//! copies, backend tasks with pending copies, and create-task jobs that are
//! still in flight (requested capacity the backend has not seen yet). Each
//! pending copy expands into one consumer per container in its deploy.

use std::collections::HashMap;
use std::sync::Arc;

use flotilla_core::types::{
    CreateTaskRequest, Deploy, JobStatus, JobType, Service, ServiceSummary, Task, TaskSummary,
};
use flotilla_state::JobStore;
use tracing::debug;

use crate::error::{ScalerError, ScalerResult};
use crate::resource::ResourceConsumer;

/// Read access to service state in the backend.
pub trait ServiceSource: Send + Sync {
    fn list_services(&self) -> anyhow::Result<Vec<ServiceSummary>>;
    fn get_service(&self, service_id: &str) -> anyhow::Result<Service>;
}

/// Read access to task state in the backend.
pub trait TaskSource: Send + Sync {
    fn list_tasks(&self) -> anyhow::Result<Vec<TaskSummary>>;
    fn get_task(&self, task_id: &str) -> anyhow::Result<Task>;
}

/// Read access to deploy revisions.
pub trait DeploySource: Send + Sync {
    fn get_deploy(&self, deploy_id: &str) -> anyhow::Result<Deploy>;
}

/// Produces the pending consumers for one environment.
pub trait ConsumerGetter: Send + Sync {
    fn get_consumers(&self, environment_id: &str) -> ScalerResult<Vec<ResourceConsumer>>;
}

/// Per-container resource shape extracted from a deploy.
#[derive(Clone)]
struct ContainerShape {
    name: String,
    memory: u64,
    ports: Vec<u16>,
}

/// Deploy shapes looked up during one `get_consumers` call. A deploy is
/// immutable once created, but the cache still lives only for the call so
/// a long-running getter never serves deleted deploys.
type DeployCache = HashMap<String, Vec<ContainerShape>>;

/// `ConsumerGetter` backed by the orchestration backend and the job store.
pub struct EnvironmentConsumerGetter {
    services: Arc<dyn ServiceSource>,
    tasks: Arc<dyn TaskSource>,
    deploys: Arc<dyn DeploySource>,
    jobs: Arc<dyn JobStore>,
}

impl EnvironmentConsumerGetter {
    pub fn new(
        services: Arc<dyn ServiceSource>,
        tasks: Arc<dyn TaskSource>,
        deploys: Arc<dyn DeploySource>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            services,
            tasks,
            deploys,
            jobs,
        }
    }

    fn pending_service_consumers(
        &self,
        environment_id: &str,
        cache: &mut DeployCache,
    ) -> ScalerResult<Vec<ResourceConsumer>> {
        let summaries = self
            .services
            .list_services()
            .map_err(|e| ScalerError::Services(e.to_string()))?;

        let mut consumers = Vec::new();
        for summary in summaries {
            if summary.environment_id != environment_id {
                continue;
            }

            let service = self
                .services
                .get_service(&summary.service_id)
                .map_err(|e| ScalerError::Services(e.to_string()))?;

            for deployment in &service.deployments {
                let copies = deployment.unscheduled_copies();
                if copies == 0 {
                    continue;
                }

                self.expand_copies(
                    &deployment.deploy_id,
                    copies,
                    cache,
                    &mut consumers,
                    |container, copy| {
                        format!(
                            "Service: {}, Deploy: {}, Container: {}, Copy: {}",
                            summary.service_id, deployment.deploy_id, container, copy
                        )
                    },
                )?;
            }
        }

        Ok(consumers)
    }

    fn pending_task_consumers(
        &self,
        environment_id: &str,
        cache: &mut DeployCache,
    ) -> ScalerResult<Vec<ResourceConsumer>> {
        let summaries = self
            .tasks
            .list_tasks()
            .map_err(|e| ScalerError::Tasks(e.to_string()))?;

        let mut consumers = Vec::new();
        for summary in summaries {
            if summary.environment_id != environment_id {
                continue;
            }

            let task = self
                .tasks
                .get_task(&summary.task_id)
                .map_err(|e| ScalerError::Tasks(e.to_string()))?;

            if task.pending_count == 0 {
                continue;
            }

            self.expand_copies(
                &task.deploy_id,
                task.pending_count,
                cache,
                &mut consumers,
                |container, copy| {
                    format!(
                        "Task: {}, Deploy: {}, Container: {}, Copy: {}",
                        summary.task_id, task.deploy_id, container, copy
                    )
                },
            )?;
        }

        Ok(consumers)
    }

    /// Create-task jobs that have not finished yet represent demand the
    /// backend does not report. Counting the full request over-reserves
    /// when a job has already started some copies; those copies also show
    /// up as backend tasks and age out once the job completes.
    fn pending_job_consumers(
        &self,
        environment_id: &str,
        cache: &mut DeployCache,
    ) -> ScalerResult<Vec<ResourceConsumer>> {
        let jobs = self
            .jobs
            .select_by_type(JobType::CreateTask)
            .map_err(|e| ScalerError::Jobs(e.to_string()))?;

        let mut consumers = Vec::new();
        for job in jobs {
            if !matches!(job.job_status, JobStatus::Pending | JobStatus::InProgress) {
                continue;
            }

            let request: CreateTaskRequest = serde_json::from_str(&job.request).map_err(|e| {
                ScalerError::BadJobRequest {
                    job_id: job.job_id.clone(),
                    message: e.to_string(),
                }
            })?;

            if request.environment_id != environment_id {
                continue;
            }

            self.expand_copies(
                &request.deploy_id,
                request.copies,
                cache,
                &mut consumers,
                |container, copy| {
                    format!(
                        "Task: {}, Deploy: {}, Container: {}, Copy: {}",
                        request.task_name, request.deploy_id, container, copy
                    )
                },
            )?;
        }

        Ok(consumers)
    }

    /// Expand `copies` instances of a deploy into one consumer per
    /// container per copy. Ids are human-readable debug strings.
    fn expand_copies(
        &self,
        deploy_id: &str,
        copies: u32,
        cache: &mut DeployCache,
        consumers: &mut Vec<ResourceConsumer>,
        generate_id: impl Fn(&str, u32) -> String,
    ) -> ScalerResult<()> {
        let shapes = self.deploy_shapes(deploy_id, cache)?;
        for copy in 1..=copies {
            for shape in &shapes {
                let id = generate_id(&shape.name, copy);
                consumers.push(ResourceConsumer::new(
                    &id,
                    shape.memory,
                    shape.ports.clone(),
                ));
            }
        }

        Ok(())
    }

    fn deploy_shapes(
        &self,
        deploy_id: &str,
        cache: &mut DeployCache,
    ) -> ScalerResult<Vec<ContainerShape>> {
        if let Some(shapes) = cache.get(deploy_id) {
            return Ok(shapes.clone());
        }

        let deploy = self
            .deploys
            .get_deploy(deploy_id)
            .map_err(|e| ScalerError::Deploy {
                deploy_id: deploy_id.to_string(),
                message: e.to_string(),
            })?;

        let shapes: Vec<ContainerShape> = deploy
            .containers
            .iter()
            .map(|c| ContainerShape {
                name: c.name.clone(),
                memory: c.effective_memory(),
                ports: c.host_ports(),
            })
            .collect();

        cache.insert(deploy_id.to_string(), shapes.clone());
        Ok(shapes)
    }
}

impl ConsumerGetter for EnvironmentConsumerGetter {
    fn get_consumers(&self, environment_id: &str) -> ScalerResult<Vec<ResourceConsumer>> {
        let mut cache = DeployCache::new();

        let mut consumers = self.pending_service_consumers(environment_id, &mut cache)?;
        consumers.extend(self.pending_task_consumers(environment_id, &mut cache)?);
        consumers.extend(self.pending_job_consumers(environment_id, &mut cache)?);

        debug!(
            environment_id,
            pending = consumers.len(),
            "collected pending consumers"
        );
        Ok(consumers)
    }
}
