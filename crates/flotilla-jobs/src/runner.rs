//! The job runner: loads a job record and drives its steps.
//!
//! Lifecycle: `Pending` → `InProgress` on start, `Completed` when every
//! step succeeds, `Error` when one fails (after the rollback walk). A step
//! that overruns its timeout has its quit signal raised; the runner then
//! waits for the action to actually exit rather than abandoning it, so no
//! action ever runs concurrently with its own rollback.

use std::time::Duration;

use flotilla_core::types::{JobStatus, JobType};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::context::{JobContext, JobOps};
use crate::error::{JobError, JobResult};
use crate::step::Step;
use crate::{environment, load_balancer, service, task};

const JOB_LOAD_ATTEMPTS: usize = 10;
const JOB_LOAD_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// A loaded job, ready to run.
pub struct LoadedJob {
    pub steps: Vec<Step>,
    pub context: JobContext,
}

/// Executes jobs against the backend ops and the job store.
pub struct JobRunner {
    ops: JobOps,
}

impl JobRunner {
    pub fn new(ops: JobOps) -> Self {
        Self { ops }
    }

    /// Fetch the job record and resolve its step list. The record is
    /// written by another process; reads are retried to ride out store
    /// propagation delay.
    pub async fn load(&self, job_id: &str) -> JobResult<LoadedJob> {
        info!(job_id, "loading job");

        let job = self.try_load(job_id).await?;
        let steps = steps_for(job.job_type);
        let context = JobContext::new(&job.job_id, &job.request, self.ops.clone());

        Ok(LoadedJob { steps, context })
    }

    async fn try_load(&self, job_id: &str) -> JobResult<flotilla_core::types::Job> {
        let mut last_error = String::new();

        for attempt in 1..=JOB_LOAD_ATTEMPTS {
            match self.ops.jobs.select_by_id(job_id) {
                Ok(Some(job)) => return Ok(job),
                Ok(None) => {
                    return Err(JobError::NotFound {
                        job_id: job_id.to_string(),
                    })
                }
                Err(e) => {
                    warn!(
                        job_id,
                        attempt,
                        attempts = JOB_LOAD_ATTEMPTS,
                        error = %e,
                        "failed to load job"
                    );
                    last_error = e.to_string();
                    tokio::time::sleep(JOB_LOAD_RETRY_INTERVAL).await;
                }
            }
        }

        Err(JobError::Load {
            job_id: job_id.to_string(),
            message: last_error,
        })
    }

    /// Load and run the job to a terminal status.
    pub async fn run(&self, job_id: &str) -> JobResult<()> {
        let loaded = self.load(job_id).await?;
        self.run_loaded(job_id, &loaded.steps, &loaded.context).await
    }

    async fn run_loaded(&self, job_id: &str, steps: &[Step], context: &JobContext) -> JobResult<()> {
        self.mark_status(job_id, JobStatus::InProgress)?;

        for (index, step) in steps.iter().enumerate() {
            info!(job_id, step = %step.name, "running step");

            if let Err(e) = run_step(step, context).await {
                error!(job_id, step = %step.name, error = %e, "step failed");
                self.rollback(steps, index, context).await;

                if let Err(mark) = self.mark_status(job_id, JobStatus::Error) {
                    error!(job_id, error = %mark, "failed to mark job as errored");
                }

                return Err(e);
            }
        }

        self.mark_status(job_id, JobStatus::Completed)
    }

    /// Walk from the failed step back to the first, running each step's
    /// compensating sub-steps. Rollback is best-effort: failures are
    /// logged and the walk continues, and the job is marked `Error`
    /// regardless of what the rollbacks achieve.
    async fn rollback(&self, steps: &[Step], failed_index: usize, context: &JobContext) {
        for step in steps[..=failed_index].iter().rev() {
            let Some(rollback) = &step.rollback else {
                continue;
            };

            info!(step = %step.name, "rolling back step");
            match rollback(context.clone()) {
                Ok((rollback_context, compensating)) => {
                    for sub in &compensating {
                        if let Err(e) = run_step(sub, &rollback_context).await {
                            error!(step = %step.name, sub_step = %sub.name, error = %e, "rollback step failed");
                        }
                    }
                }
                Err(e) => error!(step = %step.name, error = %e, "rollback failed"),
            }
        }
    }

    fn mark_status(&self, job_id: &str, status: JobStatus) -> JobResult<()> {
        self.ops
            .jobs
            .update_status(job_id, status)
            .map_err(|e| JobError::Store(e.to_string()))
    }
}

/// Run one step's action raced against its timeout. On timeout the quit
/// signal is raised and the runner waits for the action to exit before
/// reporting the timeout.
async fn run_step(step: &Step, context: &JobContext) -> JobResult<()> {
    let (quit_tx, quit_rx) = watch::channel(false);
    let action = step.action.clone();
    let action_context = context.clone();
    let mut handle = tokio::spawn(async move { (action)(quit_rx, action_context).await });

    tokio::select! {
        joined = &mut handle => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(JobError::StepFailed {
                step: step.name.clone(),
                message: e.to_string(),
            }),
            Err(e) => Err(JobError::StepFailed {
                step: step.name.clone(),
                message: format!("action task failed: {e}"),
            }),
        },
        _ = tokio::time::sleep(step.timeout) => {
            if quit_tx.send(true).is_ok() {
                let _ = handle.await;
            }

            Err(JobError::StepTimeout {
                step: step.name.clone(),
                timeout_secs: step.timeout.as_secs(),
            })
        }
    }
}

/// The step pipeline for each job type.
fn steps_for(job_type: JobType) -> Vec<Step> {
    match job_type {
        JobType::DeleteEnvironment => environment::delete_environment_steps(),
        JobType::DeleteLoadBalancer => load_balancer::delete_load_balancer_steps(),
        JobType::DeleteService => service::delete_service_steps(),
        JobType::DeleteTask => task::delete_task_steps(),
        JobType::CreateTask => task::create_task_steps(),
    }
}
