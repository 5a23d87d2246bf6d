//! Background cleanup of stale job records and orphaned tags.
//!
//! Both janitors expose a `pulse` (one cleanup pass) and a `run` loop, and
//! are meant to execute under the distributed-lock daemon so only one API
//! replica performs cleanup at a time.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use flotilla_core::error::MultiError;
use flotilla_state::{JobStore, TagStore};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::context::TaskOps;

/// Deletes terminal jobs once they outlive the configured lifetime.
///
/// Jobs are kept around after completion so their status stays queryable;
/// the lifetime bounds how long. In-flight jobs are never touched.
pub struct JobJanitor {
    jobs: Arc<dyn JobStore>,
    job_lifetime: Duration,
}

impl JobJanitor {
    pub fn new(jobs: Arc<dyn JobStore>, job_lifetime: Duration) -> Self {
        Self { jobs, job_lifetime }
    }

    /// One cleanup pass. Individual delete failures are collected, not
    /// fatal to the pass.
    pub fn pulse(&self) -> anyhow::Result<()> {
        let jobs = self.jobs.select_all()?;
        let now = epoch_secs();

        let mut errors = MultiError::new();
        for job in jobs {
            if !job.is_terminal() {
                continue;
            }

            let age = now.saturating_sub(job.last_updated);
            if age <= self.job_lifetime.as_secs() {
                continue;
            }

            info!(job_id = %job.job_id, age_secs = age, "deleting expired job");
            if let Err(e) = self.jobs.delete(&job.job_id) {
                warn!(job_id = %job.job_id, error = %e, "failed to delete job");
                errors.push(e.into());
            }
        }

        errors.into_result()
    }

    /// Run cleanup passes until the shutdown signal fires.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "job janitor started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.pulse() {
                        error!(error = %e, "job cleanup failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("job janitor shutting down");
                    break;
                }
            }
        }
    }
}

/// Deletes task tags whose task no longer exists in the backend.
pub struct TagJanitor {
    tasks: Arc<dyn TaskOps>,
    tags: Arc<dyn TagStore>,
}

impl TagJanitor {
    pub fn new(tasks: Arc<dyn TaskOps>, tags: Arc<dyn TagStore>) -> Self {
        Self { tasks, tags }
    }

    /// One cleanup pass over the task tags.
    pub fn pulse(&self) -> anyhow::Result<()> {
        let tasks = self.tasks.list_tasks()?;
        let task_exists = |id: &str| tasks.iter().any(|t| t.task_id == id);

        let tags = self.tags.select_by_type("task")?;

        let mut errors = MultiError::new();
        for tag in tags {
            if task_exists(&tag.entity_id) {
                continue;
            }

            info!(task_id = %tag.entity_id, key = %tag.key, "deleting orphaned task tag");
            if let Err(e) = self.tags.delete(&tag.entity_type, &tag.entity_id, &tag.key) {
                warn!(task_id = %tag.entity_id, error = %e, "failed to delete tag");
                errors.push(e.into());
            }
        }

        errors.into_result()
    }

    /// Run cleanup passes until the shutdown signal fires.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "tag janitor started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.pulse() {
                        error!(error = %e, "tag cleanup failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("tag janitor shutting down");
                    break;
                }
            }
        }
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use flotilla_core::types::{JobStatus, JobType, Tag, TaskSummary};
    use flotilla_state::RedbStore;

    use crate::testing::{job, FakeBackend};

    use super::*;

    fn store() -> Arc<RedbStore> {
        Arc::new(RedbStore::open_in_memory().unwrap())
    }

    fn aged_job(job_id: &str, status: JobStatus, last_updated: u64) -> flotilla_core::types::Job {
        let mut j = job(job_id, JobType::DeleteTask, "tsk-1");
        j.job_status = status;
        j.last_updated = last_updated;
        j
    }

    #[test]
    fn deletes_only_expired_terminal_jobs() {
        let store = store();
        let now = epoch_secs();

        JobStore::insert(store.as_ref(), &aged_job("old-done", JobStatus::Completed, now - 7200)).unwrap();
        JobStore::insert(store.as_ref(), &aged_job("old-failed", JobStatus::Error, now - 7200)).unwrap();
        JobStore::insert(store.as_ref(), &aged_job("fresh-done", JobStatus::Completed, now - 60)).unwrap();
        JobStore::insert(store.as_ref(), &aged_job("old-running", JobStatus::InProgress, now - 7200)).unwrap();

        let janitor = JobJanitor::new(store.clone(), Duration::from_secs(3600));
        janitor.pulse().unwrap();

        let mut remaining: Vec<String> = JobStore::select_all(store.as_ref())
            .unwrap()
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["fresh-done", "old-running"]);
    }

    #[test]
    fn empty_store_pulse_is_a_noop() {
        let janitor = JobJanitor::new(store(), Duration::from_secs(3600));
        janitor.pulse().unwrap();
    }

    #[test]
    fn removes_tags_for_missing_tasks() {
        let backend = FakeBackend::new();
        *backend.tasks.lock().unwrap() = vec![TaskSummary {
            task_id: "tsk-live".to_string(),
            environment_id: "env-1".to_string(),
        }];

        let store = store();
        let live_tag = Tag {
            entity_type: "task".to_string(),
            entity_id: "tsk-live".to_string(),
            key: "name".to_string(),
            value: "api".to_string(),
        };
        let orphan_tag = Tag {
            entity_type: "task".to_string(),
            entity_id: "tsk-gone".to_string(),
            key: "name".to_string(),
            value: "worker".to_string(),
        };
        TagStore::insert(store.as_ref(), &live_tag).unwrap();
        TagStore::insert(store.as_ref(), &orphan_tag).unwrap();

        let janitor = TagJanitor::new(backend, store.clone());
        janitor.pulse().unwrap();

        let remaining = TagStore::select_by_type(store.as_ref(), "task").unwrap();
        assert_eq!(remaining, vec![live_tag]);
    }

    #[test]
    fn non_task_tags_are_left_alone() {
        let backend = FakeBackend::new();
        let store = store();

        let service_tag = Tag {
            entity_type: "service".to_string(),
            entity_id: "svc-1".to_string(),
            key: "name".to_string(),
            value: "api".to_string(),
        };
        TagStore::insert(store.as_ref(), &service_tag).unwrap();

        let janitor = TagJanitor::new(backend, store.clone());
        janitor.pulse().unwrap();

        let remaining = TagStore::select_by_type(store.as_ref(), "service").unwrap();
        assert_eq!(remaining, vec![service_tag]);
    }
}
