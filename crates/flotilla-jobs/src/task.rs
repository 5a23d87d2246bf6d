//! Steps for task jobs.
//!
//! Task deletion takes the task id as its payload. Task creation takes a
//! JSON `CreateTaskRequest`; the backend may create only some of the
//! requested copies and hand back a retry continuation for the rest. The
//! action records and tags each created copy before invoking the
//! continuation, so an interrupted creation never loses or double-tags a
//! task, and the rollback knows exactly which copies to delete.

use std::sync::Arc;
use std::time::Duration;

use flotilla_core::types::{CreateTaskRequest, Tag};
use tracing::info;

use crate::context::{CreateTaskOutcome, JobContext};
use crate::error::JobError;
use crate::step::{action, run_and_retry, Action, RollbackFn, Step, RETRY_INTERVAL};

pub fn delete_task_steps() -> Vec<Step> {
    vec![Step::new(
        "Delete Task",
        Duration::from_secs(10 * 60),
        delete_task_action(),
    )]
}

pub fn create_task_steps() -> Vec<Step> {
    vec![Step::new(
        "Create Task",
        Duration::from_secs(24 * 60 * 60),
        create_task_action(),
    )
    .with_rollback(create_task_rollback())]
}

pub(crate) fn delete_task_action() -> Action {
    action(|mut quit, context| async move {
        let task_id = context.request().to_string();

        run_and_retry(&mut quit, RETRY_INTERVAL, || async {
            context.tasks().delete_task(&task_id)
        })
        .await
    })
}

fn create_task_action() -> Action {
    action(|quit, context| async move {
        let request: CreateTaskRequest = serde_json::from_str(context.request())
            .map_err(|e| JobError::BadRequest(e.to_string()))?;

        let mut outcome = context.tasks().create_task(&request)?;
        loop {
            if *quit.borrow() {
                return Err(JobError::QuitSignalled.into());
            }

            match outcome {
                CreateTaskOutcome::Created { task_ids } => {
                    for task_id in &task_ids {
                        record_created(&context, &request, task_id).await?;
                    }

                    info!(job_id = context.job_id(), task_name = %request.task_name, "task creation complete");
                    return Ok(());
                }
                CreateTaskOutcome::Partial { created, retry } => {
                    // Finish side effects for the copies that exist before
                    // retrying the remainder.
                    for task_id in &created {
                        record_created(&context, &request, task_id).await?;
                    }

                    info!(
                        job_id = context.job_id(),
                        created = created.len(),
                        "partial task creation, retrying the remainder"
                    );
                    outcome = retry()?;
                }
            }
        }
    })
}

async fn record_created(
    context: &JobContext,
    request: &CreateTaskRequest,
    task_id: &str,
) -> anyhow::Result<()> {
    context.record_created_task(task_id).await?;
    context.tags().insert(&Tag {
        entity_type: "task".to_string(),
        entity_id: task_id.to_string(),
        key: "name".to_string(),
        value: request.task_name.clone(),
    })?;

    Ok(())
}

/// Compensate a failed creation by deleting every copy the job recorded.
fn create_task_rollback() -> RollbackFn {
    Arc::new(|context| {
        let created = context.created_tasks()?;

        let steps = created
            .into_iter()
            .map(|task_id| {
                Step::new(
                    &format!("Delete Task {task_id}"),
                    Duration::from_secs(10 * 60),
                    action(move |mut quit, ctx| {
                        let task_id = task_id.clone();
                        async move {
                            run_and_retry(&mut quit, RETRY_INTERVAL, || async {
                                ctx.tasks().delete_task(&task_id)
                            })
                            .await
                        }
                    }),
                )
            })
            .collect();

        Ok((context, steps))
    })
}
