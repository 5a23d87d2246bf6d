//! Steps: the execution units of a job.
//!
//! Each job type maps to an ordered list of steps. The runner executes
//! actions in sequence until one fails or the list is exhausted; on failure
//! it walks back from the failed step running rollbacks. Rollbacks are
//! best-effort cleanup, so any retry logic belongs in the action, never in
//! the rollback.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use flotilla_core::error::MultiError;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::warn;

use crate::context::JobContext;
use crate::error::JobError;

/// Backoff between attempts inside [`run_and_retry`].
pub const RETRY_INTERVAL: Duration = Duration::from_secs(10);

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A step's work: receives a quit signal (sent on timeout) and the job
/// context. Actions must exit promptly once quit fires.
pub type Action =
    Arc<dyn Fn(watch::Receiver<bool>, JobContext) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;

/// Produces the compensating steps for a failed step, possibly against a
/// different request payload.
pub type RollbackFn =
    Arc<dyn Fn(JobContext) -> anyhow::Result<(JobContext, Vec<Step>)> + Send + Sync>;

/// One named, time-bounded unit of job execution.
#[derive(Clone)]
pub struct Step {
    pub name: String,
    pub timeout: Duration,
    pub action: Action,
    pub rollback: Option<RollbackFn>,
}

impl Step {
    pub fn new(name: &str, timeout: Duration, action: Action) -> Self {
        Self {
            name: name.to_string(),
            timeout,
            action,
            rollback: None,
        }
    }

    pub fn with_rollback(mut self, rollback: RollbackFn) -> Self {
        self.rollback = Some(rollback);
        self
    }
}

/// Lift an async closure into an [`Action`].
pub fn action<F, Fut>(f: F) -> Action
where
    F: Fn(watch::Receiver<bool>, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |quit, context| Box::pin(f(quit, context)))
}

/// Combine actions into one that runs them all concurrently and waits for
/// every one to finish. All failures are aggregated; one failing action
/// never cancels its siblings, so partial progress survives.
pub fn fold(actions: Vec<Action>) -> Action {
    Arc::new(move |quit, context| {
        let actions = actions.clone();
        Box::pin(async move {
            let mut set = JoinSet::new();
            for action in actions {
                let quit = quit.clone();
                let context = context.clone();
                set.spawn(async move { (action)(quit, context).await });
            }

            let mut errors = MultiError::new();
            while let Some(result) = set.join_next().await {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => errors.push(e),
                    Err(e) => errors.push(anyhow::anyhow!("action task failed: {e}")),
                }
            }

            errors.into_result()
        })
    })
}

/// Retry `f` with a fixed backoff until it succeeds or the quit signal
/// fires. Built for idempotent deletes against eventually-consistent
/// backends: transient failures are logged and retried, never escalated,
/// and only the step timeout (via quit) bounds the loop.
pub async fn run_and_retry<F, Fut>(
    quit: &mut watch::Receiver<bool>,
    interval: Duration,
    f: F,
) -> anyhow::Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    loop {
        if *quit.borrow() {
            return Err(JobError::QuitSignalled.into());
        }

        match f().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(error = %e, "operation failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = quit.changed() => return Err(JobError::QuitSignalled.into()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::testing::test_context;

    use super::*;

    #[tokio::test]
    async fn fold_runs_every_action() {
        let counter = Arc::new(AtomicUsize::new(0));

        let actions: Vec<Action> = (0..3)
            .map(|_| {
                let counter = counter.clone();
                action(move |_quit, _ctx| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
            })
            .collect();

        let (_tx, rx) = watch::channel(false);
        fold(actions)(rx, test_context()).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fold_aggregates_failures_and_preserves_progress() {
        let counter = Arc::new(AtomicUsize::new(0));

        let ok = |counter: Arc<AtomicUsize>| {
            action(move |_quit, _ctx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        let failing = |msg: &'static str| {
            action(move |_quit, _ctx| async move { Err(anyhow::anyhow!(msg)) })
        };

        let actions = vec![
            failing("first failure"),
            ok(counter.clone()),
            failing("second failure"),
        ];

        let (_tx, rx) = watch::channel(false);
        let err = fold(actions)(rx, test_context()).await.unwrap_err();

        // Both failures are reported and the good action still ran.
        let multi = err.downcast_ref::<MultiError>().unwrap();
        assert_eq!(multi.len(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_and_retry_retries_until_success() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let (_tx, mut rx) = watch::channel(false);

        let counter = attempts.clone();
        run_and_retry(&mut rx, Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("transient");
                }
                Ok(())
            }
        })
        .await
        .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn run_and_retry_stops_on_quit() {
        let (tx, mut rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            run_and_retry(&mut rx, Duration::from_secs(10), || async {
                anyhow::bail!("always failing")
            })
            .await
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        tx.send(true).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("quit signalled"));
    }

    #[tokio::test]
    async fn run_and_retry_honours_pre_signalled_quit() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let err = run_and_retry(&mut rx, Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap_err();

        assert!(err.to_string().contains("quit signalled"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
