//! Steps for environment deletion. The request payload is the environment id.
//!
//! An environment cannot be torn down while its load balancers and services
//! still exist, so the pipeline first deletes both dependency kinds in
//! parallel, then retries the environment delete until the backend accepts
//! it.

use std::time::Duration;

use crate::step::{action, fold, run_and_retry, Action, Step, RETRY_INTERVAL};

pub fn delete_environment_steps() -> Vec<Step> {
    vec![
        Step::new(
            "Delete Dependencies",
            Duration::from_secs(15 * 60),
            fold(vec![
                delete_environment_load_balancers(),
                delete_environment_services(),
            ]),
        ),
        Step::new(
            "Delete Environment",
            Duration::from_secs(10 * 60),
            delete_environment_action(),
        ),
    ]
}

fn delete_environment_action() -> Action {
    action(|mut quit, context| async move {
        let environment_id = context.request().to_string();

        run_and_retry(&mut quit, RETRY_INTERVAL, || async {
            context.environments().delete_environment(&environment_id)
        })
        .await
    })
}

/// Delete every load balancer in the environment, in parallel. Each child
/// deletion runs against a re-requested context so all of them report
/// through the parent job.
fn delete_environment_load_balancers() -> Action {
    action(|quit, context| async move {
        let environment_id = context.request().to_string();
        let load_balancers = context.load_balancers().list_load_balancers()?;

        let actions: Vec<Action> = load_balancers
            .iter()
            .filter(|lb| lb.environment_id == environment_id)
            .map(|lb| {
                let child = context.with_request(&lb.load_balancer_id);
                let delete = crate::load_balancer::delete_load_balancer_action();
                action(move |quit, _ctx| {
                    let delete = delete.clone();
                    let child = child.clone();
                    async move { (delete)(quit, child).await }
                })
            })
            .collect();

        (fold(actions))(quit, context.clone()).await
    })
}

/// Delete every service in the environment, in parallel.
fn delete_environment_services() -> Action {
    action(|quit, context| async move {
        let environment_id = context.request().to_string();
        let services = context.services().list_services()?;

        let actions: Vec<Action> = services
            .iter()
            .filter(|s| s.environment_id == environment_id)
            .map(|s| {
                let child = context.with_request(&s.service_id);
                let delete = crate::service::delete_service_action();
                action(move |quit, _ctx| {
                    let delete = delete.clone();
                    let child = child.clone();
                    async move { (delete)(quit, child).await }
                })
            })
            .collect();

        (fold(actions))(quit, context.clone()).await
    })
}
