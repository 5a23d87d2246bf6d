//! Steps for load balancer jobs. The request payload is the load balancer id.

use std::time::Duration;

use crate::step::{action, run_and_retry, Action, Step, RETRY_INTERVAL};

pub fn delete_load_balancer_steps() -> Vec<Step> {
    vec![Step::new(
        "Delete Load Balancer",
        Duration::from_secs(10 * 60),
        delete_load_balancer_action(),
    )]
}

pub(crate) fn delete_load_balancer_action() -> Action {
    action(|mut quit, context| async move {
        let load_balancer_id = context.request().to_string();

        run_and_retry(&mut quit, RETRY_INTERVAL, || async {
            context
                .load_balancers()
                .delete_load_balancer(&load_balancer_id)
        })
        .await
    })
}
