//! Steps for service jobs. The request payload is the service id.

use std::time::Duration;

use crate::step::{action, run_and_retry, Action, Step, RETRY_INTERVAL};

pub fn delete_service_steps() -> Vec<Step> {
    vec![Step::new(
        "Delete Service",
        Duration::from_secs(10 * 60),
        delete_service_action(),
    )]
}

pub(crate) fn delete_service_action() -> Action {
    action(|mut quit, context| async move {
        let service_id = context.request().to_string();

        run_and_retry(&mut quit, RETRY_INTERVAL, || async {
            context.services().delete_service(&service_id)
        })
        .await
    })
}
