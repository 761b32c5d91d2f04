//! Waiting on asynchronous actions

use std::time::Duration;

use reef_core::provider::{ErrorKind, ProviderError, ProviderResult};
use reef_core::waiter::StateChangeConf;
use tokio_util::sync::CancellationToken;

use crate::api::Client;
use crate::api::actions::{Action, STATUS_COMPLETED, STATUS_ERRORED, STATUS_IN_PROGRESS, STATUS_NEW};

/// Default timeout for assign/unassign and droplet actions
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Poll an action until it is `completed`.
///
/// `errored` fails immediately with the action id in the message.
pub async fn wait_for_action(
    client: &Client,
    cancel: &CancellationToken,
    action: &Action,
    timeout: Duration,
) -> ProviderResult<Action> {
    let id = action.id;
    log::debug!("Waiting for action {id} ({}) to complete", action.action_type);

    let conf = StateChangeConf::new(&[STATUS_NEW, STATUS_IN_PROGRESS, STATUS_ERRORED], &[STATUS_COMPLETED], timeout)
        .with_min_timeout(Duration::from_secs(3));
    let completed = conf
        .wait_for_state(cancel, || async move {
            let action = client.get_action(id).await?;
            if action.status == STATUS_ERRORED {
                return Err(ProviderError::new(
                    ErrorKind::Api,
                    format!("action {id} ({}) errored", action.action_type),
                ));
            }
            let status = action.status.clone();
            Ok(Some((action, status)))
        })
        .await
        .map_err(|e| e.with_context(format!("error waiting for action {id}")))?;

    completed.ok_or_else(|| ProviderError::internal(format!("action {id} disappeared")))
}
