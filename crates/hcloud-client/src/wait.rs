//! Polling of asynchronous actions

use crate::error::HcloudError;
use crate::hcloud_trait::HcloudClientTrait;
use crate::models::{Action, ActionStatus};
use std::time::Duration;
use tracing::debug;

/// Poll `action` until it leaves the running state.
///
/// Returns the finished action, or `HcloudError::Action` if it ended in
/// error or was still running after `timeout`.
pub async fn wait_for_action<C: HcloudClientTrait + ?Sized>(
    client: &C,
    action: Action,
    interval: Duration,
    timeout: Duration,
) -> Result<Action, HcloudError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut current = action;

    loop {
        match current.status {
            ActionStatus::Success => return Ok(current),
            ActionStatus::Error => {
                let message = current
                    .error
                    .as_ref()
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .unwrap_or_else(|| "unknown error".to_string());
                return Err(HcloudError::Action {
                    id: current.id,
                    message,
                });
            }
            ActionStatus::Running => {}
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(HcloudError::Action {
                id: current.id,
                message: format!("{} still running after {:?}", current.command, timeout),
            });
        }

        debug!("Action {} ({}) at {}%", current.id, current.command, current.progress);
        tokio::time::sleep(interval).await;
        current = client.get_action(current.id).await?;
    }
}
