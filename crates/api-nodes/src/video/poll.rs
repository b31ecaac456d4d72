//! Status polling for submitted jobs

use super::api::{TaskStatus, VideoApi};
use crate::error::{ApiNodeError, Result};
use std::time::Duration;

/// How often and how long to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep before every status query
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 150,
        }
    }
}

/// Poll `task_id` until it succeeds, fails or the policy runs out
///
/// Unknown statuses and failed queries count as attempts and are retried.
pub async fn wait_for_video(
    api: &dyn VideoApi,
    api_key: &str,
    task_id: &str,
    policy: PollPolicy,
) -> Result<String> {
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;

        match api.status(api_key, task_id).await {
            Ok(TaskStatus::Succeeded { video_url }) => {
                tracing::info!(task_id, attempt, "Video generation finished");
                return Ok(video_url);
            }
            Ok(TaskStatus::Failed { reason }) => {
                tracing::warn!(task_id, attempt, reason = %reason, "Video generation failed");
                return Err(ApiNodeError::GenerationFailed(reason));
            }
            Ok(TaskStatus::Pending(status)) => {
                tracing::debug!(task_id, attempt, status = %status, "Video generation pending");
            }
            Err(e) => {
                tracing::debug!(task_id, attempt, error = %e, "Status query failed, retrying");
            }
        }
    }

    tracing::warn!(task_id, attempts = policy.max_attempts, "Video generation timed out");
    Err(ApiNodeError::Timeout)
}
