use super::queue::TaskQueue;
use super::types::{QueueError, Task};
use crate::channels::renewal::{apply_jitter, renewal_delay, renewal_task_id, RenewalPolicy};
use crate::models::channel::ChannelEvent;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Turns channel events into queued work.
#[derive(Clone)]
pub struct EventOrchestrator {
    queue: Arc<dyn TaskQueue>,
    policy: RenewalPolicy,
    hub_info_delay: Duration,
}

impl EventOrchestrator {
    pub fn new(queue: Arc<dyn TaskQueue>, policy: RenewalPolicy, hub_info_delay: Duration) -> Self {
        EventOrchestrator {
            queue,
            policy,
            hub_info_delay,
        }
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    pub fn policy(&self) -> &RenewalPolicy {
        &self.policy
    }

    pub fn dispatch(&self, event: &ChannelEvent, now: DateTime<Utc>) {
        match event {
            ChannelEvent::Created { channel_id } => {
                self.submit(
                    Task::RefreshHubInfo(vec![channel_id.clone()]),
                    self.hub_info_delay,
                    None,
                );
                self.submit(Task::FetchVideos(vec![channel_id.clone()]), Duration::ZERO, None);
                self.schedule_renewal(channel_id, None, now);
            }
            ChannelEvent::Activated {
                channel_id,
                expiration,
            }
            | ChannelEvent::Renewed {
                channel_id,
                expiration,
            } => self.schedule_renewal(channel_id, *expiration, now),
            ChannelEvent::LeaseLapsed { channel_id } => {
                tracing::warn!(channel_id = %channel_id, "Lease lapsed, renewing now");
                self.submit(
                    Task::RenewChannels(vec![channel_id.clone()]),
                    Duration::ZERO,
                    Some(format!("renew_{}_lapsed_{}", channel_id, now.timestamp())),
                );
            }
            ChannelEvent::Deactivated { channel_id } => {
                tracing::info!(channel_id = %channel_id, "Channel deactivated, no renewal scheduled");
            }
        }
    }

    /// Queue the next renewal derived from a lease expiration.
    ///
    /// Without an expiration the renewal runs after the policy's default
    /// delay. A renewal already waiting for the channel is kept.
    pub fn schedule_renewal(
        &self,
        channel_id: &str,
        expiration: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        let mut delay = renewal_delay(expiration, now, &self.policy);
        if self.policy.jitter_single {
            delay = apply_jitter(delay, &mut rand::thread_rng());
        }
        self.submit(
            Task::RenewChannels(vec![channel_id.to_string()]),
            delay,
            Some(renewal_task_id(channel_id)),
        );
    }

    /// Retry a renewal that failed for an upstream reason.
    pub fn schedule_retry(&self, channel_id: &str, now: DateTime<Utc>) {
        let eta = now
            + chrono::Duration::from_std(self.policy.retry_delay)
                .unwrap_or_else(|_| chrono::Duration::zero());
        self.submit(
            Task::RenewChannels(vec![channel_id.to_string()]),
            self.policy.retry_delay,
            Some(format!("retry_renew_{}_{}", channel_id, eta.timestamp())),
        );
    }

    fn submit(&self, task: Task, delay: Duration, id: Option<String>) {
        let name = task.name();
        match self.queue.submit(task, delay, None, id) {
            Ok(handle) => {
                tracing::debug!(task = name, task_id = %handle.id, eta = %handle.eta, "Queued")
            }
            Err(QueueError::Duplicate(id)) => {
                tracing::debug!(task = name, task_id = %id, "Already queued")
            }
            Err(e) => tracing::error!(task = name, "Could not queue task: {}", e),
        }
    }
}
