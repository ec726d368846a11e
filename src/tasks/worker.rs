use super::types::{QueuedTask, Task};
use crate::channels::{ChannelService, RenewOutcome};
use crate::models::channel::ChannelError;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receive queued tasks and run each on its own tokio task.
pub async fn start(mut receiver: mpsc::UnboundedReceiver<QueuedTask>, service: Arc<ChannelService>) {
    while let Some(queued) = receiver.recv().await {
        let service = service.clone();
        tokio::spawn(async move {
            tracing::debug!(task_id = %queued.id, task = queued.task.name(), "Running task");
            run(&service, queued.task).await;
        });
    }
    tracing::info!("Task queue closed, worker stopping");
}

pub async fn run(service: &ChannelService, task: Task) {
    match task {
        Task::RenewChannels(channel_ids) => {
            for channel_id in channel_ids {
                renew_one(service, &channel_id).await;
            }
        }
        Task::FetchVideos(channel_ids) => {
            for channel_id in channel_ids {
                if let Err(e) = service.fetch_videos(&channel_id).await {
                    tracing::warn!(channel_id = %channel_id, "Video fetch failed: {}", e);
                }
            }
        }
        Task::RefreshHubInfo(channel_ids) => {
            for channel_id in channel_ids {
                if let Err(e) = service.refresh_hub_info(&channel_id).await {
                    tracing::warn!(channel_id = %channel_id, "Hub info refresh failed: {}", e);
                }
            }
        }
        Task::FetchAllVideos => match service.catch_up().await {
            Ok(new_items) => tracing::info!(new_items, "Catch-up fetch finished"),
            Err(e) => tracing::error!("Catch-up fetch failed: {}", e),
        },
    }
}

async fn renew_one(service: &ChannelService, channel_id: &str) {
    match service.renew(channel_id).await {
        Ok(RenewOutcome::Renewed(channel)) => {
            tracing::info!(channel_id, expiration = ?channel.expiration(), "Channel renewed")
        }
        Ok(_) => {}
        Err(e) if e.is_retryable() => {
            tracing::warn!(channel_id, "Renewal failed, retrying later: {}", e);
            service.orchestrator().schedule_retry(channel_id, Utc::now());
        }
        Err(ChannelError::InvalidAction(reason)) => {
            tracing::warn!(channel_id, "Renewal skipped: {}", reason)
        }
        Err(e) => tracing::error!(channel_id, "Renewal failed: {}", e),
    }
}
