use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Units of background work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "channel_ids", rename_all = "snake_case")]
pub enum Task {
    /// Refresh metadata then resubscribe each channel.
    RenewChannels(Vec<String>),
    FetchVideos(Vec<String>),
    RefreshHubInfo(Vec<String>),
    /// Catch-up fetch over every active channel.
    FetchAllVideos,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::RenewChannels(_) => "renew_channels",
            Task::FetchVideos(_) => "fetch_videos",
            Task::RefreshHubInfo(_) => "refresh_hub_info",
            Task::FetchAllVideos => "fetch_all_videos",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskHandle {
    pub id: String,
    pub eta: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
}

impl TaskHandle {
    pub fn new(id: String, delay: Duration, interval: Option<Duration>) -> Self {
        let eta = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or_else(Utc::now);
        TaskHandle {
            id,
            eta,
            interval_secs: interval.map(|i| i.as_secs()),
        }
    }
}

/// A task delivered to the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTask {
    pub id: String,
    pub task: Task,
}

#[derive(Debug, Error, PartialEq)]
pub enum QueueError {
    #[error("task {0} is already scheduled")]
    Duplicate(String),
    #[error("task queue is shut down")]
    Closed,
}
