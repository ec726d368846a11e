use super::types::{QueueError, QueuedTask, Task, TaskHandle};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Delayed, optionally recurring, task submission.
pub trait TaskQueue: Send + Sync {
    fn submit(
        &self,
        task: Task,
        delay: Duration,
        interval: Option<Duration>,
        id: Option<String>,
    ) -> Result<TaskHandle, QueueError>;

    /// Number of tasks still waiting to run, when the queue can tell.
    fn pending(&self) -> usize {
        0
    }
}

/// In-process queue: tokio timers feeding an mpsc channel.
///
/// Nothing survives a restart. An id stays reserved while its task waits,
/// and for the whole life of a recurring task.
#[derive(Clone)]
pub struct LocalTaskQueue {
    sender: mpsc::UnboundedSender<QueuedTask>,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl LocalTaskQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueuedTask>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = LocalTaskQueue {
            sender,
            pending: Arc::new(Mutex::new(HashSet::new())),
        };
        (queue, receiver)
    }

    pub fn pending_ids(&self) -> Vec<String> {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = pending.iter().cloned().collect();
        ids.sort();
        ids
    }
}

impl TaskQueue for LocalTaskQueue {
    fn submit(
        &self,
        task: Task,
        delay: Duration,
        interval: Option<Duration>,
        id: Option<String>,
    ) -> Result<TaskHandle, QueueError> {
        if self.sender.is_closed() {
            return Err(QueueError::Closed);
        }
        let id = id.unwrap_or_else(|| format!("{}_{}", task.name(), Uuid::new_v4().simple()));
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if !pending.insert(id.clone()) {
                return Err(QueueError::Duplicate(id));
            }
        }

        let handle = TaskHandle::new(id.clone(), delay, interval);
        let sender = self.sender.clone();
        let pending = self.pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            loop {
                if interval.is_none() {
                    pending
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&id);
                }
                let queued = QueuedTask {
                    id: id.clone(),
                    task: task.clone(),
                };
                if sender.send(queued).is_err() {
                    tracing::warn!(task_id = %id, "Worker gone, dropping task");
                    break;
                }
                match interval {
                    Some(every) => tokio::time::sleep(every).await,
                    None => break,
                }
            }
        });

        tracing::debug!(task_id = %handle.id, eta = %handle.eta, "Task scheduled");
        Ok(handle)
    }

    fn pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
