use crate::channels::renewal::RenewalPolicy;
use crate::channels::ChannelService;
use crate::config::HubSettings;
use crate::db::MIGRATIONS;
use crate::hub::{HubClient, HubError, HubResponse};
use crate::models::hub_info::HubInfo;
use crate::tasks::orchestrator::EventOrchestrator;
use crate::tasks::queue::TaskQueue;
use crate::tasks::types::{QueueError, Task, TaskHandle};
use crate::youtube::types::{
    ChannelListResponse, PageInfo, PlaylistItem, PlaylistItemPage, PlaylistItemSnippet, ResourceId,
};
use crate::youtube::{ContentApi, ContentApiError};
use crate::DbPool;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::MigrationHarness;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

/// Create a test database with a temporary file
pub fn create_test_db() -> (TempDir, DbPool) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let manager = ConnectionManager::<SqliteConnection>::new(db_path.display().to_string());
    let pool = r2d2::Pool::builder()
        .max_size(4)
        .build(manager)
        .expect("Failed to create pool");

    let mut conn = pool.get().expect("Failed to get connection");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run migrations");

    (temp_dir, pool)
}

/// Create an in-memory test database connection
pub fn get_test_db_connection() -> SqliteConnection {
    let mut conn = SqliteConnection::establish(":memory:")
        .unwrap_or_else(|_| panic!("Error connecting to in-memory SQLite database"));

    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run migrations");
    conn
}

pub fn test_hub_settings() -> HubSettings {
    HubSettings {
        hub_url: Url::parse("https://hub.example.com/subscribe").unwrap(),
        details_url: Url::parse("https://hub.example.com/subscription-details").unwrap(),
        server_url: Url::parse("https://tubee.example.com").unwrap(),
        topic_base_url: Url::parse("https://www.youtube.com/xml/feeds/videos.xml").unwrap(),
        lease_seconds: 432_000,
        secret: None,
    }
}

/// Hub double that counts calls and answers with a configurable status.
pub struct FakeHub {
    status: Mutex<Option<u16>>,
    details: Mutex<Option<HubInfo>>,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    details_calls: AtomicUsize,
}

impl Default for FakeHub {
    fn default() -> Self {
        FakeHub {
            status: Mutex::new(Some(202)),
            details: Mutex::new(None),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
            details_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeHub {
    /// `None` simulates a transport failure.
    pub fn set_status(&self, status: Option<u16>) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_details(&self, info: HubInfo) {
        *self.details.lock().unwrap() = Some(info);
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    pub fn details_count(&self) -> usize {
        self.details_calls.load(Ordering::SeqCst)
    }

    fn respond(&self) -> HubResponse {
        match *self.status.lock().unwrap() {
            Some(status) => HubResponse::from_status(status, String::new()),
            None => HubResponse::transport_failure("connection refused".to_string()),
        }
    }
}

#[async_trait]
impl HubClient for FakeHub {
    async fn subscribe(&self, _: &Url, _: &Url, _: Option<i64>) -> HubResponse {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.respond()
    }

    async fn unsubscribe(&self, _: &Url, _: &Url) -> HubResponse {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.respond()
    }

    async fn query_details(&self, _: &Url, _: &Url) -> Result<HubInfo, HubError> {
        self.details_calls.fetch_add(1, Ordering::SeqCst);
        match self.details.lock().unwrap().clone() {
            Some(info) => Ok(info),
            None => Err(HubError::Status(404)),
        }
    }
}

/// Content API double backed by in-memory channels and playlist pages.
#[derive(Default)]
pub struct FakeContentApi {
    channels: Mutex<HashMap<String, String>>,
    playlists: Mutex<HashMap<String, Vec<Vec<String>>>>,
    pub playlist_calls: AtomicUsize,
}

impl FakeContentApi {
    pub fn add_channel(&self, channel_id: &str, title: &str) {
        self.channels
            .lock()
            .unwrap()
            .insert(channel_id.to_string(), title.to_string());
    }

    pub fn remove_channel(&self, channel_id: &str) {
        self.channels.lock().unwrap().remove(channel_id);
    }

    /// Pages of video ids for a playlist.
    pub fn set_playlist(&self, playlist_id: &str, pages: &[&[&str]]) {
        let pages = pages
            .iter()
            .map(|page| page.iter().map(|id| id.to_string()).collect())
            .collect();
        self.playlists
            .lock()
            .unwrap()
            .insert(playlist_id.to_string(), pages);
    }
}

#[async_trait]
impl ContentApi for FakeContentApi {
    async fn list_channels(&self, channel_id: &str) -> Result<ChannelListResponse, ContentApiError> {
        let items: Vec<serde_json::Value> = self
            .channels
            .lock()
            .unwrap()
            .get(channel_id)
            .map(|title| {
                vec![serde_json::json!({"id": channel_id, "snippet": {"title": title}})]
            })
            .unwrap_or_default();
        Ok(ChannelListResponse {
            page_info: PageInfo {
                total_results: items.len() as u32,
            },
            items,
        })
    }

    async fn list_playlist_items(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<PlaylistItemPage, ContentApiError> {
        self.playlist_calls.fetch_add(1, Ordering::SeqCst);
        let playlists = self.playlists.lock().unwrap();
        let pages = match playlists.get(playlist_id) {
            Some(pages) => pages,
            None => {
                return Err(ContentApiError::Status {
                    status: 404,
                    message: "playlistNotFound".to_string(),
                })
            }
        };
        let index: usize = page_token
            .and_then(|t| t.strip_prefix("page-"))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        let items = pages
            .get(index)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|video_id| PlaylistItem {
                snippet: PlaylistItemSnippet {
                    published_at: None,
                    title: Some(format!("Video {}", video_id)),
                    description: None,
                    resource_id: ResourceId {
                        video_id: Some(video_id),
                    },
                },
            })
            .collect();
        let next_page_token = if index + 1 < pages.len() {
            Some(format!("page-{}", index + 1))
        } else {
            None
        };
        Ok(PlaylistItemPage {
            next_page_token,
            items,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedTask {
    pub task: Task,
    pub delay: Duration,
    pub interval: Option<Duration>,
    pub id: Option<String>,
}

/// Queue double that records submissions.
///
/// Like the local queue it refuses an id that is already waiting; `clear`
/// stands in for every recorded task having run.
#[derive(Default)]
pub struct RecordingQueue {
    submitted: Mutex<Vec<SubmittedTask>>,
}

impl RecordingQueue {
    pub fn submitted(&self) -> Vec<SubmittedTask> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.submitted.lock().unwrap().clear();
    }
}

impl TaskQueue for RecordingQueue {
    fn submit(
        &self,
        task: Task,
        delay: Duration,
        interval: Option<Duration>,
        id: Option<String>,
    ) -> Result<TaskHandle, QueueError> {
        let handle_id = id.clone().unwrap_or_else(|| task.name().to_string());
        let mut submitted = self.submitted.lock().unwrap();
        if id.is_some() && submitted.iter().any(|s| s.id == id) {
            return Err(QueueError::Duplicate(handle_id));
        }
        submitted.push(SubmittedTask {
            task,
            delay,
            interval,
            id,
        });
        Ok(TaskHandle::new(handle_id, delay, interval))
    }
}

pub struct TestContext {
    pub _dir: TempDir,
    pub pool: DbPool,
    pub hub: Arc<FakeHub>,
    pub content: Arc<FakeContentApi>,
    pub queue: Arc<RecordingQueue>,
    pub service: ChannelService,
}

pub fn test_context() -> TestContext {
    test_context_with(test_hub_settings())
}

pub fn test_context_with(settings: HubSettings) -> TestContext {
    let (dir, pool) = create_test_db();
    let hub = Arc::new(FakeHub::default());
    let content = Arc::new(FakeContentApi::default());
    let queue = Arc::new(RecordingQueue::default());
    let orchestrator = EventOrchestrator::new(
        queue.clone(),
        RenewalPolicy::default(),
        Duration::from_secs(60),
    );
    let service = ChannelService::new(
        pool.clone(),
        hub.clone(),
        content.clone(),
        orchestrator,
        settings,
    );
    TestContext {
        _dir: dir,
        pool,
        hub,
        content,
        queue,
        service,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_db() {
        let (_temp_dir, pool) = create_test_db();
        let mut conn = pool.get().expect("Failed to get connection");
        let count: i64 = crate::schema::channels::table
            .count()
            .get_result(&mut conn)
            .expect("Failed to query test database");
        assert_eq!(count, 0);
    }
}
