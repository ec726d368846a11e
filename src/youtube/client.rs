use super::types::{ApiErrorResponse, ChannelListResponse, PlaylistItemPage};
use crate::config::ContentSettings;
use crate::models::channel::ChannelError;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Largest page the Data API hands out for list calls.
pub const MAX_PAGE_SIZE: u32 = 50;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const TOTAL_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("tubee/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ContentApiError {
    #[error("YouTube API returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected YouTube API payload: {0}")]
    Decode(String),
    #[error("request to YouTube API failed: {0}")]
    Network(String),
}

impl From<ContentApiError> for ChannelError {
    fn from(err: ContentApiError) -> Self {
        match err {
            ContentApiError::Network(message) => ChannelError::Network(message),
            other => ChannelError::upstream("YouTube", other.to_string()),
        }
    }
}

/// Read side of the content platform.
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn list_channels(&self, channel_id: &str) -> Result<ChannelListResponse, ContentApiError>;

    async fn list_playlist_items(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<PlaylistItemPage, ContentApiError>;
}

/// Uploads playlist of a channel: `UCxxxx` becomes `UUxxxx`.
pub fn uploads_playlist_id(channel_id: &str) -> String {
    match channel_id.strip_prefix("UC") {
        Some(rest) => format!("UU{}", rest),
        None => channel_id.to_string(),
    }
}

/// YouTube Data API v3 over HTTP.
pub struct YouTubeDataApi {
    client: Client,
    settings: ContentSettings,
}

impl YouTubeDataApi {
    pub fn new(settings: ContentSettings) -> Result<Self, ContentApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ContentApiError::Network(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self, resource: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.settings.api_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(resource);
        }
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("key", &self.settings.api_key);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ContentApiError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ContentApiError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ContentApiError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            return Err(ContentApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| ContentApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ContentApi for YouTubeDataApi {
    async fn list_channels(&self, channel_id: &str) -> Result<ChannelListResponse, ContentApiError> {
        let url = self.endpoint(
            "channels",
            &[
                ("part", "snippet,contentDetails,statistics"),
                ("id", channel_id),
            ],
        );
        tracing::debug!(channel_id, "Listing channel");
        self.get_json(url).await
    }

    async fn list_playlist_items(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<PlaylistItemPage, ContentApiError> {
        let max_results = MAX_PAGE_SIZE.to_string();
        let mut params = vec![
            ("part", "snippet"),
            ("playlistId", playlist_id),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        let url = self.endpoint("playlistItems", &params);
        tracing::debug!(playlist_id, page_token, "Listing playlist items");
        self.get_json(url).await
    }
}
