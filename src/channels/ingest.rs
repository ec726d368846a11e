use crate::models::channel::ChannelError;
use crate::models::video::NewVideo;
use crate::youtube::types::PlaylistItem;
use crate::youtube::{uploads_playlist_id, ContentApi};
use crate::DbPool;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use url::Url;

const VIDEO_ID_PREFIX: &str = "yt:video:";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchResult {
    pub new_item_count: usize,
    pub new_video_ids: Vec<String>,
}

/// Merge the channel's uploads listing into the local video set.
///
/// Pages until the listing runs out. Videos already stored are skipped, so a
/// second run over an unchanged feed reports nothing new.
pub async fn fetch_videos(
    pool: &DbPool,
    content: &dyn ContentApi,
    channel_id: &str,
) -> Result<FetchResult, ChannelError> {
    let playlist_id = uploads_playlist_id(channel_id);
    let mut result = FetchResult::default();
    let mut page_token: Option<String> = None;

    loop {
        let page = content
            .list_playlist_items(&playlist_id, page_token.as_deref())
            .await?;

        {
            let mut conn = pool.get()?;
            let now = Utc::now().timestamp();
            for item in &page.items {
                let Some(video) = new_video_from_item(channel_id, item, now) else {
                    tracing::debug!(channel_id, "Skipping playlist item without a video id");
                    continue;
                };
                if video.insert_if_not_present(&mut conn)? {
                    result.new_video_ids.push(video.id);
                }
            }
        }

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    result.new_item_count = result.new_video_ids.len();
    tracing::info!(
        channel_id,
        new_item_count = result.new_item_count,
        "Fetched channel videos"
    );
    Ok(result)
}

fn new_video_from_item(channel_id: &str, item: &PlaylistItem, now: i64) -> Option<NewVideo> {
    let video_id = item.video_id()?.to_string();
    let infos = json!({
        "title": item.snippet.title,
        "description": item.snippet.description,
        "published_at": item.snippet.published_at,
    });
    Some(NewVideo {
        id: video_id,
        channel_id: channel_id.to_string(),
        published_at: item.snippet.published_at.map(|p| p.timestamp()),
        infos: Some(infos.to_string()),
        created_at: now,
    })
}

/// A video announced by a hub notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotifiedVideo {
    pub video_id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notification {
    /// The feed's `rel="self"` link, the topic it was published under.
    pub self_link: Option<String>,
    pub videos: Vec<NotifiedVideo>,
}

/// Parse the Atom document a hub pushes.
pub fn parse_notification(body: &[u8]) -> Result<Notification, ChannelError> {
    let feed = feed_rs::parser::parse(body).map_err(|e| {
        ChannelError::upstream("hub", format!("unparseable notification payload: {}", e))
    })?;

    let self_link = feed
        .links
        .iter()
        .find(|link| link.rel.as_deref() == Some("self"))
        .map(|link| link.href.clone());

    let videos = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let video_id = entry.id.strip_prefix(VIDEO_ID_PREFIX)?.to_string();
            let link = entry
                .links
                .iter()
                .find(|l| l.rel.as_deref().unwrap_or("alternate") == "alternate")
                .map(|l| l.href.clone());
            Some(NotifiedVideo {
                video_id,
                title: entry.title.map(|t| t.content),
                link,
                published: entry.published.or(entry.updated),
            })
        })
        .collect();

    Ok(Notification { self_link, videos })
}

/// Whether a topic URL names the same feed, ignoring the scheme.
pub fn topic_matches(candidate: &str, topic: &Url) -> bool {
    match Url::parse(candidate) {
        Ok(url) => {
            url.host_str() == topic.host_str()
                && url.path() == topic.path()
                && url.query() == topic.query()
        }
        Err(_) => false,
    }
}

/// Store one notified video. Returns whether it was new.
pub fn store_notified_video(
    pool: &DbPool,
    channel_id: &str,
    video: &NotifiedVideo,
) -> Result<bool, ChannelError> {
    let infos = json!({
        "title": video.title,
        "link": video.link,
        "published_at": video.published,
    });
    let new_video = NewVideo {
        id: video.video_id.clone(),
        channel_id: channel_id.to_string(),
        published_at: video.published.map(|p| p.timestamp()),
        infos: Some(infos.to_string()),
        created_at: Utc::now().timestamp(),
    };
    let mut conn = pool.get()?;
    Ok(new_video.insert_if_not_present(&mut conn)?)
}
