use crate::models::{callback::NotificationStats, video::Video};
use actix_web::web;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct VideoPath {
    pub video_id: String,
}

pub type RqVideoPath = web::Path<VideoPath>;

#[derive(Debug, Serialize)]
pub struct VideoResponse {
    pub id: String,
    pub channel_id: String,
    pub published_at: Option<i64>,
    pub infos: Option<serde_json::Value>,
    pub created_at: i64,
    pub notifications: NotificationStats,
}

impl VideoResponse {
    pub fn new(video: Video, notifications: NotificationStats) -> Self {
        VideoResponse {
            infos: video.infos_json(),
            id: video.id,
            channel_id: video.channel_id,
            published_at: video.published_at,
            created_at: video.created_at,
            notifications,
        }
    }
}
