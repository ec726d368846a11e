pub mod client;
pub mod types;

pub use client::{uploads_playlist_id, ContentApi, ContentApiError, YouTubeDataApi};
