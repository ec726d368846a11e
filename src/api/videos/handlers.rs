use actix_web::{get, HttpResponse};

use super::types::{RqVideoPath, VideoResponse};
use crate::{
    errors::{AppError, AppResult},
    models::{callback::Callback, video::Video},
    RqDbPool,
};

#[get("/{video_id}")]
pub async fn get_video(pool: RqDbPool, path: RqVideoPath) -> AppResult<HttpResponse> {
    let mut conn = pool.get().map_err(|_| AppError::ConnectionPoolError)?;

    let video = Video::get_by_id(&mut conn, &path.video_id)?
        .ok_or_else(|| AppError::resource_not_found("Video"))?;
    let stats = Callback::notification_stats(&mut conn, &video.id)?;

    Ok(HttpResponse::Ok().json(VideoResponse::new(video, stats)))
}
