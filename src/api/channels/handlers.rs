use actix_web::{delete, get, patch, post, web, HttpResponse};

use super::types::{ChannelCreate, ChannelResponse, ChannelUpdate, RenewAllQuery, RqChannelPath};
use crate::{
    channels::{renewal::SweepMode, ChannelService},
    errors::{AppError, AppResult},
    models::{callback::Callback, video::Video},
    RqDbPool,
};

const CHANNEL_CALLBACK_LIMIT: i64 = 50;

#[get("")]
pub async fn list_channels(service: web::Data<ChannelService>) -> AppResult<HttpResponse> {
    let channels: Vec<ChannelResponse> = service
        .repository()
        .all()?
        .into_iter()
        .map(ChannelResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(channels))
}

#[post("")]
pub async fn create_channel(
    service: web::Data<ChannelService>,
    req: web::Json<ChannelCreate>,
) -> AppResult<HttpResponse> {
    let channel = service.get_or_create(&req.channel_id).await?;
    Ok(HttpResponse::Created().json(ChannelResponse::from(channel)))
}

#[post("/renew-all")]
pub async fn renew_all(
    service: web::Data<ChannelService>,
    query: web::Query<RenewAllQuery>,
) -> AppResult<HttpResponse> {
    let mode = query.mode.unwrap_or(SweepMode::Scheduled);
    let handles = service.renew_all(mode)?;
    Ok(HttpResponse::Accepted().json(handles))
}

#[get("/{channel_id}")]
pub async fn get_channel(
    service: web::Data<ChannelService>,
    path: RqChannelPath,
) -> AppResult<HttpResponse> {
    let channel = service.repository().get(&path.channel_id)?;
    Ok(HttpResponse::Ok().json(ChannelResponse::from(channel)))
}

#[patch("/{channel_id}")]
pub async fn update_channel(
    service: web::Data<ChannelService>,
    path: RqChannelPath,
    update: web::Json<ChannelUpdate>,
) -> AppResult<HttpResponse> {
    update.reject_read_only()?;
    let channel_id = &path.channel_id;

    let channel = match update.active {
        Some(true) => service.activate(channel_id).await?,
        Some(false) => service.deactivate(channel_id).await?,
        None => service.repository().get(channel_id)?,
    };
    Ok(HttpResponse::Ok().json(ChannelResponse::from(channel)))
}

#[delete("/{channel_id}")]
pub async fn delete_channel(
    service: web::Data<ChannelService>,
    path: RqChannelPath,
) -> AppResult<HttpResponse> {
    service.delete_channel(&path.channel_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Ask the hub for the current lease details.
#[post("/{channel_id}/status")]
pub async fn refresh_status(
    service: web::Data<ChannelService>,
    path: RqChannelPath,
) -> AppResult<HttpResponse> {
    let channel = service.refresh_hub_info(&path.channel_id).await?;
    Ok(HttpResponse::Ok().json(ChannelResponse::from(channel)))
}

#[post("/{channel_id}/metadata")]
pub async fn refresh_metadata(
    service: web::Data<ChannelService>,
    path: RqChannelPath,
) -> AppResult<HttpResponse> {
    let channel = service.refresh_metadata(&path.channel_id).await?;
    Ok(HttpResponse::Ok().json(ChannelResponse::from(channel)))
}

#[post("/{channel_id}/fetch-videos")]
pub async fn fetch_videos(
    service: web::Data<ChannelService>,
    path: RqChannelPath,
) -> AppResult<HttpResponse> {
    let result = service.fetch_videos(&path.channel_id).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[get("/{channel_id}/callbacks")]
pub async fn channel_callbacks(
    pool: RqDbPool,
    service: web::Data<ChannelService>,
    path: RqChannelPath,
) -> AppResult<HttpResponse> {
    service.repository().get(&path.channel_id)?;
    let mut conn = pool.get().map_err(|_| AppError::ConnectionPoolError)?;
    let callbacks = Callback::get_for_channel(&mut conn, &path.channel_id, CHANNEL_CALLBACK_LIMIT)?;
    Ok(HttpResponse::Ok().json(callbacks))
}

#[get("/{channel_id}/videos")]
pub async fn channel_videos(
    pool: RqDbPool,
    service: web::Data<ChannelService>,
    path: RqChannelPath,
) -> AppResult<HttpResponse> {
    service.repository().get(&path.channel_id)?;
    let mut conn = pool.get().map_err(|_| AppError::ConnectionPoolError)?;
    let videos = Video::get_by_channel(&mut conn, &path.channel_id)?;
    Ok(HttpResponse::Ok().json(videos))
}
