use actix_web::{delete, get, post, web, HttpResponse};

use super::types::{RqUserChannel, RqUserId, SubscriptionCreate};
use crate::{
    channels::ChannelService,
    errors::{AppError, AppResult},
    models::subscription::Subscription,
    RqDbPool,
};

#[get("")]
pub async fn get_all_subscriptions(pool: RqDbPool, path: RqUserId) -> AppResult<HttpResponse> {
    let mut conn = pool.get().map_err(|_| AppError::ConnectionPoolError)?;
    let subscriptions = Subscription::get_for_user(&mut conn, path.user_id)?;
    Ok(HttpResponse::Ok().json(subscriptions))
}

/// Subscribe a user to a channel, creating the channel on first reference.
#[post("")]
pub async fn create_subscription(
    service: web::Data<ChannelService>,
    path: RqUserId,
    req: web::Json<SubscriptionCreate>,
) -> AppResult<HttpResponse> {
    let req = req.into_inner();
    if let Some(preferences) = &req.preferences {
        if !preferences.is_object() {
            return Err(AppError::invalid_input("preferences", "Must be a JSON object"));
        }
    }
    let subscription = service
        .subscribe_user(path.user_id, &req.channel_id, req.preferences)
        .await?;
    Ok(HttpResponse::Created().json(subscription))
}

#[get("/{channel_id}")]
pub async fn get_subscription(pool: RqDbPool, path: RqUserChannel) -> AppResult<HttpResponse> {
    let mut conn = pool.get().map_err(|_| AppError::ConnectionPoolError)?;
    let subscription = Subscription::get_for_user_and_channel(&mut conn, path.user_id, &path.channel_id)?
        .ok_or_else(|| AppError::resource_not_found("Subscription"))?;
    Ok(HttpResponse::Ok().json(subscription))
}

#[delete("/{channel_id}")]
pub async fn delete_subscription(
    service: web::Data<ChannelService>,
    path: RqUserChannel,
) -> AppResult<HttpResponse> {
    service
        .unsubscribe_user(path.user_id, &path.channel_id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
