use actix_web::web;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct UserPath {
    pub user_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct UserChannelPath {
    pub user_id: i32,
    pub channel_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionCreate {
    pub channel_id: String,
    pub preferences: Option<serde_json::Value>,
}

pub type RqUserId = web::Path<UserPath>;
pub type RqUserChannel = web::Path<UserChannelPath>;
