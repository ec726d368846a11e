use crate::channels::renewal::SweepMode;
use crate::models::channel::{Channel, ChannelError, ChannelState};
use crate::models::hub_info::HubInfo;
use actix_web::web;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ChannelPath {
    pub channel_id: String,
}

pub type RqChannelPath = web::Path<ChannelPath>;

#[derive(Debug, Deserialize)]
pub struct ChannelCreate {
    pub channel_id: String,
}

/// Writable fields of a channel. The lease fields are only accepted so they
/// can be refused by name.
#[derive(Debug, Default, Deserialize)]
pub struct ChannelUpdate {
    pub active: Option<bool>,
    #[serde(default)]
    pub expiration: Option<serde_json::Value>,
    #[serde(default)]
    pub hub_info: Option<serde_json::Value>,
}

impl ChannelUpdate {
    pub fn reject_read_only(&self) -> Result<(), ChannelError> {
        let field = if self.expiration.is_some() {
            "expiration"
        } else if self.hub_info.is_some() {
            "hub_info"
        } else {
            return Ok(());
        };
        Err(ChannelError::ReadOnlyField {
            field: field.to_string(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RenewAllQuery {
    pub mode: Option<SweepMode>,
}

#[derive(Debug, Serialize)]
pub struct ChannelResponse {
    pub id: String,
    pub name: Option<String>,
    pub active: bool,
    pub state: ChannelState,
    pub expiration: Option<DateTime<Utc>>,
    pub subscribed_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub hub_info: Option<HubInfo>,
    pub infos: Option<serde_json::Value>,
    pub created_at: i64,
}

impl From<Channel> for ChannelResponse {
    fn from(channel: Channel) -> Self {
        ChannelResponse {
            state: channel.state(),
            expiration: channel.expiration(),
            subscribed_at: channel.subscribed_at(),
            unsubscribed_at: channel.unsubscribed_at(),
            hub_info: channel.hub_info().cloned(),
            infos: channel.infos_json(),
            id: channel.id,
            name: channel.name,
            active: channel.active,
            created_at: channel.created_at,
        }
    }
}
