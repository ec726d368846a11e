use super::hub_info::{HubInfo, VerificationState};
use crate::schema::*;
use crate::youtube::types::ChannelListResponse;
use chrono::{DateTime, TimeZone, Utc};
use diesel::prelude::*;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by channel lifecycle operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChannelError {
    /// Illegal state transition, e.g. activating an active channel.
    #[error("invalid action: {0}")]
    InvalidAction(String),
    /// The content API has never heard of this channel id.
    #[error("channel {0} doesn't exist")]
    UnknownChannel(String),
    #[error("channel {0} not found")]
    NotFound(String),
    #[error("{field} can not be set")]
    ReadOnlyField { field: String },
    #[error("{service} API error: {message}")]
    UpstreamApi { service: String, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("database error: {0}")]
    Database(String),
}

impl ChannelError {
    pub fn upstream(service: &str, message: impl Into<String>) -> Self {
        ChannelError::UpstreamApi {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// Whether the renewal scheduler should try again on its normal cadence.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChannelError::UpstreamApi { .. } | ChannelError::Network(_)
        )
    }

    pub fn is_invalid_action(&self) -> bool {
        matches!(
            self,
            ChannelError::InvalidAction(_) | ChannelError::UnknownChannel(_)
        )
    }
}

impl From<diesel::result::Error> for ChannelError {
    fn from(err: diesel::result::Error) -> Self {
        ChannelError::Database(err.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for ChannelError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        ChannelError::Database(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Row exists but metadata has never been fetched.
    Uninitialized,
    Active,
    Inactive,
}

/// Facts emitted by channel transitions, turned into queued work elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Created {
        channel_id: String,
    },
    Activated {
        channel_id: String,
        expiration: Option<DateTime<Utc>>,
    },
    Renewed {
        channel_id: String,
        expiration: Option<DateTime<Utc>>,
    },
    Deactivated {
        channel_id: String,
    },
    LeaseLapsed {
        channel_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable, Insertable, PartialEq)]
#[diesel(table_name = channels)]
pub struct Channel {
    pub id: String,
    pub name: Option<String>,
    pub active: bool,
    pub infos: Option<String>,
    hub_info: Option<HubInfo>,
    pub subscribe_timestamp: Option<i64>,
    pub unsubscribe_timestamp: Option<i64>,
    pub created_at: i64,
}

impl Channel {
    pub fn new(channel_id: &str, now: DateTime<Utc>) -> Self {
        Channel {
            id: channel_id.to_string(),
            name: None,
            active: false,
            infos: None,
            hub_info: None,
            subscribe_timestamp: None,
            unsubscribe_timestamp: None,
            created_at: now.timestamp(),
        }
    }

    pub fn state(&self) -> ChannelState {
        if self.active {
            ChannelState::Active
        } else if self.name.is_none() {
            ChannelState::Uninitialized
        } else {
            ChannelState::Inactive
        }
    }

    pub fn hub_info(&self) -> Option<&HubInfo> {
        self.hub_info.as_ref()
    }

    /// Lease expiration, derived from the last hub exchange.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.hub_info.as_ref().and_then(|info| info.expiration)
    }

    pub fn infos_json(&self) -> Option<serde_json::Value> {
        self.infos
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    pub fn subscribed_at(&self) -> Option<DateTime<Utc>> {
        self.subscribe_timestamp.and_then(from_unix)
    }

    pub fn unsubscribed_at(&self) -> Option<DateTime<Utc>> {
        self.unsubscribe_timestamp.and_then(from_unix)
    }

    /// Inactive because someone unsubscribed it, not because the lease ran out.
    pub fn was_deactivated(&self) -> bool {
        !self.active && self.unsubscribe_timestamp.is_some()
    }

    pub fn ensure_can_activate(&self) -> Result<(), ChannelError> {
        if self.active {
            return Err(ChannelError::InvalidAction(format!(
                "channel {} is already active",
                self.id
            )));
        }
        Ok(())
    }

    pub fn ensure_can_deactivate(&self) -> Result<(), ChannelError> {
        if !self.active {
            return Err(ChannelError::InvalidAction(format!(
                "channel {} is already inactive",
                self.id
            )));
        }
        Ok(())
    }

    /// Apply an accepted subscribe (or renewal) request.
    pub fn record_subscribed(
        &mut self,
        info: HubInfo,
        now: DateTime<Utc>,
    ) -> Result<ChannelEvent, ChannelError> {
        if !info.expires_after(now) {
            return Err(ChannelError::upstream(
                "hub",
                format!("subscription for {} carries no future lease", self.id),
            ));
        }
        let was_active = self.active;
        let expiration = info.expiration;
        self.active = true;
        self.subscribe_timestamp = Some(now.timestamp());
        self.hub_info = Some(info);

        let channel_id = self.id.clone();
        Ok(if was_active {
            ChannelEvent::Renewed {
                channel_id,
                expiration,
            }
        } else {
            ChannelEvent::Activated {
                channel_id,
                expiration,
            }
        })
    }

    pub fn record_unsubscribed(&mut self, now: DateTime<Utc>) -> ChannelEvent {
        self.active = false;
        self.unsubscribe_timestamp = Some(now.timestamp());
        ChannelEvent::Deactivated {
            channel_id: self.id.clone(),
        }
    }

    /// Replace the lease state with a freshly queried one.
    ///
    /// An active channel whose new lease is missing or already over is
    /// marked inactive in the same write.
    pub fn record_hub_info(&mut self, info: HubInfo, now: DateTime<Utc>) -> Option<ChannelEvent> {
        let lapsed = !info.expires_after(now);
        self.hub_info = Some(info);
        if self.active && lapsed {
            self.active = false;
            return Some(ChannelEvent::LeaseLapsed {
                channel_id: self.id.clone(),
            });
        }
        None
    }

    /// Mark an active channel whose lease ran out without renewal.
    pub fn lapse_if_expired(&mut self, now: DateTime<Utc>) -> Option<ChannelEvent> {
        let live = self
            .hub_info
            .as_ref()
            .map(|info| info.expires_after(now))
            .unwrap_or(false);
        if self.active && !live {
            self.active = false;
            return Some(ChannelEvent::LeaseLapsed {
                channel_id: self.id.clone(),
            });
        }
        None
    }

    /// Take display metadata from a content API channel listing.
    pub fn record_metadata(&mut self, listing: &ChannelListResponse) -> Result<(), ChannelError> {
        let item = match listing.items.first() {
            Some(item) if listing.page_info.total_results > 0 => item,
            _ => {
                if self.name.is_none() {
                    return Err(ChannelError::UnknownChannel(self.id.clone()));
                }
                return Err(ChannelError::upstream(
                    "YouTube",
                    format!("Unable to update channel <{}> info", self.id),
                ));
            }
        };

        let title = item
            .pointer("/snippet/title")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                ChannelError::upstream(
                    "YouTube",
                    format!("channel <{}> listing has no snippet title", self.id),
                )
            })?;

        self.name = Some(title.to_string());
        self.infos = Some(item.to_string());
        Ok(())
    }
}

fn from_unix(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}
