use std::{env, str::FromStr, time::Duration};

use thiserror::Error;
use url::Url;

use crate::channels::renewal::RenewalPolicy;

const DEFAULT_HUB_URL: &str = "https://pubsubhubbub.appspot.com/subscribe";
const DEFAULT_HUB_DETAILS_URL: &str = "https://pubsubhubbub.appspot.com/subscription-details";
const DEFAULT_TOPIC_BASE_URL: &str = "https://www.youtube.com/xml/feeds/videos.xml";
const DEFAULT_YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3";
/// Five days, the lease most hubs grant by default.
const DEFAULT_LEASE_SECONDS: i64 = 432_000;
/// Ten years.
pub const MAX_LEASE_SECONDS: i64 = 315_360_000;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Hub endpoints and the URLs this service registers with them.
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub hub_url: Url,
    pub details_url: Url,
    pub server_url: Url,
    pub topic_base_url: Url,
    pub lease_seconds: i64,
    pub secret: Option<String>,
}

impl HubSettings {
    /// Inbound webhook endpoint for a channel.
    pub fn callback_url(&self, channel_id: &str) -> Url {
        let mut url = self.server_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "hub", "callback", channel_id]);
        }
        url
    }

    /// Feed resource the hub publishes for a channel.
    pub fn topic_url(&self, channel_id: &str) -> Url {
        let mut url = self.topic_base_url.clone();
        url.query_pairs_mut().append_pair("channel_id", channel_id);
        url
    }
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub api_url: Url,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub bind_address: String,
    pub port: u16,
    pub hub: HubSettings,
    pub content: ContentSettings,
    pub renewal: RenewalPolicy,
    pub hub_info_delay: Duration,
    pub catchup_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("TUBEE_DATABASE_URL").unwrap_or_else(|| "tubee.db".to_string());
        log::info!("Using database path: {}", db_path);

        let bind_address =
            lookup("TUBEE_BIND_ADDRESS").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&lookup, "TUBEE_PORT", 8080u16)?;

        let server_url = url_or(
            &lookup,
            "TUBEE_SERVER_URL",
            &format!("http://{}:{}", bind_address, port),
        )?;
        if server_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                key: "TUBEE_SERVER_URL",
                value: server_url.to_string(),
            });
        }
        log::info!("Using public server URL: {}", server_url);

        let hub = HubSettings {
            hub_url: url_or(&lookup, "TUBEE_HUB_URL", DEFAULT_HUB_URL)?,
            details_url: url_or(&lookup, "TUBEE_HUB_DETAILS_URL", DEFAULT_HUB_DETAILS_URL)?,
            server_url,
            topic_base_url: url_or(&lookup, "TUBEE_TOPIC_BASE_URL", DEFAULT_TOPIC_BASE_URL)?,
            lease_seconds: parse_or(&lookup, "TUBEE_HUB_LEASE_SECONDS", DEFAULT_LEASE_SECONDS)?,
            secret: lookup("TUBEE_HUB_SECRET").filter(|s| !s.is_empty()),
        };
        if hub.lease_seconds <= 0 || hub.lease_seconds > MAX_LEASE_SECONDS {
            return Err(ConfigError::Invalid {
                key: "TUBEE_HUB_LEASE_SECONDS",
                value: hub.lease_seconds.to_string(),
            });
        }

        let content = ContentSettings {
            api_url: url_or(&lookup, "TUBEE_YOUTUBE_API_URL", DEFAULT_YOUTUBE_API_URL)?,
            api_key: lookup("TUBEE_YOUTUBE_API_KEY")
                .filter(|s| !s.is_empty())
                .ok_or(ConfigError::Missing("TUBEE_YOUTUBE_API_KEY"))?,
        };

        let renewal = RenewalPolicy {
            margin: secs(parse_or(&lookup, "TUBEE_RENEWAL_MARGIN_SECS", 86_400u64)?),
            default_delay: secs(parse_or(&lookup, "TUBEE_RENEWAL_DEFAULT_DELAY_SECS", 60u64)?),
            retry_delay: secs(parse_or(&lookup, "TUBEE_RENEWAL_RETRY_SECS", 3_600u64)?),
            jitter_single: parse_or(&lookup, "TUBEE_JITTER_SINGLE_RENEWALS", false)?,
        };

        Ok(AppConfig {
            db_path,
            bind_address,
            port,
            hub,
            content,
            renewal,
            hub_info_delay: secs(parse_or(&lookup, "TUBEE_HUB_INFO_DELAY_SECS", 60u64)?),
            catchup_interval: secs(parse_or(&lookup, "TUBEE_CATCHUP_INTERVAL_SECS", 21_600u64)?),
        })
    }
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn url_or<F>(lookup: &F, key: &'static str, default: &str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    Url::parse(&raw).map_err(|_| ConfigError::Invalid { key, value: raw })
}
