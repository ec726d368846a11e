use super::details::parse_details;
use crate::config::HubSettings;
use crate::models::channel::ChannelError;
use crate::models::hub_info::HubInfo;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const TOTAL_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("tubee/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubMode {
    Subscribe,
    Unsubscribe,
}

impl HubMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HubMode::Subscribe => "subscribe",
            HubMode::Unsubscribe => "unsubscribe",
        }
    }
}

/// Outcome of a subscribe or unsubscribe request.
///
/// Success means the hub answered 2xx; verification of intent arrives later
/// on the callback endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct HubResponse {
    pub success: bool,
    pub status_code: Option<u16>,
    pub body: String,
    /// Transport failure, when no status was received at all.
    pub error: Option<String>,
}

impl HubResponse {
    pub fn from_status(status_code: u16, body: String) -> Self {
        HubResponse {
            success: (200..300).contains(&status_code),
            status_code: Some(status_code),
            body,
            error: None,
        }
    }

    pub fn transport_failure(error: String) -> Self {
        HubResponse {
            success: false,
            status_code: None,
            body: String::new(),
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<HubResponse, ChannelError> {
        if self.success {
            return Ok(self);
        }
        match (self.status_code, self.error) {
            (Some(status), _) => Err(ChannelError::upstream(
                "hub",
                format!("hub answered {}: {}", status, self.body.trim()),
            )),
            (None, error) => Err(ChannelError::Network(
                error.unwrap_or_else(|| "no response from hub".to_string()),
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub details request answered {0}")]
    Status(u16),
    #[error("hub request failed: {0}")]
    Network(String),
}

impl From<HubError> for ChannelError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Status(_) => ChannelError::upstream("hub", err.to_string()),
            HubError::Network(message) => ChannelError::Network(message),
        }
    }
}

/// Subscriber side of the WebSub protocol. Implementations never retry.
#[async_trait]
pub trait HubClient: Send + Sync {
    async fn subscribe(&self, callback: &Url, topic: &Url, lease_seconds: Option<i64>)
        -> HubResponse;

    async fn unsubscribe(&self, callback: &Url, topic: &Url) -> HubResponse;

    async fn query_details(&self, callback: &Url, topic: &Url) -> Result<HubInfo, HubError>;
}

pub struct WebSubHub {
    client: Client,
    hub_url: Url,
    details_url: Url,
    secret: Option<String>,
}

impl WebSubHub {
    pub fn new(settings: &HubSettings) -> Result<Self, HubError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HubError::Network(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            hub_url: settings.hub_url.clone(),
            details_url: settings.details_url.clone(),
            secret: settings.secret.clone(),
        })
    }

    fn form(
        &self,
        mode: HubMode,
        callback: &Url,
        topic: &Url,
        lease_seconds: Option<i64>,
    ) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("hub.mode", mode.as_str().to_string()),
            ("hub.topic", topic.to_string()),
            ("hub.callback", callback.to_string()),
            ("hub.verify", "async".to_string()),
        ];
        if mode == HubMode::Subscribe {
            if let Some(lease) = lease_seconds {
                form.push(("hub.lease_seconds", lease.to_string()));
            }
            if let Some(secret) = &self.secret {
                form.push(("hub.secret", secret.clone()));
            }
        }
        form
    }

    async fn send(
        &self,
        mode: HubMode,
        callback: &Url,
        topic: &Url,
        lease_seconds: Option<i64>,
    ) -> HubResponse {
        let form = self.form(mode, callback, topic, lease_seconds);
        let response = match self
            .client
            .post(self.hub_url.clone())
            .form(&form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(topic = %topic, mode = mode.as_str(), "Hub request failed: {}", e);
                return HubResponse::transport_failure(e.to_string());
            }
        };

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(topic = %topic, mode = mode.as_str(), status_code = status, "Hub answered");
        HubResponse::from_status(status, body)
    }
}

#[async_trait]
impl HubClient for WebSubHub {
    async fn subscribe(
        &self,
        callback: &Url,
        topic: &Url,
        lease_seconds: Option<i64>,
    ) -> HubResponse {
        self.send(HubMode::Subscribe, callback, topic, lease_seconds)
            .await
    }

    async fn unsubscribe(&self, callback: &Url, topic: &Url) -> HubResponse {
        self.send(HubMode::Unsubscribe, callback, topic, None).await
    }

    async fn query_details(&self, callback: &Url, topic: &Url) -> Result<HubInfo, HubError> {
        let mut url = self.details_url.clone();
        url.query_pairs_mut()
            .append_pair("hub.callback", callback.as_str())
            .append_pair("hub.topic", topic.as_str())
            .append_pair("hub.secret", self.secret.as_deref().unwrap_or(""));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HubError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HubError::Status(status.as_u16()));
        }
        let html = response
            .text()
            .await
            .map_err(|e| HubError::Network(e.to_string()))?;
        Ok(parse_details(&html, Some(status.as_u16()), Utc::now()))
    }
}
