use actix_web::web;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CallbackPath {
    pub channel_id: String,
}

/// Query the hub sends when verifying a (un)subscription.
#[derive(Debug, Default, Deserialize)]
pub struct VerificationQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.topic")]
    pub topic: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
    #[serde(rename = "hub.lease_seconds")]
    pub lease_seconds: Option<i64>,
    #[serde(rename = "hub.reason")]
    pub reason: Option<String>,
}

pub type RqCallbackPath = web::Path<CallbackPath>;
pub type RqVerification = web::Query<VerificationQuery>;
