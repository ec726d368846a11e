use chrono::{DateTime, Duration, Utc};
use diesel::{
    backend::Backend,
    deserialize::{self, FromSql},
    serialize::{self, IsNull, Output, ToSql},
    sql_types::Text,
    sqlite::Sqlite,
    AsExpression, FromSqlRow,
};
use serde::{Deserialize, Serialize};

/// Longest hub response body kept on a channel row.
const MAX_RAW_RESPONSE_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    /// Subscribe request accepted, hub has not confirmed intent yet.
    Pending,
    Verified,
    Unverified,
    Unknown,
}

impl VerificationState {
    pub fn from_hub_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "verified" => VerificationState::Verified,
            "unverified" => VerificationState::Unverified,
            "pending" => VerificationState::Pending,
            _ => VerificationState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubInfoSource {
    SubscribeRequest,
    DetailsQuery,
}

/// Lease state of a channel's hub subscription.
///
/// Always built whole from a single protocol exchange and stored whole; there
/// are no setters for individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub struct HubInfo {
    pub lease_seconds: Option<i64>,
    pub expiration: Option<DateTime<Utc>>,
    pub verification: VerificationState,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub last_subscribe_request_at: Option<DateTime<Utc>>,
    pub status_code: Option<u16>,
    pub raw_response: Option<String>,
    pub source: HubInfoSource,
    pub recorded_at: DateTime<Utc>,
}

impl HubInfo {
    /// Lease state implied by an accepted subscribe request.
    pub fn from_subscribe(
        lease_seconds: i64,
        status_code: Option<u16>,
        body: &str,
        now: DateTime<Utc>,
    ) -> Self {
        HubInfo {
            lease_seconds: Some(lease_seconds),
            expiration: Duration::try_seconds(lease_seconds)
                .and_then(|lease| now.checked_add_signed(lease)),
            verification: VerificationState::Pending,
            last_verified_at: None,
            last_subscribe_request_at: Some(now),
            status_code,
            raw_response: truncate_response(body),
            source: HubInfoSource::SubscribeRequest,
            recorded_at: now,
        }
    }

    pub fn expires_after(&self, now: DateTime<Utc>) -> bool {
        self.expiration.map(|exp| exp > now).unwrap_or(false)
    }
}

pub fn truncate_response(body: &str) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    if body.len() <= MAX_RAW_RESPONSE_LEN {
        return Some(body.to_string());
    }
    let mut cut = MAX_RAW_RESPONSE_LEN;
    while cut > 0 && !body.is_char_boundary(cut) {
        cut -= 1;
    }
    Some(body[..cut].to_string())
}

impl ToSql<Text, Sqlite> for HubInfo {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(serde_json::to_string(self)?);
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for HubInfo {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let raw = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
