//! Parsing of the hub's subscription details page.
//!
//! The hub only exposes lease state as an HTML page with a definition list,
//! e.g. `<dt>Expiration time</dt><dd>Tue, 07 May 2024 10:00:00 +0000</dd>`.

use crate::models::hub_info::{truncate_response, HubInfo, HubInfoSource, VerificationState};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

static DEFINITION_REGEX: OnceLock<Regex> = OnceLock::new();
static TAG_REGEX: OnceLock<Regex> = OnceLock::new();

fn definition_regex() -> &'static Regex {
    DEFINITION_REGEX.get_or_init(|| {
        Regex::new(r"(?is)<dt[^>]*>(.*?)</dt>\s*<dd[^>]*>(.*?)</dd>")
            .expect("Failed to compile definition regex")
    })
}

fn tag_regex() -> &'static Regex {
    TAG_REGEX.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("Failed to compile tag regex"))
}

/// `<dt>`/`<dd>` pairs keyed by lowercased term, values stripped of markup.
fn definitions(html: &str) -> HashMap<String, String> {
    definition_regex()
        .captures_iter(html)
        .map(|caps| {
            let term = strip_tags(&caps[1]).to_ascii_lowercase();
            let value = strip_tags(&caps[2]);
            (term, value)
        })
        .collect()
}

fn strip_tags(fragment: &str) -> String {
    let text = tag_regex().replace_all(fragment, "");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_timestamp(value: Option<&String>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("n/a") {
        return None;
    }
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| log::debug!("Unparseable hub timestamp {:?}: {}", value, e))
        .ok()
}

/// Build a whole [`HubInfo`] from a details page.
pub fn parse_details(html: &str, status_code: Option<u16>, now: DateTime<Utc>) -> HubInfo {
    let defs = definitions(html);

    let verification = defs
        .get("state")
        .map(|s| VerificationState::from_hub_label(s))
        .unwrap_or(VerificationState::Unknown);
    let last_verified_at = parse_timestamp(defs.get("last successful verification"));
    let expiration = parse_timestamp(defs.get("expiration time"));
    let last_subscribe_request_at = parse_timestamp(defs.get("last subscribe request"));

    let lease_seconds = match (expiration, last_verified_at) {
        (Some(exp), Some(verified)) if exp > verified => Some((exp - verified).num_seconds()),
        _ => None,
    };

    HubInfo {
        lease_seconds,
        expiration,
        verification,
        last_verified_at,
        last_subscribe_request_at,
        status_code,
        raw_response: truncate_response(html),
        source: HubInfoSource::DetailsQuery,
        recorded_at: now,
    }
}
