use super::types::{RqCallbackPath, RqVerification};
use crate::channels::{ChannelService, NotificationOutcome};
use crate::hub::HubMode;
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// Verification of intent. Echoes `hub.challenge` when we asked for this.
#[get("/callback/{channel_id}")]
pub async fn verify_intent(
    path: RqCallbackPath,
    query: RqVerification,
    service: web::Data<ChannelService>,
) -> impl Responder {
    let channel_id = &path.channel_id;
    let mode = match query.mode.as_deref() {
        Some("subscribe") => HubMode::Subscribe,
        Some("unsubscribe") => HubMode::Unsubscribe,
        Some("denied") => {
            tracing::warn!(
                channel_id = %channel_id,
                reason = ?query.reason,
                "Hub denied subscription"
            );
            return HttpResponse::Ok().finish();
        }
        other => {
            tracing::warn!(channel_id = %channel_id, mode = ?other, "Unexpected hub.mode");
            return HttpResponse::NotFound().finish();
        }
    };
    let (Some(topic), Some(challenge)) = (query.topic.as_deref(), query.challenge.as_deref())
    else {
        return HttpResponse::NotFound().finish();
    };
    tracing::debug!(
        channel_id = %channel_id,
        lease_seconds = ?query.lease_seconds,
        "Verification request"
    );

    match service.verify_intent(channel_id, mode, topic, challenge) {
        Some(challenge) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(challenge),
        None => HttpResponse::NotFound().finish(),
    }
}

/// Content distribution. Anything short of an unknown channel gets a 2xx.
#[post("/callback/{channel_id}")]
pub async fn receive_notification(
    path: RqCallbackPath,
    req: HttpRequest,
    body: web::Bytes,
    service: web::Data<ChannelService>,
) -> impl Responder {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    match service.handle_notification(&path.channel_id, &body, signature) {
        NotificationOutcome::UnknownChannel => HttpResponse::NotFound().finish(),
        NotificationOutcome::Ignored(_) | NotificationOutcome::Ingested { .. } => {
            HttpResponse::NoContent().finish()
        }
    }
}
