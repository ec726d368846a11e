use super::*;
use crate::hub::signature::sign;
use crate::models::callback::Callback;
use crate::models::hub_info::{HubInfoSource, VerificationState};
use crate::models::video::Video;
use crate::test_helpers::{test_context, test_context_with, test_hub_settings, TestContext};
use chrono::Duration as ChronoDuration;
use std::time::Duration;

const NOTIFICATION: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns="http://www.w3.org/2005/Atom">
  <link rel="self" href="https://www.youtube.com/xml/feeds/videos.xml?channel_id=UC1"/>
  <title>YouTube video feed</title>
  <updated>2024-05-01T12:00:00+00:00</updated>
  <entry>
    <id>yt:video:vid1</id>
    <title>New upload</title>
    <link rel="alternate" href="https://www.youtube.com/watch?v=vid1"/>
    <published>2024-05-01T11:59:00+00:00</published>
    <updated>2024-05-01T12:00:00+00:00</updated>
  </entry>
</feed>"#;

async fn created(ctx: &TestContext, channel_id: &str) -> Channel {
    ctx.content.add_channel(channel_id, "A channel");
    let channel = ctx.service.get_or_create(channel_id).await.unwrap();
    ctx.queue.clear();
    channel
}

fn callbacks(ctx: &TestContext, channel_id: &str) -> Vec<Callback> {
    let mut conn = ctx.pool.get().unwrap();
    Callback::get_for_channel(&mut conn, channel_id, 50).unwrap()
}

#[tokio::test]
async fn test_create_fetches_metadata_and_emits_created() {
    let ctx = test_context();
    ctx.content.add_channel("UC1", "First channel");

    let channel = ctx.service.get_or_create("UC1").await.unwrap();
    assert_eq!(channel.name.as_deref(), Some("First channel"));
    assert!(!channel.active);

    let stored = ctx.service.repository().get("UC1").unwrap();
    assert_eq!(stored.name.as_deref(), Some("First channel"));

    let tasks: Vec<Task> = ctx.queue.submitted().into_iter().map(|s| s.task).collect();
    assert_eq!(
        tasks,
        vec![
            Task::RefreshHubInfo(vec!["UC1".to_string()]),
            Task::FetchVideos(vec!["UC1".to_string()]),
            Task::RenewChannels(vec!["UC1".to_string()]),
        ]
    );
}

#[tokio::test]
async fn test_new_channel_gets_subscribed_after_default_delay() {
    let ctx = test_context();
    ctx.content.add_channel("UC1", "First channel");
    ctx.service.get_or_create("UC1").await.unwrap();

    let renewal = ctx
        .queue
        .submitted()
        .into_iter()
        .find(|s| matches!(s.task, Task::RenewChannels(_)))
        .unwrap();
    assert_eq!(renewal.delay, Duration::from_secs(60));
    assert_eq!(renewal.id.as_deref(), Some("renew_UC1"));
}

#[tokio::test]
async fn test_create_of_unknown_channel_rolls_back() {
    let ctx = test_context();
    let err = ctx.service.get_or_create("UCnope").await.unwrap_err();
    assert_eq!(err, ChannelError::UnknownChannel("UCnope".to_string()));
    assert!(err.is_invalid_action());
    assert_eq!(ctx.service.repository().find("UCnope").unwrap(), None);
    assert!(ctx.queue.submitted().is_empty());
}

#[tokio::test]
async fn test_create_racing_unfinished_creation_is_refused() {
    let ctx = test_context();
    ctx.content.add_channel("UC1", "First channel");
    ctx.service
        .repository()
        .insert(&Channel::new("UC1", Utc::now()))
        .unwrap();

    let claim = ctx.service.claim("UC1").unwrap();
    let err = ctx.service.get_or_create("UC1").await.unwrap_err();
    assert!(matches!(err, ChannelError::InvalidAction(_)));
    assert!(ctx.queue.submitted().is_empty());
    drop(claim);

    // nobody is creating it any more, so the row gets finished
    let channel = ctx.service.get_or_create("UC1").await.unwrap();
    assert_eq!(channel.name.as_deref(), Some("First channel"));
    assert_eq!(
        ctx.service.repository().get("UC1").unwrap().name.as_deref(),
        Some("First channel")
    );
}

#[tokio::test]
async fn test_invalid_channel_id_is_rejected_before_storage() {
    let ctx = test_context();
    let err = ctx.service.get_or_create("../etc").await.unwrap_err();
    assert!(matches!(err, ChannelError::InvalidAction(_)));
    assert!(ctx.service.repository().all().unwrap().is_empty());
}

#[tokio::test]
async fn test_activate_twice_subscribes_once() {
    let ctx = test_context();
    created(&ctx, "UC1").await;

    let channel = ctx.service.activate("UC1").await.unwrap();
    assert!(channel.active);
    assert!(channel.expiration().unwrap() > Utc::now());

    let err = ctx.service.activate("UC1").await.unwrap_err();
    assert!(matches!(err, ChannelError::InvalidAction(_)));
    assert!(!err.is_retryable());
    assert_eq!(ctx.hub.subscribe_count(), 1);
}

#[tokio::test]
async fn test_activation_schedules_next_renewal() {
    let ctx = test_context();
    created(&ctx, "UC1").await;
    ctx.service.activate("UC1").await.unwrap();

    let submitted = ctx.queue.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].task, Task::RenewChannels(vec!["UC1".to_string()]));
    // 5 day lease, renewed one day early
    let expected = Duration::from_secs(4 * 86_400);
    assert!(submitted[0].delay <= expected);
    assert!(submitted[0].delay > expected - Duration::from_secs(60));
}

#[tokio::test]
async fn test_failed_subscribe_leaves_state_unchanged() {
    let ctx = test_context();
    created(&ctx, "UC1").await;

    ctx.hub.set_status(Some(500));
    let err = ctx.service.activate("UC1").await.unwrap_err();
    assert!(matches!(err, ChannelError::UpstreamApi { .. }));

    ctx.hub.set_status(None);
    let err = ctx.service.activate("UC1").await.unwrap_err();
    assert!(matches!(err, ChannelError::Network(_)));
    assert!(err.is_retryable());

    let channel = ctx.service.repository().get("UC1").unwrap();
    assert!(!channel.active);
    assert_eq!(channel.subscribe_timestamp, None);
    assert!(ctx.queue.submitted().is_empty());

    let logged = callbacks(&ctx, "UC1");
    assert_eq!(logged.len(), 2);
    assert!(logged.iter().all(|c| c.action == CallbackAction::Subscribe));
}

#[tokio::test]
async fn test_deactivate() {
    let ctx = test_context();
    created(&ctx, "UC1").await;

    let err = ctx.service.deactivate("UC1").await.unwrap_err();
    assert!(matches!(err, ChannelError::InvalidAction(_)));
    assert_eq!(ctx.hub.unsubscribe_count(), 0);

    ctx.service.activate("UC1").await.unwrap();
    let channel = ctx.service.deactivate("UC1").await.unwrap();
    assert!(!channel.active);
    assert!(channel.unsubscribe_timestamp.is_some());
    assert_eq!(ctx.hub.unsubscribe_count(), 1);
}

#[tokio::test]
async fn test_renew_extends_active_channel() {
    let ctx = test_context();
    created(&ctx, "UC1").await;
    ctx.service.activate("UC1").await.unwrap();
    ctx.queue.clear();

    let outcome = ctx.service.renew("UC1").await.unwrap();
    assert!(matches!(outcome, RenewOutcome::Renewed(ref c) if c.active));
    assert_eq!(ctx.hub.subscribe_count(), 2);
    assert_eq!(ctx.queue.submitted().len(), 1);
    assert!(callbacks(&ctx, "UC1")
        .iter()
        .any(|c| c.action == CallbackAction::Renew));
}

#[tokio::test]
async fn test_renew_skips_unsubscribed_and_discards_missing() {
    let ctx = test_context();
    created(&ctx, "UC1").await;
    ctx.service.activate("UC1").await.unwrap();
    ctx.service.deactivate("UC1").await.unwrap();

    assert_eq!(
        ctx.service.renew("UC1").await.unwrap(),
        RenewOutcome::SkippedDeactivated
    );
    assert_eq!(
        ctx.service.renew("UCgone").await.unwrap(),
        RenewOutcome::Discarded
    );
    assert_eq!(ctx.hub.subscribe_count(), 1);
}

#[tokio::test]
async fn test_renew_of_vanished_channel_is_upstream_error() {
    let ctx = test_context();
    created(&ctx, "UC1").await;
    ctx.content.remove_channel("UC1");

    let err = ctx.service.renew("UC1").await.unwrap_err();
    assert!(matches!(err, ChannelError::UpstreamApi { .. }));
    assert_eq!(ctx.hub.subscribe_count(), 0);
}

#[tokio::test]
async fn test_refresh_hub_info_replaces_value_and_lapses() {
    let ctx = test_context();
    created(&ctx, "UC1").await;
    ctx.service.activate("UC1").await.unwrap();
    ctx.queue.clear();

    let now = Utc::now();
    let queried = HubInfo {
        lease_seconds: None,
        expiration: Some(now - ChronoDuration::hours(1)),
        verification: VerificationState::Verified,
        last_verified_at: Some(now - ChronoDuration::days(6)),
        last_subscribe_request_at: None,
        status_code: Some(200),
        raw_response: None,
        source: HubInfoSource::DetailsQuery,
        recorded_at: now,
    };
    ctx.hub.set_details(queried.clone());

    let channel = ctx.service.refresh_hub_info("UC1").await.unwrap();
    assert_eq!(channel.hub_info(), Some(&queried));
    assert!(!channel.active);
    assert!(!channel.was_deactivated());

    let submitted = ctx.queue.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].delay, Duration::ZERO);

    // idempotent
    ctx.service.refresh_hub_info("UC1").await.unwrap();
    assert_eq!(ctx.hub.details_count(), 2);
}

#[tokio::test]
async fn test_refresh_hub_info_failure_is_surfaced() {
    let ctx = test_context();
    created(&ctx, "UC1").await;
    let err = ctx.service.refresh_hub_info("UC1").await.unwrap_err();
    assert!(matches!(err, ChannelError::UpstreamApi { .. }));
    assert_eq!(
        callbacks(&ctx, "UC1")[0].action,
        CallbackAction::HubInfoRefresh
    );
}

#[tokio::test]
async fn test_fetch_videos_is_idempotent() {
    let ctx = test_context();
    created(&ctx, "UC1").await;
    ctx.content
        .set_playlist("UU1", &[&["a", "b"], &["c"], &["d", "a"]]);

    let first = ctx.service.fetch_videos("UC1").await.unwrap();
    assert_eq!(first.new_item_count, 4);
    assert_eq!(first.new_video_ids, vec!["a", "b", "c", "d"]);

    let second = ctx.service.fetch_videos("UC1").await.unwrap();
    assert_eq!(second.new_item_count, 0);
    assert!(second.new_video_ids.is_empty());
}

#[tokio::test]
async fn test_two_notifications_for_one_video_store_one_row() {
    let ctx = test_context();
    created(&ctx, "UC1").await;

    let first = ctx
        .service
        .handle_notification("UC1", NOTIFICATION.as_bytes(), None);
    assert_eq!(
        first,
        NotificationOutcome::Ingested {
            new_video_ids: vec!["vid1".to_string()]
        }
    );
    let second = ctx
        .service
        .handle_notification("UC1", NOTIFICATION.as_bytes(), None);
    assert_eq!(
        second,
        NotificationOutcome::Ingested {
            new_video_ids: vec![]
        }
    );

    let mut conn = ctx.pool.get().unwrap();
    assert_eq!(Video::count_for_channel(&mut conn, "UC1").unwrap(), 1);
    let stats = Callback::notification_stats(&mut conn, "vid1").unwrap();
    assert_eq!(stats.count, 2);
}

#[tokio::test]
async fn test_notification_for_unknown_channel() {
    let ctx = test_context();
    let outcome = ctx
        .service
        .handle_notification("UC1", NOTIFICATION.as_bytes(), None);
    assert_eq!(outcome, NotificationOutcome::UnknownChannel);
}

#[tokio::test]
async fn test_notification_topic_mismatch_is_logged_not_ingested() {
    let ctx = test_context();
    created(&ctx, "UC2").await;
    let outcome = ctx
        .service
        .handle_notification("UC2", NOTIFICATION.as_bytes(), None);
    assert!(matches!(outcome, NotificationOutcome::Ignored(_)));
    assert_eq!(callbacks(&ctx, "UC2").len(), 1);
    let mut conn = ctx.pool.get().unwrap();
    assert_eq!(Video::get_by_id(&mut conn, "vid1").unwrap(), None);
}

#[tokio::test]
async fn test_signed_notifications() {
    let mut settings = test_hub_settings();
    settings.secret = Some("s3cret".to_string());
    let ctx = test_context_with(settings);
    created(&ctx, "UC1").await;

    let outcome = ctx
        .service
        .handle_notification("UC1", NOTIFICATION.as_bytes(), Some("sha1=00"));
    assert!(matches!(outcome, NotificationOutcome::Ignored(_)));

    let header = sign("s3cret", NOTIFICATION.as_bytes());
    let outcome = ctx
        .service
        .handle_notification("UC1", NOTIFICATION.as_bytes(), Some(&header));
    assert!(matches!(outcome, NotificationOutcome::Ingested { .. }));
}

#[tokio::test]
async fn test_verify_intent() {
    let ctx = test_context();
    created(&ctx, "UC1").await;
    let topic = "https://www.youtube.com/xml/feeds/videos.xml?channel_id=UC1";

    assert_eq!(
        ctx.service
            .verify_intent("UC1", HubMode::Subscribe, topic, "abc"),
        Some("abc".to_string())
    );
    assert_eq!(
        ctx.service
            .verify_intent("UC1", HubMode::Subscribe, "https://evil.example.com/", "abc"),
        None
    );
    assert_eq!(
        ctx.service.verify_intent("UC1", HubMode::Subscribe, topic, ""),
        None
    );
    let other = "https://www.youtube.com/xml/feeds/videos.xml?channel_id=UC9";
    assert_eq!(
        ctx.service.verify_intent("UC9", HubMode::Subscribe, other, "abc"),
        None
    );
    assert_eq!(
        ctx.service
            .verify_intent("UC9", HubMode::Unsubscribe, other, "abc"),
        Some("abc".to_string())
    );
}

#[tokio::test]
async fn test_user_subscription_lifecycle() {
    let ctx = test_context();
    ctx.content.add_channel("UC1", "A channel");

    let sub = ctx.service.subscribe_user(7, "UC1", None).await.unwrap();
    assert_eq!(sub.channel_id, "UC1");
    assert!(ctx.service.repository().get("UC1").unwrap().active);

    // second user and repeat subscribe do not resubscribe at the hub
    ctx.service.subscribe_user(8, "UC1", None).await.unwrap();
    let again = ctx.service.subscribe_user(7, "UC1", None).await.unwrap();
    assert_eq!(again.id, sub.id);
    assert_eq!(ctx.hub.subscribe_count(), 1);

    ctx.service.unsubscribe_user(7, "UC1").await.unwrap();
    assert!(ctx.service.repository().get("UC1").unwrap().active);
    ctx.service.unsubscribe_user(8, "UC1").await.unwrap();
    let channel = ctx.service.repository().get("UC1").unwrap();
    assert!(!channel.active);
    assert!(channel.was_deactivated());

    let err = ctx.service.unsubscribe_user(8, "UC1").await.unwrap_err();
    assert!(matches!(err, ChannelError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_channel_requires_no_subscribers() {
    let ctx = test_context();
    ctx.content.add_channel("UC1", "A channel");
    ctx.service.subscribe_user(7, "UC1", None).await.unwrap();

    let err = ctx.service.delete_channel("UC1").await.unwrap_err();
    assert!(matches!(err, ChannelError::InvalidAction(_)));

    ctx.service.unsubscribe_user(7, "UC1").await.unwrap();
    ctx.service.delete_channel("UC1").await.unwrap();
    assert_eq!(ctx.service.repository().find("UC1").unwrap(), None);
    assert!(callbacks(&ctx, "UC1").is_empty());
}

#[tokio::test]
async fn test_renew_all_modes() {
    let ctx = test_context();
    created(&ctx, "UC1").await;
    created(&ctx, "UC2").await;
    ctx.service.activate("UC1").await.unwrap();
    ctx.queue.clear();

    let handles = ctx.service.renew_all(SweepMode::Immediate).unwrap();
    assert_eq!(handles.len(), 1);
    assert!(handles[0].id.starts_with("renew_all_"));

    ctx.queue.clear();
    let handles = ctx.service.renew_all(SweepMode::Scheduled).unwrap();
    assert_eq!(handles.len(), 2);
    let submitted = ctx.queue.submitted();
    assert_eq!(submitted[0].id.as_deref(), Some("renew_UC1"));
    assert!(submitted[0].delay > Duration::from_secs(3 * 86_400));
    // UC2 has no lease yet
    assert_eq!(submitted[1].delay, Duration::from_secs(60));

    ctx.queue.clear();
    ctx.service.renew_all(SweepMode::Jittered).unwrap();
    let submitted = ctx.queue.submitted();
    assert!(submitted[0].delay < Duration::from_secs(4 * 86_400));
    assert!(submitted[1].delay < Duration::from_secs(60));
}

#[tokio::test]
async fn test_sweep_after_activation_keeps_one_renewal_per_channel() {
    let ctx = test_context();
    created(&ctx, "UC1").await;
    ctx.service.activate("UC1").await.unwrap();

    let handles = ctx.service.renew_all(SweepMode::Scheduled).unwrap();
    assert!(handles.is_empty());
    ctx.service.renew_all(SweepMode::Jittered).unwrap();

    let renewals: Vec<_> = ctx
        .queue
        .submitted()
        .into_iter()
        .filter(|s| s.task == Task::RenewChannels(vec!["UC1".to_string()]))
        .collect();
    assert_eq!(renewals.len(), 1);
    assert_eq!(renewals[0].id.as_deref(), Some("renew_UC1"));
}

#[tokio::test]
async fn test_catch_up_leaves_channels_with_hub_request_in_flight() {
    let ctx = test_context();
    created(&ctx, "UC1").await;
    let mut channel = ctx.service.repository().get("UC1").unwrap();
    let past = Utc::now() - ChronoDuration::hours(2);
    channel
        .record_subscribed(HubInfo::from_subscribe(60, Some(202), "", past), past)
        .unwrap();
    ctx.service.repository().save_hub_state(&channel).unwrap();

    let claim = ctx.service.claim("UC1").unwrap();
    ctx.service.catch_up().await.unwrap();
    assert!(ctx.service.repository().get("UC1").unwrap().active);
    assert!(ctx.queue.submitted().is_empty());
    drop(claim);

    ctx.service.catch_up().await.unwrap();
    assert!(!ctx.service.repository().get("UC1").unwrap().active);
    let submitted = ctx.queue.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].delay, Duration::ZERO);
}

#[tokio::test]
async fn test_catch_up_fetches_active_channels() {
    let ctx = test_context();
    created(&ctx, "UC1").await;
    created(&ctx, "UC2").await;
    ctx.service.activate("UC1").await.unwrap();
    ctx.content.set_playlist("UU1", &[&["a", "b"]]);
    ctx.content.set_playlist("UU2", &[&["c"]]);

    assert_eq!(ctx.service.catch_up().await.unwrap(), 2);
    assert_eq!(ctx.service.catch_up().await.unwrap(), 0);
}
