//! Channel lifecycle: creation, hub subscription, renewal and ingestion.
//!
//! [`ChannelService`] loads a [`Channel`], calls out to the hub or content API
//! without holding a database connection, applies the entity transition and
//! persists it, then hands the emitted events to the [`EventOrchestrator`].

pub mod ingest;
pub mod renewal;

use crate::config::HubSettings;
use crate::hub::{signature::verify_signature, HubClient, HubMode};
use crate::models::callback::{CallbackAction, NewCallback};
use crate::models::channel::{Channel, ChannelError, ChannelEvent};
use crate::models::channel_repository::ChannelRepository;
use crate::models::hub_info::HubInfo;
use crate::models::subscription::{NewSubscription, Subscription};
use crate::tasks::orchestrator::EventOrchestrator;
use crate::tasks::types::{QueueError, Task, TaskHandle};
use crate::youtube::ContentApi;
use crate::DbPool;
use chrono::Utc;
use ingest::{FetchResult, Notification};
use renewal::{plan_sweep, sweep_tag, SweepMode};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum RenewOutcome {
    Renewed(Channel),
    /// Someone unsubscribed the channel on purpose.
    SkippedDeactivated,
    /// The channel was deleted while the renewal waited.
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationOutcome {
    UnknownChannel,
    /// Logged but not ingested.
    Ignored(String),
    Ingested { new_video_ids: Vec<String> },
}

/// Marks a channel as having a hub request in flight until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    channel_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.channel_id);
    }
}

pub struct ChannelService {
    pool: DbPool,
    repo: ChannelRepository,
    hub: Arc<dyn HubClient>,
    content: Arc<dyn ContentApi>,
    orchestrator: EventOrchestrator,
    hub_settings: HubSettings,
    in_flight: Mutex<HashSet<String>>,
}

impl ChannelService {
    pub fn new(
        pool: DbPool,
        hub: Arc<dyn HubClient>,
        content: Arc<dyn ContentApi>,
        orchestrator: EventOrchestrator,
        hub_settings: HubSettings,
    ) -> Self {
        ChannelService {
            repo: ChannelRepository::new(pool.clone()),
            pool,
            hub,
            content,
            orchestrator,
            hub_settings,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn repository(&self) -> &ChannelRepository {
        &self.repo
    }

    pub fn orchestrator(&self) -> &EventOrchestrator {
        &self.orchestrator
    }

    pub fn hub_settings(&self) -> &HubSettings {
        &self.hub_settings
    }

    fn claim(&self, channel_id: &str) -> Result<InFlight<'_>, ChannelError> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(channel_id.to_string()) {
            return Err(ChannelError::InvalidAction(format!(
                "a hub request for channel {} is already in flight",
                channel_id
            )));
        }
        Ok(InFlight {
            set: &self.in_flight,
            channel_id: channel_id.to_string(),
        })
    }

    fn dispatch(&self, event: ChannelEvent) {
        self.orchestrator.dispatch(&event, Utc::now());
    }

    /// Append to the callback log. Failures are reported here and go no further.
    fn log_callback(&self, entry: NewCallback) {
        let result = self
            .pool
            .get()
            .map_err(|e| e.to_string())
            .and_then(|mut conn| entry.insert(&mut conn).map_err(|e| e.to_string()));
        if let Err(e) = result {
            tracing::error!(
                channel_id = %entry.channel_id,
                action = %entry.action,
                "Failed to write callback log: {}",
                e
            );
        }
    }

    /// Load a channel, creating it on first reference.
    ///
    /// Creation needs a successful metadata fetch; on any failure the new row
    /// is removed again. A row without a name is one whose creation never
    /// finished: callers racing a live creation get an error, otherwise the
    /// creation is completed here.
    pub async fn get_or_create(&self, channel_id: &str) -> Result<Channel, ChannelError> {
        if let Some(channel) = self.repo.find(channel_id)? {
            if channel.name.is_some() {
                return Ok(channel);
            }
        }
        validate_channel_id(channel_id)?;

        let _claim = match self.claim(channel_id) {
            Ok(claim) => claim,
            Err(_) => {
                return match self.repo.find(channel_id)? {
                    Some(channel) if channel.name.is_some() => Ok(channel),
                    _ => Err(creation_in_progress(channel_id)),
                }
            }
        };
        let mut channel = match self.repo.find(channel_id)? {
            Some(channel) if channel.name.is_some() => return Ok(channel),
            Some(unfinished) => {
                tracing::warn!(channel_id, "Completing unfinished channel creation");
                unfinished
            }
            None => {
                let channel = Channel::new(channel_id, Utc::now());
                if !self.repo.insert(&channel)? {
                    return Err(creation_in_progress(channel_id));
                }
                channel
            }
        };

        let created: Result<(), ChannelError> = async {
            let listing = self.content.list_channels(channel_id).await?;
            channel.record_metadata(&listing)?;
            self.repo.save_metadata(&channel)
        }
        .await;

        if let Err(e) = created {
            tracing::warn!(channel_id, "Channel creation failed, rolling back: {}", e);
            if let Err(cleanup) = self.repo.remove(channel_id) {
                tracing::error!(channel_id, "Rollback of channel failed: {}", cleanup);
            }
            return Err(e);
        }

        tracing::info!(channel_id, name = ?channel.name, "Channel created");
        self.dispatch(ChannelEvent::Created {
            channel_id: channel_id.to_string(),
        });
        Ok(channel)
    }

    /// Subscribe an inactive channel at the hub.
    pub async fn activate(&self, channel_id: &str) -> Result<Channel, ChannelError> {
        let _claim = self.claim(channel_id)?;
        let channel = self.repo.get(channel_id)?;
        if let Err(e) = channel.ensure_can_activate() {
            tracing::warn!(channel_id, "Ignoring activation: {}", e);
            return Err(e);
        }
        self.subscribe(channel, CallbackAction::Subscribe).await
    }

    async fn subscribe(
        &self,
        mut channel: Channel,
        action: CallbackAction,
    ) -> Result<Channel, ChannelError> {
        let lease_seconds = self.hub_settings.lease_seconds;
        let response = self
            .hub
            .subscribe(
                &self.hub_settings.callback_url(&channel.id),
                &self.hub_settings.topic_url(&channel.id),
                Some(lease_seconds),
            )
            .await;
        let now = Utc::now();
        self.log_callback(
            NewCallback::new(&channel.id, action, now.timestamp())
                .with_details(outcome_details(response.status_code, response.error.as_deref())),
        );

        let response = response.into_result().map_err(|e| {
            tracing::warn!(channel_id = %channel.id, "Hub subscribe failed: {}", e);
            e
        })?;
        let info = HubInfo::from_subscribe(lease_seconds, response.status_code, &response.body, now);
        let event = channel.record_subscribed(info, now)?;
        self.repo.save_hub_state(&channel)?;

        tracing::info!(
            channel_id = %channel.id,
            status_code = ?response.status_code,
            expiration = ?channel.expiration(),
            "Hub subscription accepted"
        );
        self.dispatch(event);
        Ok(channel)
    }

    /// Unsubscribe an active channel at the hub.
    pub async fn deactivate(&self, channel_id: &str) -> Result<Channel, ChannelError> {
        let _claim = self.claim(channel_id)?;
        let mut channel = self.repo.get(channel_id)?;
        if let Err(e) = channel.ensure_can_deactivate() {
            tracing::warn!(channel_id, "Ignoring deactivation: {}", e);
            return Err(e);
        }

        let response = self
            .hub
            .unsubscribe(
                &self.hub_settings.callback_url(channel_id),
                &self.hub_settings.topic_url(channel_id),
            )
            .await;
        let now = Utc::now();
        self.log_callback(
            NewCallback::new(channel_id, CallbackAction::Unsubscribe, now.timestamp())
                .with_details(outcome_details(response.status_code, response.error.as_deref())),
        );
        response.into_result()?;

        let event = channel.record_unsubscribed(now);
        self.repo.save_hub_state(&channel)?;
        tracing::info!(channel_id, "Hub subscription cancelled");
        self.dispatch(event);
        Ok(channel)
    }

    /// Refresh metadata, then subscribe again to extend the lease.
    pub async fn renew(&self, channel_id: &str) -> Result<RenewOutcome, ChannelError> {
        let channel = match self.repo.find(channel_id)? {
            Some(channel) => channel,
            None => {
                tracing::warn!(channel_id, "Renewal for missing channel discarded");
                return Ok(RenewOutcome::Discarded);
            }
        };
        if channel.was_deactivated() {
            tracing::info!(channel_id, "Channel was unsubscribed, skipping renewal");
            return Ok(RenewOutcome::SkippedDeactivated);
        }

        let result = async {
            self.refresh_metadata(channel_id).await?;
            let _claim = self.claim(channel_id)?;
            let channel = self.repo.get(channel_id)?;
            self.subscribe(channel, CallbackAction::Renew).await
        }
        .await;

        match result {
            Ok(channel) => Ok(RenewOutcome::Renewed(channel)),
            Err(ChannelError::NotFound(_)) => {
                tracing::warn!(channel_id, "Channel deleted during renewal, discarded");
                Ok(RenewOutcome::Discarded)
            }
            Err(e) => Err(e),
        }
    }

    /// Query the hub for lease details and store them wholesale.
    pub async fn refresh_hub_info(&self, channel_id: &str) -> Result<Channel, ChannelError> {
        self.repo.get(channel_id)?;
        let queried = self
            .hub
            .query_details(
                &self.hub_settings.callback_url(channel_id),
                &self.hub_settings.topic_url(channel_id),
            )
            .await;

        let now = Utc::now();
        let details = match &queried {
            Ok(info) => outcome_details(info.status_code, None),
            Err(e) => outcome_details(None, Some(&e.to_string())),
        };
        self.log_callback(
            NewCallback::new(channel_id, CallbackAction::HubInfoRefresh, now.timestamp())
                .with_details(details),
        );
        let info = queried?;

        let mut channel = self.repo.get(channel_id)?;
        let event = channel.record_hub_info(info, now);
        self.repo.save_hub_state(&channel)?;
        tracing::debug!(channel_id, expiration = ?channel.expiration(), "Hub info refreshed");
        if let Some(event) = event {
            self.dispatch(event);
        }
        Ok(channel)
    }

    pub async fn refresh_metadata(&self, channel_id: &str) -> Result<Channel, ChannelError> {
        self.repo.get(channel_id)?;
        let listing = self.content.list_channels(channel_id).await?;
        let mut channel = self.repo.get(channel_id)?;
        channel.record_metadata(&listing)?;
        self.repo.save_metadata(&channel)?;
        Ok(channel)
    }

    pub async fn fetch_videos(&self, channel_id: &str) -> Result<FetchResult, ChannelError> {
        self.repo.get(channel_id)?;
        ingest::fetch_videos(&self.pool, self.content.as_ref(), channel_id).await
    }

    /// Periodic catch-up: lapse expired leases, then fetch every active channel.
    pub async fn catch_up(&self) -> Result<usize, ChannelError> {
        let now = Utc::now();
        for channel_id in self.repo.all()?.into_iter().map(|channel| channel.id) {
            let _claim = match self.claim(&channel_id) {
                Ok(claim) => claim,
                Err(_) => {
                    tracing::debug!(channel_id = %channel_id, "Hub request in flight, skipping lapse check");
                    continue;
                }
            };
            let mut channel = match self.repo.find(&channel_id)? {
                Some(channel) => channel,
                None => continue,
            };
            if let Some(event) = channel.lapse_if_expired(now) {
                self.repo.save_hub_state(&channel)?;
                self.dispatch(event);
            }
        }

        let mut new_items = 0;
        for channel_id in self.repo.active_ids()? {
            match self.fetch_videos(&channel_id).await {
                Ok(result) => new_items += result.new_item_count,
                Err(e) => tracing::warn!(channel_id = %channel_id, "Catch-up fetch failed: {}", e),
            }
        }
        Ok(new_items)
    }

    /// Queue renewal of every channel according to `mode`.
    pub fn renew_all(&self, mode: SweepMode) -> Result<Vec<TaskHandle>, ChannelError> {
        let channels: Vec<_> = self
            .repo
            .all()?
            .into_iter()
            .map(|channel| {
                let expiration = channel.expiration();
                (channel.id, expiration)
            })
            .collect();

        let tag = sweep_tag();
        let plans = {
            let mut rng = rand::thread_rng();
            plan_sweep(
                &channels,
                mode,
                Utc::now(),
                self.orchestrator.policy(),
                &tag,
                &mut rng,
            )
        };

        let queue = self.orchestrator.queue();
        let mut handles = Vec::with_capacity(plans.len());
        for plan in plans {
            match queue.submit(
                Task::RenewChannels(plan.channel_ids),
                plan.delay,
                None,
                Some(plan.task_id),
            ) {
                Ok(handle) => handles.push(handle),
                Err(QueueError::Duplicate(id)) => tracing::debug!(task_id = %id, "Already queued"),
                Err(e) => return Err(ChannelError::InvalidAction(e.to_string())),
            }
        }
        tracing::info!(?mode, tasks = handles.len(), sweep = %tag, "Renewal sweep queued");
        Ok(handles)
    }

    /// Record a user's subscription, creating and activating the channel as needed.
    pub async fn subscribe_user(
        &self,
        user_id: i32,
        channel_id: &str,
        preferences: Option<serde_json::Value>,
    ) -> Result<Subscription, ChannelError> {
        let channel = self.get_or_create(channel_id).await?;

        let subscription = {
            let mut conn = self.pool.get()?;
            match Subscription::get_for_user_and_channel(&mut conn, user_id, channel_id)? {
                Some(existing) => existing,
                None => NewSubscription {
                    user_id,
                    channel_id: channel_id.to_string(),
                    preferences: preferences
                        .unwrap_or_else(|| serde_json::json!({}))
                        .to_string(),
                    created_at: Utc::now().timestamp(),
                }
                .insert(&mut conn)?,
            }
        };

        if !channel.active {
            match self.activate(channel_id).await {
                Ok(_) => {}
                Err(e) if e.is_invalid_action() => {
                    tracing::debug!(channel_id, "Activation skipped: {}", e)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(subscription)
    }

    /// Drop a user's subscription; the last one out deactivates the channel.
    pub async fn unsubscribe_user(&self, user_id: i32, channel_id: &str) -> Result<(), ChannelError> {
        let remaining = {
            let mut conn = self.pool.get()?;
            if !Subscription::delete(&mut conn, user_id, channel_id)? {
                return Err(ChannelError::NotFound(format!(
                    "subscription of user {} to {}",
                    user_id, channel_id
                )));
            }
            Subscription::count_for_channel(&mut conn, channel_id)?
        };

        if remaining == 0 {
            if let Some(channel) = self.repo.find(channel_id)? {
                if channel.active {
                    self.deactivate(channel_id).await?;
                }
            }
        }
        Ok(())
    }

    /// Delete a channel nobody subscribes to, with its videos and callbacks.
    pub async fn delete_channel(&self, channel_id: &str) -> Result<(), ChannelError> {
        let channel = self.repo.get(channel_id)?;
        let subscribers = {
            let mut conn = self.pool.get()?;
            Subscription::count_for_channel(&mut conn, channel_id)?
        };
        if subscribers > 0 {
            return Err(ChannelError::InvalidAction(format!(
                "channel {} still has {} subscriber(s)",
                channel_id, subscribers
            )));
        }
        if channel.active {
            self.deactivate(channel_id).await?;
        }
        self.repo.remove_with_history(channel_id)?;
        tracing::info!(channel_id, "Channel deleted");
        Ok(())
    }

    /// Answer the hub's verification of intent. Returns the challenge to echo.
    pub fn verify_intent(
        &self,
        channel_id: &str,
        mode: HubMode,
        topic: &str,
        challenge: &str,
    ) -> Option<String> {
        let expected = self.hub_settings.topic_url(channel_id);
        let known = matches!(self.repo.find(channel_id), Ok(Some(_)));
        let accepted = ingest::topic_matches(topic, &expected)
            && !challenge.is_empty()
            && (known || mode == HubMode::Unsubscribe);

        self.log_callback(
            NewCallback::new(channel_id, CallbackAction::Verification, Utc::now().timestamp())
                .with_details(format!(
                    "{} {}",
                    mode.as_str(),
                    if accepted { "accepted" } else { "rejected" }
                )),
        );
        if !accepted {
            tracing::warn!(channel_id, mode = mode.as_str(), topic, "Verification rejected");
            return None;
        }
        Some(challenge.to_string())
    }

    /// Log an inbound notification and ingest the videos it announces.
    ///
    /// Never fails: every problem is logged and reported in the outcome.
    pub fn handle_notification(
        &self,
        channel_id: &str,
        body: &[u8],
        signature: Option<&str>,
    ) -> NotificationOutcome {
        match self.repo.find(channel_id) {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(channel_id, "Notification for unknown channel");
                return NotificationOutcome::UnknownChannel;
            }
            Err(e) => {
                tracing::error!(channel_id, "Could not load channel for notification: {}", e);
            }
        }

        let parsed = ingest::parse_notification(body);
        let first_video = parsed
            .as_ref()
            .ok()
            .and_then(|n| n.videos.first())
            .map(|v| v.video_id.clone());
        let mut entry = NewCallback::new(
            channel_id,
            CallbackAction::HubNotification,
            Utc::now().timestamp(),
        )
        .with_details(String::from_utf8_lossy(body));
        if let Some(video_id) = first_video {
            entry = entry.with_video(video_id);
        }
        self.log_callback(entry);

        if let Some(secret) = &self.hub_settings.secret {
            if let Err(e) = verify_signature(secret, body, signature) {
                tracing::warn!(channel_id, "Ignoring notification: {}", e);
                return NotificationOutcome::Ignored(e.to_string());
            }
        }

        let notification: Notification = match parsed {
            Ok(notification) => notification,
            Err(e) => {
                tracing::warn!(channel_id, "Ignoring notification: {}", e);
                return NotificationOutcome::Ignored(e.to_string());
            }
        };

        let topic = self.hub_settings.topic_url(channel_id);
        if let Some(self_link) = &notification.self_link {
            if !ingest::topic_matches(self_link, &topic) {
                tracing::warn!(channel_id, self_link = %self_link, "Notification topic mismatch");
                return NotificationOutcome::Ignored(format!("topic mismatch: {}", self_link));
            }
        }

        let mut new_video_ids = Vec::new();
        for video in &notification.videos {
            match ingest::store_notified_video(&self.pool, channel_id, video) {
                Ok(true) => new_video_ids.push(video.video_id.clone()),
                Ok(false) => {}
                Err(e) => tracing::error!(
                    channel_id,
                    video_id = %video.video_id,
                    "Failed to store notified video: {}",
                    e
                ),
            }
        }
        tracing::info!(channel_id, new = new_video_ids.len(), "Notification processed");
        NotificationOutcome::Ingested { new_video_ids }
    }
}

fn outcome_details(status_code: Option<u16>, error: Option<&str>) -> String {
    match (status_code, error) {
        (Some(code), _) => format!("status {}", code),
        (None, Some(error)) => format!("error: {}", error),
        (None, None) => "no response".to_string(),
    }
}

fn creation_in_progress(channel_id: &str) -> ChannelError {
    ChannelError::InvalidAction(format!("channel {} is still being created", channel_id))
}

/// Channel ids are opaque but end up in URLs; keep them to a safe alphabet.
pub fn validate_channel_id(channel_id: &str) -> Result<(), ChannelError> {
    let valid = !channel_id.is_empty()
        && channel_id.len() <= 64
        && channel_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ChannelError::InvalidAction(format!(
            "invalid channel id {:?}",
            channel_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
