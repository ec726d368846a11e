//! When to renew a channel's lease.
//!
//! Renewal is self-perpetuating: every accepted subscribe produces a new
//! expiration, and the next renewal is derived from it. A bulk sweep fans out
//! one delayed task per channel, optionally jittered so the hub does not see
//! every channel renew at once.
//!
//! Scheduled renewals of a channel share one task id, so a channel never has
//! more than one waiting in the queue.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenewalPolicy {
    /// Renew this long before the lease ends.
    pub margin: Duration,
    /// Delay used while no expiration is known.
    pub default_delay: Duration,
    /// Delay before retrying a renewal that failed upstream.
    pub retry_delay: Duration,
    /// Jitter event-driven renewals too, not only sweeps.
    pub jitter_single: bool,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        RenewalPolicy {
            margin: Duration::from_secs(86_400),
            default_delay: Duration::from_secs(60),
            retry_delay: Duration::from_secs(3_600),
            jitter_single: false,
        }
    }
}

pub fn renewal_delay(
    expiration: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    policy: &RenewalPolicy,
) -> Duration {
    let expiration = match expiration {
        Some(expiration) => expiration,
        None => return policy.default_delay,
    };
    // negative means already past
    let remaining = (expiration - now).to_std().unwrap_or(Duration::ZERO);
    if remaining > policy.margin {
        remaining - policy.margin
    } else {
        Duration::ZERO
    }
}

/// Uniform draw in `[0, delay)`. A zero delay stays zero.
pub fn apply_jitter<R: Rng + ?Sized>(delay: Duration, rng: &mut R) -> Duration {
    let millis = delay.as_millis().min(u64::MAX as u128) as u64;
    if millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.gen_range(0..millis))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepMode {
    /// One task renewing every channel right away.
    Immediate,
    /// One task per channel at its computed renewal time.
    Scheduled,
    /// One task per channel at a random point before its renewal time.
    Jittered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenewalPlan {
    pub task_id: String,
    pub channel_ids: Vec<String>,
    pub delay: Duration,
}

/// Short random tag naming one immediate sweep.
pub fn sweep_tag() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Task id shared by every scheduled renewal of one channel.
pub fn renewal_task_id(channel_id: &str) -> String {
    format!("renew_{}", channel_id)
}

/// Lay out the tasks of one renew-all sweep.
///
/// `channels` pairs each channel id with its known expiration.
pub fn plan_sweep<R: Rng + ?Sized>(
    channels: &[(String, Option<DateTime<Utc>>)],
    mode: SweepMode,
    now: DateTime<Utc>,
    policy: &RenewalPolicy,
    tag: &str,
    rng: &mut R,
) -> Vec<RenewalPlan> {
    if channels.is_empty() {
        return Vec::new();
    }
    if mode == SweepMode::Immediate {
        return vec![RenewalPlan {
            task_id: format!("renew_all_{}", tag),
            channel_ids: channels.iter().map(|(id, _)| id.clone()).collect(),
            delay: Duration::ZERO,
        }];
    }

    channels
        .iter()
        .map(|(channel_id, expiration)| {
            let mut delay = renewal_delay(*expiration, now, policy);
            if mode == SweepMode::Jittered {
                delay = apply_jitter(delay, rng);
            }
            RenewalPlan {
                task_id: renewal_task_id(channel_id),
                channel_ids: vec![channel_id.clone()],
                delay,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use rand::{rngs::StdRng, SeedableRng};

    const DAY: u64 = 86_400;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_delay_far_expiration_subtracts_margin() {
        let policy = RenewalPolicy::default();
        let delay = renewal_delay(Some(now() + ChronoDuration::days(10)), now(), &policy);
        assert_eq!(delay, Duration::from_secs(9 * DAY));
    }

    #[test]
    fn test_delay_imminent_or_past_expiration_is_zero() {
        let policy = RenewalPolicy::default();
        let soon = renewal_delay(Some(now() + ChronoDuration::hours(2)), now(), &policy);
        assert_eq!(soon, Duration::ZERO);
        let past = renewal_delay(Some(now() - ChronoDuration::hours(2)), now(), &policy);
        assert_eq!(past, Duration::ZERO);
        let exactly_margin = renewal_delay(Some(now() + ChronoDuration::days(1)), now(), &policy);
        assert_eq!(exactly_margin, Duration::ZERO);
    }

    #[test]
    fn test_delay_without_expiration_is_default() {
        let policy = RenewalPolicy::default();
        assert_eq!(renewal_delay(None, now(), &policy), policy.default_delay);
    }

    #[test]
    fn test_jitter_stays_below_delay() {
        let mut rng = StdRng::seed_from_u64(7);
        let delay = Duration::from_secs(9 * DAY);
        for _ in 0..1_000 {
            let jittered = apply_jitter(delay, &mut rng);
            assert!(jittered < delay);
        }
        let tiny = Duration::from_millis(1);
        for _ in 0..100 {
            assert_eq!(apply_jitter(tiny, &mut rng), Duration::ZERO);
        }
    }

    #[test]
    fn test_jitter_never_applies_to_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(apply_jitter(Duration::ZERO, &mut rng), Duration::ZERO);
        }
    }

    #[test]
    fn test_scheduled_sweep_one_task_per_channel() {
        let mut rng = StdRng::seed_from_u64(1);
        let channels = vec![
            ("UC1".to_string(), Some(now() + ChronoDuration::days(3))),
            ("UC2".to_string(), None),
            ("UC3".to_string(), Some(now() + ChronoDuration::hours(1))),
        ];
        let plans = plan_sweep(
            &channels,
            SweepMode::Scheduled,
            now(),
            &RenewalPolicy::default(),
            "abcd1234",
            &mut rng,
        );
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0].task_id, "renew_UC1");
        assert_eq!(plans[1].task_id, renewal_task_id("UC2"));
        assert_eq!(plans[0].delay, Duration::from_secs(2 * DAY));
        assert_eq!(plans[1].delay, Duration::from_secs(60));
        assert_eq!(plans[2].delay, Duration::ZERO);
    }

    #[test]
    fn test_jittered_sweep_keeps_zero_delays() {
        let mut rng = StdRng::seed_from_u64(3);
        let channels = vec![
            ("UC1".to_string(), Some(now() + ChronoDuration::days(3))),
            ("UC2".to_string(), Some(now() - ChronoDuration::days(1))),
        ];
        let plans = plan_sweep(
            &channels,
            SweepMode::Jittered,
            now(),
            &RenewalPolicy::default(),
            "tag",
            &mut rng,
        );
        assert!(plans[0].delay < Duration::from_secs(2 * DAY));
        assert_eq!(plans[1].delay, Duration::ZERO);
    }

    #[test]
    fn test_immediate_sweep_is_single_task() {
        let mut rng = StdRng::seed_from_u64(3);
        let channels = vec![("UC1".to_string(), None), ("UC2".to_string(), None)];
        let plans = plan_sweep(
            &channels,
            SweepMode::Immediate,
            now(),
            &RenewalPolicy::default(),
            "tag",
            &mut rng,
        );
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].task_id, "renew_all_tag");
        assert_eq!(plans[0].channel_ids, vec!["UC1".to_string(), "UC2".to_string()]);
        assert_eq!(plans[0].delay, Duration::ZERO);
    }

    #[test]
    fn test_sweep_tag_is_short() {
        assert_eq!(sweep_tag().len(), 8);
    }
}
