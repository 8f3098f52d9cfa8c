//! Plan limits and the daily quota guard
//!
//! Each plan carries a default daily allowance, a ceiling that user-supplied
//! limits are clamped to, and the set of message kinds it may send. The
//! quota guard reads today's counter row before every send; hitting the
//! ceiling pauses the instance's warmup rather than silently dropping sends.

use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::{debug, info};
use zapcast_common::types::{MessageKind, Plan};
use zapcast_common::{Error, Result};
use zapcast_storage::repository::{MediaStatsRepository, WarmupStatsRepository};

/// Static limits for one plan tier
#[derive(Debug, Clone, Copy)]
pub struct PlanLimits {
    /// Connected instances allowed, None = unlimited
    pub instances: Option<u32>,
    /// Default daily message allowance, None = unlimited
    pub messages_per_day: Option<i64>,
    /// Ceiling for user-configured daily limits, None = unlimited
    pub max_messages_per_day: Option<i64>,
    /// Message kinds the plan may send
    pub features: &'static [MessageKind],
}

impl PlanLimits {
    /// Limits table for a plan
    pub const fn for_plan(plan: Plan) -> Self {
        use MessageKind::*;
        match plan {
            Plan::Free => Self {
                instances: Some(2),
                messages_per_day: Some(20),
                max_messages_per_day: Some(10),
                features: &[Text],
            },
            Plan::Basic => Self {
                instances: Some(2),
                messages_per_day: Some(50),
                max_messages_per_day: Some(100),
                features: &[Text, Reaction],
            },
            Plan::Pro => Self {
                instances: Some(5),
                messages_per_day: Some(500),
                max_messages_per_day: Some(1000),
                features: &[Text, Audio, Reaction, Sticker],
            },
            Plan::Enterprise => Self {
                instances: None,
                messages_per_day: None,
                max_messages_per_day: None,
                features: &[Text, Audio, Image, Video, Reaction, Sticker],
            },
        }
    }

    /// Whether the plan may send this kind at all
    pub fn allows(&self, kind: MessageKind) -> bool {
        self.features.contains(&kind)
    }

    /// The daily limit in force for this plan given an optional
    /// user-configured value. A custom limit never exceeds the plan
    /// ceiling; absent a custom limit the plan default applies.
    /// None means unlimited.
    pub fn effective_daily_limit(&self, custom: Option<i64>) -> Option<i64> {
        match custom {
            Some(c) if c > 0 => match self.max_messages_per_day {
                Some(max) => Some(c.min(max)),
                None => None,
            },
            _ => self.messages_per_day,
        }
    }
}

/// Outcome of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Under the limit; `remaining` sends left today
    Allowed { sent_today: i64, remaining: Option<i64> },
    /// At or over the limit; the instance's warmup was paused
    Exceeded { sent_today: i64, limit: i64 },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed { .. })
    }
}

/// Source of today's send count for an instance
pub trait SentCounter {
    fn sent_today(
        &self,
        instance_name: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = std::result::Result<i64, sqlx::Error>> + Send;
}

impl SentCounter for MediaStatsRepository {
    async fn sent_today(
        &self,
        instance_name: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<i64, sqlx::Error> {
        self.total_daily(instance_name, now).await
    }
}

/// Side effect applied when an instance hits its daily limit
pub trait WarmupBrake {
    fn pause_warmup(
        &self,
        instance_name: &str,
    ) -> impl Future<Output = std::result::Result<bool, sqlx::Error>> + Send;
}

impl WarmupBrake for WarmupStatsRepository {
    async fn pause_warmup(&self, instance_name: &str) -> std::result::Result<bool, sqlx::Error> {
        self.pause(instance_name).await
    }
}

/// Daily quota guard, consulted before every outbound message
#[derive(Clone)]
pub struct QuotaGuard<C = MediaStatsRepository, B = WarmupStatsRepository> {
    counter: C,
    brake: B,
}

impl<C: SentCounter, B: WarmupBrake> QuotaGuard<C, B> {
    /// Create a new quota guard
    pub fn new(counter: C, brake: B) -> Self {
        Self { counter, brake }
    }

    /// Check whether `instance_name` may send one more message today.
    /// When the limit is reached the instance's warmup is paused as a side
    /// effect, so the engine stops generating traffic until the next day.
    pub async fn check(
        &self,
        instance_name: &str,
        plan: Plan,
        custom_limit: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision> {
        let limits = PlanLimits::for_plan(plan);

        let sent_today = self
            .counter
            .sent_today(instance_name, now)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let Some(limit) = limits.effective_daily_limit(custom_limit) else {
            return Ok(QuotaDecision::Allowed {
                sent_today,
                remaining: None,
            });
        };

        if sent_today >= limit {
            info!(
                instance = instance_name,
                sent_today, limit, "daily message limit reached, pausing warmup"
            );
            self.brake
                .pause_warmup(instance_name)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

            return Ok(QuotaDecision::Exceeded { sent_today, limit });
        }

        debug!(
            instance = instance_name,
            sent_today,
            limit,
            remaining = limit - sent_today,
            "daily quota check passed"
        );

        Ok(QuotaDecision::Allowed {
            sent_today,
            remaining: Some(limit - sent_today),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct FixedCounter(i64);

    impl SentCounter for FixedCounter {
        async fn sent_today(
            &self,
            _instance_name: &str,
            _now: DateTime<Utc>,
        ) -> std::result::Result<i64, sqlx::Error> {
            Ok(self.0)
        }
    }

    /// Counter that advances by one after each read, like a loop that
    /// sends after every passed check.
    #[derive(Clone)]
    struct AdvancingCounter(Arc<Mutex<i64>>);

    impl SentCounter for AdvancingCounter {
        async fn sent_today(
            &self,
            _instance_name: &str,
            _now: DateTime<Utc>,
        ) -> std::result::Result<i64, sqlx::Error> {
            let mut sent = self.0.lock().unwrap();
            let current = *sent;
            *sent += 1;
            Ok(current)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingBrake {
        paused: Arc<Mutex<Vec<String>>>,
    }

    impl WarmupBrake for RecordingBrake {
        async fn pause_warmup(
            &self,
            instance_name: &str,
        ) -> std::result::Result<bool, sqlx::Error> {
            self.paused.lock().unwrap().push(instance_name.to_string());
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_one_below_limit_permits_one_more() {
        let brake = RecordingBrake::default();
        let guard = QuotaGuard::new(FixedCounter(19), brake.clone());

        let decision = guard
            .check("inst-a", Plan::Free, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            decision,
            QuotaDecision::Allowed {
                sent_today: 19,
                remaining: Some(1),
            }
        );
        assert!(brake.paused.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_at_limit_rejects_and_pauses_warmup() {
        let brake = RecordingBrake::default();
        let guard = QuotaGuard::new(FixedCounter(20), brake.clone());

        let decision = guard
            .check("inst-a", Plan::Free, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            decision,
            QuotaDecision::Exceeded {
                sent_today: 20,
                limit: 20,
            }
        );
        assert_eq!(*brake.paused.lock().unwrap(), vec!["inst-a".to_string()]);
    }

    #[tokio::test]
    async fn test_unlimited_plan_never_pauses() {
        let brake = RecordingBrake::default();
        let guard = QuotaGuard::new(FixedCounter(1_000_000), brake.clone());

        let decision = guard
            .check("inst-a", Plan::Enterprise, Some(10), Utc::now())
            .await
            .unwrap();
        assert_eq!(
            decision,
            QuotaDecision::Allowed {
                sent_today: 1_000_000,
                remaining: None,
            }
        );
        assert!(brake.paused.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checking_before_each_send_stops_at_limit() {
        let brake = RecordingBrake::default();
        let guard = QuotaGuard::new(AdvancingCounter(Arc::new(Mutex::new(18))), brake.clone());

        let mut allowed = 0;
        loop {
            let decision = guard
                .check("inst-a", Plan::Free, None, Utc::now())
                .await
                .unwrap();
            if !decision.is_allowed() {
                break;
            }
            allowed += 1;
        }

        assert_eq!(allowed, 2);
        assert_eq!(brake.paused.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_custom_limit_clamped_to_plan_ceiling() {
        let free = PlanLimits::for_plan(Plan::Free);
        assert_eq!(free.effective_daily_limit(Some(50)), Some(10));
        assert_eq!(free.effective_daily_limit(Some(5)), Some(5));
    }

    #[test]
    fn test_default_limit_when_no_custom() {
        assert_eq!(
            PlanLimits::for_plan(Plan::Free).effective_daily_limit(None),
            Some(20)
        );
        assert_eq!(
            PlanLimits::for_plan(Plan::Basic).effective_daily_limit(None),
            Some(50)
        );
        assert_eq!(
            PlanLimits::for_plan(Plan::Pro).effective_daily_limit(None),
            Some(500)
        );
    }

    #[test]
    fn test_zero_or_negative_custom_falls_back_to_default() {
        let pro = PlanLimits::for_plan(Plan::Pro);
        assert_eq!(pro.effective_daily_limit(Some(0)), Some(500));
        assert_eq!(pro.effective_daily_limit(Some(-3)), Some(500));
    }

    #[test]
    fn test_enterprise_is_unlimited() {
        let ent = PlanLimits::for_plan(Plan::Enterprise);
        assert_eq!(ent.effective_daily_limit(None), None);
        assert_eq!(ent.effective_daily_limit(Some(100_000)), None);
    }

    #[test]
    fn test_plan_features() {
        assert!(PlanLimits::for_plan(Plan::Free).allows(MessageKind::Text));
        assert!(!PlanLimits::for_plan(Plan::Free).allows(MessageKind::Audio));
        assert!(PlanLimits::for_plan(Plan::Basic).allows(MessageKind::Reaction));
        assert!(!PlanLimits::for_plan(Plan::Pro).allows(MessageKind::Image));
        assert!(PlanLimits::for_plan(Plan::Enterprise).allows(MessageKind::Video));
    }
}
