//! Warmup Engine
//!
//! A warming instance runs two concurrent activities under one supervised
//! task: a one-second ticker accruing `warmup_time` toward the 480-hour
//! target, and a send cycle that drips weighted, human-paced messages at
//! the other warming instances, seed numbers, or a shared group. The daily
//! quota guard is consulted before every send, reactions included; hitting
//! the limit pauses the instance until the next day.

use super::content::{available_kinds, draw_kind, ContentPools};
use super::targets::{select_targets, TargetPlan};
use crate::gateway::{GatewayClient, SendRequest};
use crate::limits::{PlanLimits, QuotaGuard};
use crate::pacing::{self, PauseBand};
use crate::runtime::{TaskKey, TaskSupervisor};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zapcast_common::config::WarmupConfigSection;
use zapcast_common::types::{MessageKind, Plan, UserId};
use zapcast_storage::models::WarmupStats;
use zapcast_storage::repository::{
    InstanceRepository, MediaStatsRepository, UserRepository, WarmupStatsRepository,
};

/// Warmup engine errors
#[derive(Error, Debug)]
pub enum WarmupError {
    #[error("User not found")]
    UserNotFound,

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Instance is not connected: {0}")]
    InstanceNotConnected(String),

    #[error("No content available for the user's plan")]
    NoUsableContent,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Per-request warmup configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WarmupSettings {
    /// Instances to warm together
    pub instances: Vec<String>,

    /// Content pools to draw from
    pub contents: ContentPools,

    /// User-configured daily limit, clamped to the plan ceiling
    #[serde(default)]
    pub message_limit: Option<i64>,

    /// Chance of reacting to a just-sent text
    #[serde(default = "default_reaction_chance")]
    pub reaction_chance: f64,

    #[serde(default)]
    pub group_chance: Option<f64>,

    #[serde(default)]
    pub external_numbers_chance: Option<f64>,

    #[serde(default)]
    pub group_id: Option<String>,

    #[serde(default)]
    pub external_numbers: Vec<String>,
}

fn default_reaction_chance() -> f64 {
    0.3
}

/// Warmup Engine
#[derive(Clone)]
pub struct WarmupEngine {
    warmup_stats_repo: WarmupStatsRepository,
    instance_repo: InstanceRepository,
    user_repo: UserRepository,
    media_stats_repo: MediaStatsRepository,
    gateway: GatewayClient,
    quota: QuotaGuard,
    supervisor: TaskSupervisor,
    defaults: WarmupConfigSection,
}

impl WarmupEngine {
    /// Create a new warmup engine
    pub fn new(
        pool: PgPool,
        gateway: GatewayClient,
        supervisor: TaskSupervisor,
        defaults: WarmupConfigSection,
    ) -> Self {
        let media_stats_repo = MediaStatsRepository::new(pool.clone());
        let warmup_stats_repo = WarmupStatsRepository::new(pool.clone());
        Self {
            quota: QuotaGuard::new(media_stats_repo.clone(), warmup_stats_repo.clone()),
            warmup_stats_repo,
            instance_repo: InstanceRepository::new(pool.clone()),
            user_repo: UserRepository::new(pool.clone()),
            media_stats_repo,
            gateway,
            supervisor,
            defaults,
        }
    }

    /// Start (or restart) warmup for every instance in `settings`. Each
    /// instance gets its own supervised loop; the group warms by chatting
    /// with one another.
    pub async fn start(
        &self,
        user_id: UserId,
        settings: WarmupSettings,
    ) -> Result<Vec<String>, WarmupError> {
        let user = self
            .user_repo
            .get(user_id)
            .await?
            .ok_or(WarmupError::UserNotFound)?;
        let plan = Plan::parse(&user.plan).unwrap_or(Plan::Free);
        let limits = PlanLimits::for_plan(plan);

        if available_kinds(&settings.contents, &limits, true).is_empty() {
            return Err(WarmupError::NoUsableContent);
        }

        // Resolve instances and their own numbers up front so self-targeting
        // can be excluded per sender.
        let mut peers = Vec::new();
        for name in &settings.instances {
            let instance = self
                .instance_repo
                .get_by_name(name)
                .await?
                .ok_or_else(|| WarmupError::InstanceNotFound(name.clone()))?;
            if !instance.is_connected() {
                return Err(WarmupError::InstanceNotConnected(name.clone()));
            }
            peers.push(instance);
        }

        let peer_numbers: Vec<String> = peers
            .iter()
            .filter_map(|i| i.owner_jid.clone())
            .collect();

        self.supervisor.reap_finished().await;

        let mut started = Vec::new();
        for instance in peers {
            self.warmup_stats_repo
                .upsert_active(&instance.instance_name, user_id)
                .await?;

            let key = TaskKey::Warmup {
                instance_name: instance.instance_name.clone(),
            };
            let engine = self.clone();
            let settings = settings.clone();
            let peer_numbers = peer_numbers.clone();
            let instance_name = instance.instance_name.clone();
            let owner_jid = instance.owner_jid.clone();

            self.supervisor
                .spawn(key, move |token| async move {
                    engine
                        .run_instance(
                            instance_name,
                            owner_jid,
                            plan,
                            settings,
                            peer_numbers,
                            token,
                        )
                        .await;
                })
                .await;

            started.push(instance.instance_name);
        }

        info!(user_id = %user_id, instances = started.len(), "warmup started");
        Ok(started)
    }

    /// Stop one instance's warmup and mark it paused
    pub async fn stop(&self, instance_name: &str) -> Result<bool, WarmupError> {
        let key = TaskKey::Warmup {
            instance_name: instance_name.to_string(),
        };
        let was_running = self.supervisor.cancel(&key).await;
        let transitioned = self.warmup_stats_repo.pause(instance_name).await?;
        Ok(was_running || transitioned)
    }

    /// Stop all of a user's warming instances
    pub async fn stop_all(&self, user_id: UserId) -> Result<Vec<String>, WarmupError> {
        let paused = self.warmup_stats_repo.pause_all(user_id).await?;
        for name in &paused {
            let key = TaskKey::Warmup {
                instance_name: name.clone(),
            };
            self.supervisor.cancel(&key).await;
        }
        info!(user_id = %user_id, stopped = paused.len(), "all warmups stopped");
        Ok(paused)
    }

    /// Warmup progress for one instance
    pub async fn stats(&self, instance_name: &str) -> Result<Option<WarmupStats>, WarmupError> {
        Ok(self.warmup_stats_repo.get(instance_name).await?)
    }

    async fn run_instance(
        &self,
        instance_name: String,
        owner_jid: Option<String>,
        plan: Plan,
        settings: WarmupSettings,
        peer_numbers: Vec<String>,
        token: CancellationToken,
    ) {
        info!(instance = %instance_name, "warmup loop started");

        // The ticker accrues active time while the cycle loop sends; the
        // child token stops the ticker when the cycle exits on its own.
        let ticker_token = token.child_token();
        let ticker = self.tick_warmup_time(&instance_name, ticker_token.clone());
        let cycles = async {
            self.run_cycles(
                &instance_name,
                owner_jid.as_deref(),
                plan,
                &settings,
                &peer_numbers,
                &token,
            )
            .await;
            ticker_token.cancel();
        };
        tokio::join!(cycles, ticker);

        if let Err(e) = self.warmup_stats_repo.pause(&instance_name).await {
            warn!(instance = %instance_name, error = %e, "failed to pause warmup stats");
        }
        info!(instance = %instance_name, "warmup loop finished");
    }

    /// One-second ticker accruing warmup_time while the row stays active
    async fn tick_warmup_time(&self, instance_name: &str, token: CancellationToken) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => {}
            }
            if let Err(e) = self
                .warmup_stats_repo
                .increment_warmup_time(instance_name, 1)
                .await
            {
                warn!(instance = %instance_name, error = %e, "failed to accrue warmup time");
            }
        }
    }

    async fn run_cycles(
        &self,
        instance_name: &str,
        owner_jid: Option<&str>,
        plan: Plan,
        settings: &WarmupSettings,
        peer_numbers: &[String],
        token: &CancellationToken,
    ) {
        let limits = PlanLimits::for_plan(plan);
        let group_chance = settings.group_chance.unwrap_or(self.defaults.group_chance);
        let external_chance = settings
            .external_numbers_chance
            .unwrap_or(self.defaults.external_numbers_chance);
        let group_id = settings
            .group_id
            .clone()
            .or_else(|| self.defaults.group_id.clone());
        let external_numbers: Vec<String> = if settings.external_numbers.is_empty() {
            self.defaults.external_numbers.clone()
        } else {
            settings.external_numbers.clone()
        };

        while !token.is_cancelled() {
            // An externally paused row stops the loop too
            match self.warmup_stats_repo.get(instance_name).await {
                Ok(Some(stats)) if stats.status == "active" => {}
                Ok(_) => {
                    debug!(instance = %instance_name, "warmup no longer active");
                    return;
                }
                Err(e) => {
                    warn!(instance = %instance_name, error = %e, "failed to read warmup stats");
                    pacing::sleep_between(20, 40).await;
                    continue;
                }
            }

            let (group_draw, external_draw) = {
                let mut rng = rand::thread_rng();
                (rng.gen::<f64>(), rng.gen::<f64>())
            };
            let plan_targets = select_targets(
                group_chance,
                external_chance,
                group_id.as_deref(),
                &external_numbers,
                peer_numbers,
                owner_jid,
                group_draw,
                external_draw,
            );

            let targets = match plan_targets {
                TargetPlan::Group(id) => vec![id],
                TargetPlan::Direct(numbers) => numbers,
            };

            for target in targets {
                if token.is_cancelled() {
                    return;
                }

                // Quota before every send; a multi-target cycle must
                // not run past the daily limit mid-cycle.
                match self
                    .quota
                    .check(instance_name, plan, settings.message_limit, Utc::now())
                    .await
                {
                    Ok(decision) if decision.is_allowed() => {}
                    Ok(_) => {
                        info!(instance = %instance_name, "daily limit reached, warmup pausing");
                        return;
                    }
                    Err(e) => {
                        warn!(instance = %instance_name, error = %e, "quota check failed");
                        break;
                    }
                }

                if !self
                    .send_warmup_message(instance_name, &target, plan, &limits, settings, token)
                    .await
                {
                    return;
                }

                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = pacing::pause(PauseBand::INTER_MESSAGE) => {}
                }
            }

            tokio::select! {
                _ = token.cancelled() => return,
                _ = pacing::pause(PauseBand::INTER_CYCLE) => {}
            }
        }
    }

    /// Send one weighted warmup message, possibly followed by a reaction.
    /// Returns false when the loop should stop.
    async fn send_warmup_message(
        &self,
        instance_name: &str,
        target: &str,
        plan: Plan,
        limits: &PlanLimits,
        settings: &WarmupSettings,
        token: &CancellationToken,
    ) -> bool {
        let kinds = available_kinds(&settings.contents, limits, false);
        let Some(kind) = draw_kind(&kinds) else {
            warn!(instance = %instance_name, "no usable content, stopping warmup");
            return false;
        };

        // Simulated typing/recording pause for the kind
        tokio::select! {
            _ = token.cancelled() => return false,
            _ = pacing::pause(PauseBand::for_kind(kind)) => {}
        }

        let Some(request) = build_warmup_request(instance_name, target, kind, settings) else {
            return true;
        };

        let message_id = match self.gateway.send(&request).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    instance = %instance_name,
                    target = %target,
                    kind = %kind,
                    error = %e,
                    "warmup send failed"
                );
                return true;
            }
        };

        debug!(instance = %instance_name, kind = %kind, "warmup message sent");
        if let Err(e) = self
            .media_stats_repo
            .record_send(instance_name, kind, Utc::now())
            .await
        {
            warn!(instance = %instance_name, error = %e, "failed to record media stats");
        }

        // Sometimes react to our own text, the way people do in groups
        if kind == MessageKind::Text
            && settings.contents.has(MessageKind::Reaction)
            && limits.allows(MessageKind::Reaction)
            && rand::thread_rng().gen::<f64>() < settings.reaction_chance
        {
            tokio::select! {
                _ = token.cancelled() => return false,
                _ = pacing::sleep_between(2, 4) => {}
            }

            // The reaction is a send of its own and counts against the
            // daily limit like any other.
            match self
                .quota
                .check(instance_name, plan, settings.message_limit, Utc::now())
                .await
            {
                Ok(decision) if decision.is_allowed() => {}
                Ok(_) => {
                    info!(instance = %instance_name, "daily limit reached, warmup pausing");
                    return false;
                }
                Err(e) => {
                    warn!(instance = %instance_name, error = %e, "quota check failed");
                    return true;
                }
            }

            if let Some(reaction) = build_reaction_request(
                instance_name,
                target,
                &message_id,
                &settings.contents,
            ) {
                match self.gateway.send(&reaction).await {
                    Ok(_) => {
                        if let Err(e) = self
                            .media_stats_repo
                            .record_send(instance_name, MessageKind::Reaction, Utc::now())
                            .await
                        {
                            warn!(instance = %instance_name, error = %e, "failed to record media stats");
                        }
                    }
                    Err(e) => {
                        warn!(instance = %instance_name, error = %e, "reaction send failed");
                    }
                }
            }
        }

        true
    }
}

fn build_warmup_request(
    instance_name: &str,
    target: &str,
    kind: MessageKind,
    settings: &WarmupSettings,
) -> Option<SendRequest> {
    let mut request = SendRequest {
        instance_name: instance_name.to_string(),
        phone: target.to_string(),
        kind,
        text: None,
        media: None,
        reacted_message_id: None,
        reaction: None,
    };

    match kind {
        MessageKind::Text => {
            request.text = Some(settings.contents.pick_text()?.clone());
        }
        MessageKind::Reaction => return None,
        _ => {
            request.media = Some(settings.contents.pick_media(kind)?.clone());
        }
    }

    Some(request)
}

fn build_reaction_request(
    instance_name: &str,
    target: &str,
    message_id: &str,
    contents: &ContentPools,
) -> Option<SendRequest> {
    Some(SendRequest {
        instance_name: instance_name.to_string(),
        phone: target.to_string(),
        kind: MessageKind::Reaction,
        text: None,
        media: None,
        reacted_message_id: Some(message_id.to_string()),
        reaction: Some(contents.pick_emoji()?.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings() -> WarmupSettings {
        WarmupSettings {
            instances: vec!["inst-a".to_string()],
            contents: ContentPools {
                texts: vec!["bom dia".to_string()],
                emojis: vec!["🔥".to_string()],
                ..Default::default()
            },
            message_limit: None,
            reaction_chance: 0.3,
            group_chance: None,
            external_numbers_chance: None,
            group_id: None,
            external_numbers: Vec::new(),
        }
    }

    #[test]
    fn test_text_request_drawn_from_pool() {
        let request =
            build_warmup_request("inst-a", "5511000000002", MessageKind::Text, &settings())
                .unwrap();
        assert_eq!(request.text.as_deref(), Some("bom dia"));
        assert_eq!(request.kind, MessageKind::Text);
    }

    #[test]
    fn test_media_request_needs_pool_content() {
        let request =
            build_warmup_request("inst-a", "5511000000002", MessageKind::Sticker, &settings());
        assert!(request.is_none());
    }

    #[test]
    fn test_reaction_request_targets_original_message() {
        let request =
            build_reaction_request("inst-a", "5511000000002", "MSG1", &settings().contents)
                .unwrap();
        assert_eq!(request.reacted_message_id.as_deref(), Some("MSG1"));
        assert_eq!(request.reaction.as_deref(), Some("🔥"));
    }

    #[test]
    fn test_settings_parse_with_defaults() {
        let json = serde_json::json!({
            "instances": ["inst-a", "inst-b"],
            "contents": { "texts": ["oi"] },
        });
        let parsed: WarmupSettings = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.instances.len(), 2);
        assert_eq!(parsed.reaction_chance, 0.3);
        assert!(parsed.message_limit.is_none());
    }
}
