//! Campaign Dispatcher - drives lead sends across rotation instances
//!
//! Starting a campaign partitions its pending leads across the connected
//! rotation instances and spawns one supervised loop per instance. Loops
//! are strictly sequential within an instance and independent across
//! instances; pausing cancels exactly this campaign's loops and nothing
//! else.

use super::distributor::{distribute_leads, InstanceAssignment};
use crate::gateway::{GatewayClient, MediaPayload, SendRequest};
use crate::pacing;
use crate::runtime::{TaskKey, TaskSupervisor};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use zapcast_common::types::{CampaignId, CampaignStatus, MessageKind, RotationStrategy};
use zapcast_storage::models::{Campaign, CreateDispatch, CreateMessageLog, Lead};
use zapcast_storage::repository::{
    CampaignRepository, DispatchRepository, InstanceRepository, LeadRepository,
    LeadStatusCounts, MediaStatsRepository, MessageLogRepository,
};

/// Campaign dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Campaign is already running")]
    AlreadyRunning,

    #[error("Campaign is not paused")]
    NotPaused,

    #[error("Campaign is not running")]
    NotRunning,

    #[error("Campaign has no message or media content")]
    NoContent,

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Campaign has no leads to send")]
    NoLeads,

    #[error("No connected instances available for dispatch")]
    NoConnectedInstances,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Campaign status snapshot for the stats endpoint
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub campaign_id: CampaignId,
    pub status: String,
    pub progress: i32,
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub sent: i64,
    pub delivered: i64,
    pub read: i64,
    pub failed: i64,
}

impl DispatchSummary {
    fn from_counts(campaign: &Campaign, counts: &LeadStatusCounts) -> Self {
        Self {
            campaign_id: campaign.id,
            status: campaign.status.clone(),
            progress: counts.progress(),
            total: counts.total(),
            pending: counts.pending,
            processing: counts.processing,
            sent: counts.sent,
            delivered: counts.delivered,
            read: counts.read,
            failed: counts.failed,
        }
    }
}

/// Campaign Dispatcher
#[derive(Clone)]
pub struct CampaignDispatcher {
    campaign_repo: CampaignRepository,
    lead_repo: LeadRepository,
    instance_repo: InstanceRepository,
    dispatch_repo: DispatchRepository,
    message_log_repo: MessageLogRepository,
    media_stats_repo: MediaStatsRepository,
    gateway: GatewayClient,
    supervisor: TaskSupervisor,
}

impl CampaignDispatcher {
    /// Create a new campaign dispatcher
    pub fn new(pool: PgPool, gateway: GatewayClient, supervisor: TaskSupervisor) -> Self {
        Self {
            campaign_repo: CampaignRepository::new(pool.clone()),
            lead_repo: LeadRepository::new(pool.clone()),
            instance_repo: InstanceRepository::new(pool.clone()),
            dispatch_repo: DispatchRepository::new(pool.clone()),
            message_log_repo: MessageLogRepository::new(pool.clone()),
            media_stats_repo: MediaStatsRepository::new(pool),
            gateway,
            supervisor,
        }
    }

    /// Start a campaign from the beginning. Previously processed leads are
    /// reset to PENDING first, so a start is always a full (re)run.
    pub async fn start(
        &self,
        campaign_id: CampaignId,
    ) -> Result<DispatchSummary, DispatchError> {
        let campaign = self
            .campaign_repo
            .get(campaign_id)
            .await?
            .ok_or(DispatchError::NotFound)?;

        if campaign.status == "running" {
            return Err(DispatchError::AlreadyRunning);
        }

        validate_content(&campaign)?;

        let reset = self.lead_repo.reset_for_restart(campaign_id).await?;
        if reset > 0 {
            info!(campaign_id = %campaign_id, reset, "reset previously processed leads");
        }

        let leads = self.lead_repo.list_pending(campaign_id).await?;
        if leads.is_empty() {
            return Err(DispatchError::NoLeads);
        }

        self.launch(&campaign, leads).await
    }

    /// Resume a paused campaign. Leads stuck in `processing` from the pause
    /// are requeued; terminal leads keep their state.
    pub async fn resume(
        &self,
        campaign_id: CampaignId,
    ) -> Result<DispatchSummary, DispatchError> {
        let campaign = self
            .campaign_repo
            .get(campaign_id)
            .await?
            .ok_or(DispatchError::NotFound)?;

        if campaign.status != "paused" {
            return Err(DispatchError::NotPaused);
        }

        validate_content(&campaign)?;

        let requeued = self.lead_repo.requeue_processing(campaign_id).await?;
        if requeued > 0 {
            debug!(campaign_id = %campaign_id, requeued, "requeued in-flight leads");
        }

        let leads = self.lead_repo.list_resumable(campaign_id).await?;
        if leads.is_empty() {
            return Err(DispatchError::NoLeads);
        }

        info!(
            campaign_id = %campaign_id,
            remaining = leads.len(),
            "resuming campaign"
        );

        self.launch(&campaign, leads).await
    }

    /// Pause a running campaign: cancel its loops and mark it paused.
    /// In-flight leads stay `processing` until a resume requeues them.
    pub async fn pause(&self, campaign_id: CampaignId) -> Result<DispatchSummary, DispatchError> {
        let campaign = self
            .campaign_repo
            .get(campaign_id)
            .await?
            .ok_or(DispatchError::NotFound)?;

        if campaign.status != "running" {
            return Err(DispatchError::NotRunning);
        }

        let cancelled = self.supervisor.cancel_campaign(campaign_id).await;
        info!(campaign_id = %campaign_id, cancelled, "campaign paused");

        let campaign = self
            .campaign_repo
            .update_status(campaign_id, CampaignStatus::Paused)
            .await?
            .ok_or(DispatchError::NotFound)?;

        let counts = self.lead_repo.status_counts(campaign_id).await?;
        Ok(DispatchSummary::from_counts(&campaign, &counts))
    }

    /// Current status and lead counts for a campaign
    pub async fn stats(&self, campaign_id: CampaignId) -> Result<DispatchSummary, DispatchError> {
        let campaign = self
            .campaign_repo
            .get(campaign_id)
            .await?
            .ok_or(DispatchError::NotFound)?;

        let counts = self.lead_repo.status_counts(campaign_id).await?;
        Ok(DispatchSummary::from_counts(&campaign, &counts))
    }

    async fn launch(
        &self,
        campaign: &Campaign,
        leads: Vec<Lead>,
    ) -> Result<DispatchSummary, DispatchError> {
        let selected = campaign.selected_instance_names();
        if selected.is_empty() {
            return Err(DispatchError::NoConnectedInstances);
        }

        let connected = self.instance_repo.list_connected(&selected).await?;
        if connected.is_empty() {
            return Err(DispatchError::NoConnectedInstances);
        }

        let instance_names: Vec<String> = if campaign.use_rotation {
            connected.iter().map(|i| i.instance_name.clone()).collect()
        } else {
            // Rotation disabled: everything goes through the first
            // connected instance.
            vec![connected[0].instance_name.clone()]
        };

        let strategy = campaign
            .rotation_strategy
            .as_deref()
            .and_then(RotationStrategy::parse)
            .unwrap_or(RotationStrategy::Random);

        let cap = per_instance_cap(campaign.max_messages_per_instance);

        let assignments = distribute_leads(leads, &instance_names, strategy, cap);
        if assignments.is_empty() {
            return Err(DispatchError::NoLeads);
        }

        let campaign = self
            .campaign_repo
            .update_status(campaign.id, CampaignStatus::Running)
            .await?
            .ok_or(DispatchError::NotFound)?;

        let counts = self.lead_repo.status_counts(campaign.id).await?;
        self.campaign_repo
            .upsert_statistics(
                campaign.id,
                counts.total(),
                counts.successful(),
                counts.failed,
            )
            .await?;

        info!(
            campaign_id = %campaign.id,
            instances = assignments.len(),
            strategy = ?strategy,
            "starting campaign dispatch"
        );

        self.supervisor.reap_finished().await;
        for assignment in assignments {
            self.spawn_instance_loop(&campaign, assignment).await?;
        }

        Ok(DispatchSummary::from_counts(&campaign, &counts))
    }

    async fn spawn_instance_loop(
        &self,
        campaign: &Campaign,
        assignment: InstanceAssignment,
    ) -> Result<(), DispatchError> {
        let dispatch = self
            .dispatch_repo
            .create(CreateDispatch {
                campaign_id: campaign.id,
                instance_name: assignment.instance_name.clone(),
            })
            .await?;

        let key = TaskKey::CampaignInstance {
            campaign_id: campaign.id,
            instance_name: assignment.instance_name.clone(),
        };

        let dispatcher = self.clone();
        let campaign = campaign.clone();
        self.supervisor
            .spawn(key, move |token| async move {
                dispatcher
                    .run_instance_loop(campaign, assignment, dispatch.id, token)
                    .await;
            })
            .await;

        Ok(())
    }

    /// Sequential send loop for one instance's share of a campaign
    async fn run_instance_loop(
        &self,
        campaign: Campaign,
        assignment: InstanceAssignment,
        dispatch_id: uuid::Uuid,
        token: tokio_util::sync::CancellationToken,
    ) {
        let instance = assignment.instance_name;
        let total = assignment.leads.len();
        info!(
            campaign_id = %campaign.id,
            instance = %instance,
            leads = total,
            "instance dispatch loop started"
        );

        let mut cancelled = false;
        for (i, lead) in assignment.leads.into_iter().enumerate() {
            if token.is_cancelled() {
                cancelled = true;
                break;
            }

            // Humanized pause before each send, except the very first
            if i > 0 {
                let delay = pacing::uniform_secs(
                    campaign.min_delay.max(0) as u64,
                    campaign.max_delay.max(0) as u64,
                );
                tokio::select! {
                    _ = token.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(std::time::Duration::from_secs(delay)) => {}
                }
            }

            if let Err(e) = self.send_one(&campaign, &instance, &lead).await {
                error!(
                    campaign_id = %campaign.id,
                    instance = %instance,
                    lead_id = %lead.id,
                    error = %e,
                    "lead processing error"
                );
            }

            self.refresh_progress(campaign.id).await;
        }

        let (dispatch_status, campaign_status) = exit_disposition(cancelled);
        self.finish_dispatch(dispatch_id, dispatch_status).await;
        match campaign_status {
            // Cancelled mid-run: park the campaign as paused so it stays
            // resumable even when the cancel came from a shutdown rather
            // than the pause endpoint.
            Some(status) => {
                if let Err(e) = self.campaign_repo.update_status(campaign.id, status).await {
                    warn!(campaign_id = %campaign.id, error = %e, "failed to mark campaign paused");
                }
            }
            None => self.finalize_if_done(campaign.id).await,
        }
        info!(
            campaign_id = %campaign.id,
            instance = %instance,
            cancelled,
            "instance dispatch loop finished"
        );
    }

    /// Claim, send, and record one lead
    async fn send_one(
        &self,
        campaign: &Campaign,
        instance: &str,
        lead: &Lead,
    ) -> Result<(), DispatchError> {
        if !self.lead_repo.mark_processing(lead.id).await? {
            debug!(lead_id = %lead.id, "lead already claimed or terminal, skipping");
            return Ok(());
        }

        let requests = match build_send_requests(campaign, instance, &lead.phone) {
            Ok(requests) => requests,
            Err(e) => {
                self.lead_repo.mark_failed(lead.id, &e.to_string()).await?;
                return Ok(());
            }
        };

        let mut last_message_id = None;
        for (kind, request) in requests {
            match self.gateway.send(&request).await {
                Ok(message_id) => {
                    let content = match kind {
                        MessageKind::Text => campaign.message.clone(),
                        _ => campaign.media_caption.clone(),
                    };
                    if let Err(e) = self
                        .message_log_repo
                        .create(CreateMessageLog {
                            message_id: message_id.clone(),
                            campaign_id: Some(campaign.id),
                            lead_id: Some(lead.id),
                            message_type: kind.as_str().to_string(),
                            content,
                            status: "SENT".to_string(),
                        })
                        .await
                    {
                        warn!(lead_id = %lead.id, error = %e, "failed to write message log");
                    }
                    if let Err(e) = self
                        .media_stats_repo
                        .record_send(instance, kind, Utc::now())
                        .await
                    {
                        warn!(instance = %instance, error = %e, "failed to record media stats");
                    }
                    last_message_id = Some(message_id);
                }
                Err(e) => {
                    warn!(
                        lead_id = %lead.id,
                        instance = %instance,
                        kind = %kind,
                        error = %e,
                        "send failed"
                    );
                    self.lead_repo.mark_failed(lead.id, &e.to_string()).await?;
                    return Ok(());
                }
            }
        }

        if let Some(message_id) = last_message_id {
            self.lead_repo.mark_sent(lead.id, &message_id).await?;
        }

        Ok(())
    }

    async fn refresh_progress(&self, campaign_id: CampaignId) {
        let counts = match self.lead_repo.status_counts(campaign_id).await {
            Ok(c) => c,
            Err(e) => {
                warn!(campaign_id = %campaign_id, error = %e, "failed to read lead counts");
                return;
            }
        };

        if let Err(e) = self
            .campaign_repo
            .set_progress(campaign_id, counts.progress())
            .await
        {
            warn!(campaign_id = %campaign_id, error = %e, "failed to update progress");
        }
        if let Err(e) = self
            .campaign_repo
            .upsert_statistics(
                campaign_id,
                counts.total(),
                counts.successful(),
                counts.failed,
            )
            .await
        {
            warn!(campaign_id = %campaign_id, error = %e, "failed to update statistics");
        }
    }

    async fn finish_dispatch(&self, dispatch_id: uuid::Uuid, status: &str) {
        if let Err(e) = self.dispatch_repo.complete(dispatch_id, status).await {
            warn!(dispatch_id = %dispatch_id, error = %e, "failed to close dispatch record");
        }
    }


    /// Mark the campaign completed once no lead can still advance
    async fn finalize_if_done(&self, campaign_id: CampaignId) {
        let counts = match self.lead_repo.status_counts(campaign_id).await {
            Ok(c) => c,
            Err(e) => {
                warn!(campaign_id = %campaign_id, error = %e, "failed to read lead counts");
                return;
            }
        };

        if counts.pending == 0 && counts.processing == 0 {
            info!(
                campaign_id = %campaign_id,
                sent = counts.successful(),
                failed = counts.failed,
                "campaign completed"
            );
            if let Err(e) = self
                .campaign_repo
                .update_status(campaign_id, CampaignStatus::Completed)
                .await
            {
                warn!(campaign_id = %campaign_id, error = %e, "failed to mark campaign completed");
            }
        }
    }
}

fn validate_content(campaign: &Campaign) -> Result<(), DispatchError> {
    let has_text = campaign
        .message
        .as_deref()
        .is_some_and(|m| !m.trim().is_empty());
    let has_media = campaign.media_type.is_some() && campaign.media_content.is_some();

    if !has_text && !has_media {
        return Err(DispatchError::NoContent);
    }

    if let Some(media_type) = campaign.media_type.as_deref() {
        campaign_media_kind(media_type)?;
    }

    Ok(())
}

fn campaign_media_kind(media_type: &str) -> Result<MessageKind, DispatchError> {
    match media_type {
        "image" => Ok(MessageKind::Image),
        "video" => Ok(MessageKind::Video),
        "audio" => Ok(MessageKind::Audio),
        other => Err(DispatchError::UnsupportedMediaType(other.to_string())),
    }
}

/// Per-lead send plan: media first when present, then the text message.
/// A campaign may carry both, and each goes out as its own message.
fn build_send_requests(
    campaign: &Campaign,
    instance: &str,
    phone: &str,
) -> Result<Vec<(MessageKind, SendRequest)>, DispatchError> {
    let mut requests = Vec::new();

    if let (Some(media_type), Some(content)) =
        (campaign.media_type.as_deref(), campaign.media_content.as_ref())
    {
        let kind = campaign_media_kind(media_type)?;
        requests.push((
            kind,
            SendRequest {
                instance_name: instance.to_string(),
                phone: phone.to_string(),
                kind,
                text: None,
                media: Some(MediaPayload {
                    base64: content.clone(),
                    caption: campaign.media_caption.clone(),
                    file_name: None,
                    mimetype: None,
                }),
                reacted_message_id: None,
                reaction: None,
            },
        ));
    }

    if let Some(text) = campaign
        .message
        .as_deref()
        .filter(|m| !m.trim().is_empty())
    {
        requests.push((
            MessageKind::Text,
            SendRequest {
                instance_name: instance.to_string(),
                phone: phone.to_string(),
                kind: MessageKind::Text,
                text: Some(text.to_string()),
                media: None,
                reacted_message_id: None,
                reaction: None,
            },
        ));
    }

    if requests.is_empty() {
        return Err(DispatchError::NoContent);
    }
    Ok(requests)
}

/// Dispatch record status and campaign transition for a loop exit
fn exit_disposition(cancelled: bool) -> (&'static str, Option<CampaignStatus>) {
    if cancelled {
        ("cancelled", Some(CampaignStatus::Paused))
    } else {
        ("completed", None)
    }
}

/// Leads per instance: campaign cap when set, otherwise no limit
fn per_instance_cap(max_messages_per_instance: Option<i32>) -> usize {
    max_messages_per_instance
        .filter(|&n| n > 0)
        .map(|n| n as usize)
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn campaign() -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "launch".to_string(),
            message: Some("hello".to_string()),
            media_type: None,
            media_content: None,
            media_caption: None,
            min_delay: 5,
            max_delay: 30,
            use_rotation: true,
            rotation_strategy: Some("RANDOM".to_string()),
            selected_instances: serde_json::json!(["a", "b"]),
            max_messages_per_instance: Some(100),
            status: "draft".to_string(),
            progress: 0,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_content_validation_requires_text_or_media() {
        let mut c = campaign();
        assert!(validate_content(&c).is_ok());

        c.message = Some("   ".to_string());
        assert!(matches!(validate_content(&c), Err(DispatchError::NoContent)));

        c.media_type = Some("image".to_string());
        c.media_content = Some("QUFB".to_string());
        assert!(validate_content(&c).is_ok());
    }

    #[test]
    fn test_sticker_campaigns_are_rejected() {
        let mut c = campaign();
        c.media_type = Some("sticker".to_string());
        c.media_content = Some("QUFB".to_string());
        assert!(matches!(
            validate_content(&c),
            Err(DispatchError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn test_media_campaign_keeps_its_text() {
        let mut c = campaign();
        c.message = Some("promo text".to_string());
        c.media_type = Some("image".to_string());
        c.media_content = Some("QUFB".to_string());
        c.media_caption = Some("watch this".to_string());

        let requests = build_send_requests(&c, "inst-a", "5511999999999").unwrap();
        assert_eq!(requests.len(), 2);

        let (kind, media_request) = &requests[0];
        assert_eq!(*kind, MessageKind::Image);
        assert!(media_request.text.is_none());
        assert_eq!(
            media_request.media.as_ref().unwrap().caption.as_deref(),
            Some("watch this")
        );

        let (kind, text_request) = &requests[1];
        assert_eq!(*kind, MessageKind::Text);
        assert_eq!(text_request.text.as_deref(), Some("promo text"));
    }

    #[test]
    fn test_media_only_campaign_builds_single_request() {
        let mut c = campaign();
        c.message = None;
        c.media_type = Some("video".to_string());
        c.media_content = Some("QUFB".to_string());

        let requests = build_send_requests(&c, "inst-a", "5511999999999").unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, MessageKind::Video);
    }

    #[test]
    fn test_text_request_carries_message() {
        let c = campaign();
        let requests = build_send_requests(&c, "inst-a", "5511999999999").unwrap();
        assert_eq!(requests.len(), 1);
        let (kind, request) = &requests[0];
        assert_eq!(*kind, MessageKind::Text);
        assert_eq!(request.text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_blank_campaign_has_no_requests() {
        let mut c = campaign();
        c.message = Some("   ".to_string());
        assert!(matches!(
            build_send_requests(&c, "inst-a", "5511999999999"),
            Err(DispatchError::NoContent)
        ));
    }

    #[test]
    fn test_cancelled_loop_parks_campaign_as_paused() {
        let (dispatch_status, campaign_status) = exit_disposition(true);
        assert_eq!(dispatch_status, "cancelled");
        assert_eq!(campaign_status, Some(CampaignStatus::Paused));

        let (dispatch_status, campaign_status) = exit_disposition(false);
        assert_eq!(dispatch_status, "completed");
        assert_eq!(campaign_status, None);
    }

    #[test]
    fn test_unset_cap_means_unlimited() {
        assert_eq!(per_instance_cap(None), usize::MAX);
        assert_eq!(per_instance_cap(Some(0)), usize::MAX);
        assert_eq!(per_instance_cap(Some(-1)), usize::MAX);
        assert_eq!(per_instance_cap(Some(40)), 40);
    }
}
