//! Database models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use zapcast_common::types::{CampaignId, DispatchId, InstanceId, LeadId, UserId};

/// User model. Only the fields the quota guard and plan gating need; the
/// full account lives in the auth service.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub plan: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// WhatsApp instance model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub user_id: UserId,
    pub instance_name: String,
    pub connection_status: String,
    /// The instance's own number, used to avoid self-targeting in warmup
    pub owner_jid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn is_connected(&self) -> bool {
        self.connection_status == "OPEN"
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub user_id: UserId,
    pub name: String,
    pub message: Option<String>,
    pub media_type: Option<String>,
    pub media_content: Option<String>,
    pub media_caption: Option<String>,
    pub min_delay: i32,
    pub max_delay: i32,
    pub use_rotation: bool,
    pub rotation_strategy: Option<String>,
    /// Instance names participating in rotation, stored as a JSON array
    pub selected_instances: serde_json::Value,
    pub max_messages_per_instance: Option<i32>,
    pub status: String,
    pub progress: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Instance names selected for rotation
    pub fn selected_instance_names(&self) -> Vec<String> {
        serde_json::from_value(self.selected_instances.clone()).unwrap_or_default()
    }
}

/// Campaign lead model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub campaign_id: CampaignId,
    pub name: Option<String>,
    pub phone: String,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    /// Provider-assigned message id, set on successful send
    pub message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable record of one start of a campaign against one instance.
/// Multiple dispatches accumulate across pause/resume cycles.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Dispatch {
    pub id: DispatchId,
    pub campaign_id: CampaignId,
    pub instance_name: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Aggregate campaign statistics, refreshed as the dispatcher advances
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignStatistics {
    pub campaign_id: CampaignId,
    pub total_leads: i32,
    pub sent_count: i32,
    pub failed_count: i32,
    pub updated_at: DateTime<Utc>,
}

/// Warmup state for one instance
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WarmupStats {
    pub id: Uuid,
    pub instance_name: String,
    pub user_id: UserId,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub pause_time: Option<DateTime<Utc>>,
    /// Cumulative warm-up time in seconds, accrued as wall-clock presence
    pub warmup_time: i64,
    /// 0-100, scaled against the 480-hour warm-up target
    pub progress: i32,
    pub last_active: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-instance, per-day media counters. A fresh row is created at each day
/// boundary rather than mutating across it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MediaStats {
    pub id: Uuid,
    pub instance_name: String,
    pub date: NaiveDate,
    pub text: i32,
    pub image: i32,
    pub video: i32,
    pub audio: i32,
    pub sticker: i32,
    pub reaction: i32,
    pub total_daily: i32,
    pub total_sent: i32,
    pub total_received: i32,
    pub total_all_time: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row per send attempt, with the receipt-driven status history
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MessageLog {
    pub id: Uuid,
    pub message_id: String,
    pub campaign_id: Option<CampaignId>,
    pub lead_id: Option<LeadId>,
    pub message_type: String,
    pub content: Option<String>,
    pub status: String,
    pub status_history: serde_json::Value,
    pub message_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Create dispatch input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDispatch {
    pub campaign_id: CampaignId,
    pub instance_name: String,
}

/// Create message log input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageLog {
    pub message_id: String,
    pub campaign_id: Option<CampaignId>,
    pub lead_id: Option<LeadId>,
    pub message_type: String,
    pub content: Option<String>,
    pub status: String,
}
