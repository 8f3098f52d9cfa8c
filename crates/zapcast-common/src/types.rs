//! Common types for ZapCast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for users
pub type UserId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for campaign leads
pub type LeadId = Uuid;

/// Unique identifier for dispatch records
pub type DispatchId = Uuid;

/// Unique identifier for WhatsApp instances
pub type InstanceId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Delivery state of a campaign lead.
///
/// `Processing` is claimed before the network call so a crash mid-send shows
/// up as a stuck `processing` lead instead of a silently re-sendable
/// `PENDING` one. `Sent` requires a provider message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadStatus {
    Pending,
    Processing,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl LeadStatus {
    /// Database representation. The legacy store mixed upper and lower case;
    /// we keep the exact strings so existing rows stay readable.
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Pending => "PENDING",
            LeadStatus::Processing => "processing",
            LeadStatus::Sent => "SENT",
            LeadStatus::Delivered => "DELIVERED",
            LeadStatus::Read => "READ",
            LeadStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(LeadStatus::Pending),
            "processing" => Some(LeadStatus::Processing),
            "SENT" | "sent" => Some(LeadStatus::Sent),
            "DELIVERED" | "delivered" => Some(LeadStatus::Delivered),
            "READ" | "read" => Some(LeadStatus::Read),
            "FAILED" | "failed" => Some(LeadStatus::Failed),
            _ => None,
        }
    }

    /// A terminal lead is never claimed again by a resume loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LeadStatus::Sent | LeadStatus::Delivered | LeadStatus::Read | LeadStatus::Failed
        )
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Running,
    Paused,
    Completed,
    Failed,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Running => "running",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Strategy used to partition a lead list across instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RotationStrategy {
    Random,
    Sequential,
    LoadBalanced,
}

impl RotationStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RANDOM" => Some(RotationStrategy::Random),
            "SEQUENTIAL" => Some(RotationStrategy::Sequential),
            "LOAD_BALANCED" => Some(RotationStrategy::LoadBalanced),
            _ => None,
        }
    }
}

/// Warmup loop status for one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmupStatus {
    Active,
    Paused,
    Inactive,
}

impl WarmupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmupStatus::Active => "active",
            WarmupStatus::Paused => "paused",
            WarmupStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(WarmupStatus::Active),
            "paused" => Some(WarmupStatus::Paused),
            "inactive" => Some(WarmupStatus::Inactive),
            _ => None,
        }
    }
}

impl std::fmt::Display for WarmupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of outbound content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Sticker,
    Reaction,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::Audio => "audio",
            MessageKind::Sticker => "sticker",
            MessageKind::Reaction => "reaction",
        }
    }

    /// Default mimetype used when the content pool does not carry one.
    pub fn default_mimetype(&self) -> &'static str {
        match self {
            MessageKind::Image => "image/jpeg",
            MessageKind::Video => "video/mp4",
            MessageKind::Audio => "audio/mp3",
            MessageKind::Sticker => "image/webp",
            _ => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subscription plan of the owning user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Plan::Free),
            "basic" => Some(Plan::Basic),
            "pro" => Some(Plan::Pro),
            "enterprise" => Some(Plan::Enterprise),
            _ => None,
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Plan::Free => "free",
            Plan::Basic => "basic",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        };
        write!(f, "{}", s)
    }
}

/// Strip everything but digits from a phone/jid so that
/// `5511999999999@s.whatsapp.net` and `+55 11 99999-9999` compare equal.
pub fn normalize_jid(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lead_status_roundtrip() {
        for status in [
            LeadStatus::Pending,
            LeadStatus::Processing,
            LeadStatus::Sent,
            LeadStatus::Delivered,
            LeadStatus::Read,
            LeadStatus::Failed,
        ] {
            assert_eq!(LeadStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_lead_status_terminal() {
        assert!(!LeadStatus::Pending.is_terminal());
        assert!(!LeadStatus::Processing.is_terminal());
        assert!(LeadStatus::Sent.is_terminal());
        assert!(LeadStatus::Failed.is_terminal());
    }

    #[test]
    fn test_rotation_strategy_parse() {
        assert_eq!(
            RotationStrategy::parse("LOAD_BALANCED"),
            Some(RotationStrategy::LoadBalanced)
        );
        assert_eq!(RotationStrategy::parse("bogus"), None);
    }

    #[test]
    fn test_normalize_jid() {
        assert_eq!(
            normalize_jid("5511999999999@s.whatsapp.net"),
            "5511999999999"
        );
        assert_eq!(normalize_jid("+55 11 99999-9999"), "5511999999999");
    }
}
