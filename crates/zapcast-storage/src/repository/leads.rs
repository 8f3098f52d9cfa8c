//! Campaign lead repository
//!
//! Holds every transition of the lead delivery state machine. The rules the
//! dispatcher depends on live in the WHERE clauses here: `mark_processing`
//! only claims a `PENDING` lead, `mark_sent` requires a provider message id,
//! and `reset_for_restart` clears every non-`PENDING` lead before a replay.

use sqlx::{PgPool, Row};
use zapcast_common::types::{CampaignId, LeadId};

use crate::models::Lead;

/// Campaign lead repository
#[derive(Clone)]
pub struct LeadRepository {
    pool: PgPool,
}

impl LeadRepository {
    /// Create a new lead repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a lead by its provider message id
    pub async fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>("SELECT * FROM campaign_leads WHERE message_id = $1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Reset every non-PENDING lead of a campaign back to PENDING with all
    /// timestamps and the provider id cleared. Starting a campaign is a
    /// replay: this runs before any new send. Returns the number of leads
    /// reset.
    pub async fn reset_for_restart(&self, campaign_id: CampaignId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_leads SET
                status = 'PENDING',
                sent_at = NULL,
                delivered_at = NULL,
                read_at = NULL,
                failed_at = NULL,
                failure_reason = NULL,
                message_id = NULL,
                updated_at = NOW()
            WHERE campaign_id = $1 AND status <> 'PENDING'
            "#,
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// List PENDING leads with a non-empty phone, in import order
    pub async fn list_pending(&self, campaign_id: CampaignId) -> Result<Vec<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(
            r#"
            SELECT * FROM campaign_leads
            WHERE campaign_id = $1 AND status = 'PENDING' AND phone <> ''
            ORDER BY created_at ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Requeue leads stuck in `processing` after a pause or crash so a
    /// resume can claim them again
    pub async fn requeue_processing(&self, campaign_id: CampaignId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_leads SET
                status = 'PENDING',
                updated_at = NOW()
            WHERE campaign_id = $1 AND status = 'processing'
            "#,
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// List leads a resume run should pick up: everything not yet in a
    /// successful terminal state. Already-SENT/DELIVERED/READ leads are left
    /// untouched.
    pub async fn list_resumable(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(
            r#"
            SELECT * FROM campaign_leads
            WHERE campaign_id = $1
              AND status IN ('PENDING', 'processing', 'FAILED')
              AND phone <> ''
            ORDER BY created_at ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Claim a lead for sending. Transitions PENDING -> processing before any
    /// network call so a crash mid-send is observable. Returns false when the
    /// lead was already claimed or terminal.
    pub async fn mark_processing(&self, id: LeadId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_leads SET
                status = 'processing',
                updated_at = NOW()
            WHERE id = $1 AND status IN ('PENDING', 'FAILED')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a lead SENT with the provider message id
    pub async fn mark_sent(
        &self,
        id: LeadId,
        message_id: &str,
    ) -> Result<Option<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(
            r#"
            UPDATE campaign_leads SET
                status = 'SENT',
                message_id = $2,
                sent_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark a lead FAILED with the failure cause
    pub async fn mark_failed(
        &self,
        id: LeadId,
        reason: &str,
    ) -> Result<Option<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(
            r#"
            UPDATE campaign_leads SET
                status = 'FAILED',
                failed_at = NOW(),
                failure_reason = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark a lead DELIVERED (receipt-driven)
    pub async fn mark_delivered(&self, id: LeadId) -> Result<Option<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(
            r#"
            UPDATE campaign_leads SET
                status = 'DELIVERED',
                delivered_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'SENT'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark a lead READ (receipt-driven)
    pub async fn mark_read(&self, id: LeadId) -> Result<Option<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(
            r#"
            UPDATE campaign_leads SET
                status = 'READ',
                read_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('SENT', 'DELIVERED')
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Get count by status for a campaign (for stats and progress)
    pub async fn status_counts(
        &self,
        campaign_id: CampaignId,
    ) -> Result<LeadStatusCounts, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'PENDING') as pending,
                COUNT(*) FILTER (WHERE status = 'processing') as processing,
                COUNT(*) FILTER (WHERE status = 'SENT') as sent,
                COUNT(*) FILTER (WHERE status = 'DELIVERED') as delivered,
                COUNT(*) FILTER (WHERE status = 'READ') as read,
                COUNT(*) FILTER (WHERE status = 'FAILED') as failed
            FROM campaign_leads
            WHERE campaign_id = $1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(LeadStatusCounts {
            pending: row.get::<Option<i64>, _>("pending").unwrap_or(0),
            processing: row.get::<Option<i64>, _>("processing").unwrap_or(0),
            sent: row.get::<Option<i64>, _>("sent").unwrap_or(0),
            delivered: row.get::<Option<i64>, _>("delivered").unwrap_or(0),
            read: row.get::<Option<i64>, _>("read").unwrap_or(0),
            failed: row.get::<Option<i64>, _>("failed").unwrap_or(0),
        })
    }
}

/// Lead counts by status for one campaign
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadStatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub sent: i64,
    pub delivered: i64,
    pub read: i64,
    pub failed: i64,
}

impl LeadStatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.sent + self.delivered + self.read + self.failed
    }

    /// Leads that reached a terminal state
    pub fn processed(&self) -> i64 {
        self.sent + self.delivered + self.read + self.failed
    }

    /// Leads delivered to the gateway successfully
    pub fn successful(&self) -> i64 {
        self.sent + self.delivered + self.read
    }

    /// Campaign progress, 0-100
    pub fn progress(&self) -> i32 {
        if self.total() == 0 {
            return 0;
        }
        ((self.processed() * 100) / self.total()) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_counts_total_never_loses_a_lead() {
        let counts = LeadStatusCounts {
            pending: 3,
            processing: 1,
            sent: 4,
            delivered: 2,
            read: 1,
            failed: 2,
        };
        assert_eq!(counts.total(), 13);
        assert_eq!(counts.processed(), 9);
        assert_eq!(counts.successful(), 7);
    }

    #[test]
    fn test_progress_rounds_down() {
        let counts = LeadStatusCounts {
            pending: 1,
            sent: 2,
            ..Default::default()
        };
        assert_eq!(counts.progress(), 66);
    }

    #[test]
    fn test_progress_empty_campaign() {
        assert_eq!(LeadStatusCounts::default().progress(), 0);
    }
}
