//! Campaign repository

use sqlx::PgPool;
use zapcast_common::types::{CampaignId, CampaignStatus};

use crate::models::{Campaign, CampaignStatistics};

/// Campaign repository
#[derive(Clone)]
pub struct CampaignRepository {
    pool: PgPool,
}

impl CampaignRepository {
    /// Create a new campaign repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a campaign by ID
    pub async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Update campaign status. Stamps started_at/completed_at for the
    /// corresponding transitions; a paused campaign keeps completed_at NULL.
    pub async fn update_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = $2,
                started_at = CASE WHEN $2 = 'running' THEN NOW() ELSE started_at END,
                completed_at = CASE WHEN $2 = 'completed' THEN NOW() ELSE NULL END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .fetch_optional(&self.pool)
        .await
    }

    /// Persist recomputed campaign progress (0-100)
    pub async fn set_progress(&self, id: CampaignId, progress: i32) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE campaigns SET progress = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(progress.clamp(0, 100))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Refresh the aggregate statistics row for a campaign
    pub async fn upsert_statistics(
        &self,
        campaign_id: CampaignId,
        total_leads: i64,
        sent_count: i64,
        failed_count: i64,
    ) -> Result<CampaignStatistics, sqlx::Error> {
        sqlx::query_as::<_, CampaignStatistics>(
            r#"
            INSERT INTO campaign_statistics (campaign_id, total_leads, sent_count, failed_count)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (campaign_id)
            DO UPDATE SET
                total_leads = EXCLUDED.total_leads,
                sent_count = EXCLUDED.sent_count,
                failed_count = EXCLUDED.failed_count,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(campaign_id)
        .bind(total_leads as i32)
        .bind(sent_count as i32)
        .bind(failed_count as i32)
        .fetch_one(&self.pool)
        .await
    }
}
