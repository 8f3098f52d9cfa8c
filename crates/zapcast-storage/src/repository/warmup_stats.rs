//! Warmup progress tracking
//!
//! One row per instance. `warmup_time` accrues in one-second ticks while the
//! instance is actively warming; progress is derived from it in SQL against
//! the fixed 480-hour target so the stored value and the derived percentage
//! can never disagree.

use sqlx::PgPool;
use uuid::Uuid;
use zapcast_common::types::UserId;

use crate::models::WarmupStats;

/// Warmup target: 480 hours of accrued active time.
pub const WARMUP_TARGET_SECS: i64 = 480 * 3600;

/// Warmup stats repository
#[derive(Clone)]
pub struct WarmupStatsRepository {
    pool: PgPool,
}

impl WarmupStatsRepository {
    /// Create a new warmup stats repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the warmup row for an instance
    pub async fn get(&self, instance_name: &str) -> Result<Option<WarmupStats>, sqlx::Error> {
        sqlx::query_as::<_, WarmupStats>(
            "SELECT * FROM warmup_stats WHERE instance_name = $1",
        )
        .bind(instance_name)
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark an instance as actively warming, creating the row on first use.
    /// A previously paused instance resumes with its accrued time intact.
    pub async fn upsert_active(
        &self,
        instance_name: &str,
        user_id: UserId,
    ) -> Result<WarmupStats, sqlx::Error> {
        sqlx::query_as::<_, WarmupStats>(
            r#"
            INSERT INTO warmup_stats (
                id, instance_name, user_id, status, start_time, last_active
            )
            VALUES ($1, $2, $3, 'active', NOW(), NOW())
            ON CONFLICT (instance_name)
            DO UPDATE SET
                status = 'active',
                pause_time = NULL,
                last_active = NOW(),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(instance_name)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    /// Pause one instance's warmup. No-op when the row is absent or already
    /// paused; returns whether a transition happened.
    pub async fn pause(&self, instance_name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE warmup_stats
            SET status = 'paused', pause_time = NOW(), updated_at = NOW()
            WHERE instance_name = $1 AND status = 'active'
            "#,
        )
        .bind(instance_name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Pause every active warmup owned by a user. Returns instance names
    /// that were transitioned.
    pub async fn pause_all(&self, user_id: UserId) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            UPDATE warmup_stats
            SET status = 'paused', pause_time = NOW(), updated_at = NOW()
            WHERE user_id = $1 AND status = 'active'
            RETURNING instance_name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Accrue `secs` of active warmup time and recompute progress against
    /// the 480-hour target, capped at 100. Only touches active rows.
    pub async fn increment_warmup_time(
        &self,
        instance_name: &str,
        secs: i64,
    ) -> Result<Option<WarmupStats>, sqlx::Error> {
        sqlx::query_as::<_, WarmupStats>(
            r#"
            UPDATE warmup_stats
            SET warmup_time = warmup_time + $2,
                progress = LEAST(
                    ((warmup_time + $2) * 100 / $3)::INT, 100
                ),
                last_active = NOW(),
                updated_at = NOW()
            WHERE instance_name = $1 AND status = 'active'
            RETURNING *
            "#,
        )
        .bind(instance_name)
        .bind(secs)
        .bind(WARMUP_TARGET_SECS)
        .fetch_optional(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_is_480_hours() {
        assert_eq!(WARMUP_TARGET_SECS, 1_728_000);
    }
}
