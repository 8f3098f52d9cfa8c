//! Per-instance, per-day media statistics
//!
//! The day boundary is modelled as a pure function of the clock
//! ([`stats_day`]) rather than inline conditionals: a counter row belongs to
//! exactly one calendar day, and a send on a new day upserts a fresh row
//! instead of mutating yesterday's. All counter updates are single-statement
//! atomic increments so a warmup loop and a live campaign sharing one
//! instance never lose updates.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use zapcast_common::types::MessageKind;

use crate::models::MediaStats;

/// The calendar day a send at `now` is counted against, in UTC.
pub fn stats_day(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

/// Whether a counter row stamped `row_day` is stale at `now`.
pub fn day_rolled_over(now: DateTime<Utc>, row_day: NaiveDate) -> bool {
    stats_day(now) > row_day
}

/// Media statistics repository
#[derive(Clone)]
pub struct MediaStatsRepository {
    pool: PgPool,
}

impl MediaStatsRepository {
    /// Create a new media stats repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Today's total_daily counter. A missing row or one left over from an
    /// earlier day both read as zero.
    pub async fn total_daily(
        &self,
        instance_name: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let row: Option<(NaiveDate, i32)> = sqlx::query_as(
            r#"
            SELECT date, total_daily FROM media_stats
            WHERE instance_name = $1
            ORDER BY date DESC
            LIMIT 1
            "#,
        )
        .bind(instance_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((day, count)) if !day_rolled_over(now, day) => count as i64,
            _ => 0,
        })
    }

    /// Record one outbound message. Creates today's row on first send.
    pub async fn record_send(
        &self,
        instance_name: &str,
        kind: MessageKind,
        now: DateTime<Utc>,
    ) -> Result<MediaStats, sqlx::Error> {
        self.record(instance_name, kind, now, true).await
    }

    /// Record one inbound message (webhook-driven)
    pub async fn record_receive(
        &self,
        instance_name: &str,
        kind: MessageKind,
        now: DateTime<Utc>,
    ) -> Result<MediaStats, sqlx::Error> {
        self.record(instance_name, kind, now, false).await
    }

    async fn record(
        &self,
        instance_name: &str,
        kind: MessageKind,
        now: DateTime<Utc>,
        is_sent: bool,
    ) -> Result<MediaStats, sqlx::Error> {
        // kind.as_str() is a fixed identifier from our own enum, safe to
        // splice into the column list.
        let column = kind.as_str();
        let query = format!(
            r#"
            INSERT INTO media_stats (
                id, instance_name, date, {column},
                total_daily, total_sent, total_received, total_all_time
            )
            VALUES ($1, $2, $3, 1, 1, $4, $5, 1)
            ON CONFLICT (instance_name, date)
            DO UPDATE SET
                {column} = media_stats.{column} + 1,
                total_daily = media_stats.total_daily + 1,
                total_sent = media_stats.total_sent + $4,
                total_received = media_stats.total_received + $5,
                total_all_time = media_stats.total_all_time + 1,
                updated_at = NOW()
            RETURNING *
            "#,
        );

        sqlx::query_as::<_, MediaStats>(&query)
            .bind(Uuid::new_v4())
            .bind(instance_name)
            .bind(stats_day(now))
            .bind(if is_sent { 1i32 } else { 0i32 })
            .bind(if is_sent { 0i32 } else { 1i32 })
            .fetch_one(&self.pool)
            .await
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stats_day_is_calendar_date() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 23, 59, 59).unwrap();
        assert_eq!(stats_day(now), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
    }

    #[test]
    fn test_day_rollover() {
        let yesterday = NaiveDate::from_ymd_opt(2025, 3, 13).unwrap();
        let just_after_midnight = Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 1).unwrap();
        assert!(day_rolled_over(just_after_midnight, yesterday));

        let same_day = Utc.with_ymd_and_hms(2025, 3, 13, 12, 0, 0).unwrap();
        assert!(!day_rolled_over(same_day, yesterday));
    }
}
