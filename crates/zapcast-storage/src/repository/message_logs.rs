//! Message log repository
//!
//! One row per outbound message, keyed by the gateway's message id so
//! delivery receipts arriving later can be appended to the same row's
//! status history.

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateMessageLog, MessageLog};

/// Message log repository
#[derive(Clone)]
pub struct MessageLogRepository {
    pool: PgPool,
}

impl MessageLogRepository {
    /// Create a new message log repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a freshly sent message with an initial single-entry history
    pub async fn create(&self, log: CreateMessageLog) -> Result<MessageLog, sqlx::Error> {
        let history = json!([{
            "status": log.status,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }]);

        sqlx::query_as::<_, MessageLog>(
            r#"
            INSERT INTO message_logs (
                id, message_id, campaign_id, lead_id, message_type,
                content, status, status_history, message_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&log.message_id)
        .bind(log.campaign_id)
        .bind(log.lead_id)
        .bind(&log.message_type)
        .bind(&log.content)
        .bind(&log.status)
        .bind(history)
        .fetch_one(&self.pool)
        .await
    }

    /// Append a status transition to the log row for a gateway message id.
    /// Returns false when no log row exists for that id.
    pub async fn append_status(
        &self,
        message_id: &str,
        status: &str,
    ) -> Result<bool, sqlx::Error> {
        let entry = json!({
            "status": status,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let result = sqlx::query(
            r#"
            UPDATE message_logs
            SET status = $2,
                status_history = status_history || $3::jsonb
            WHERE message_id = $1
            "#,
        )
        .bind(message_id)
        .bind(status)
        .bind(entry)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
