//! Dispatch record repository

use sqlx::PgPool;
use uuid::Uuid;
use zapcast_common::types::DispatchId;

use crate::models::{CreateDispatch, Dispatch};

/// Dispatch repository
#[derive(Clone)]
pub struct DispatchRepository {
    pool: PgPool,
}

impl DispatchRepository {
    /// Create a new dispatch repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record the start of a campaign run against one instance
    pub async fn create(&self, input: CreateDispatch) -> Result<Dispatch, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, Dispatch>(
            r#"
            INSERT INTO dispatches (id, campaign_id, instance_name, status, started_at)
            VALUES ($1, $2, $3, 'running', NOW())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.campaign_id)
        .bind(&input.instance_name)
        .fetch_one(&self.pool)
        .await
    }

    /// Close a dispatch record with its final status
    pub async fn complete(
        &self,
        id: DispatchId,
        status: &str,
    ) -> Result<Option<Dispatch>, sqlx::Error> {
        sqlx::query_as::<_, Dispatch>(
            r#"
            UPDATE dispatches SET
                status = $2,
                completed_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
    }
}
