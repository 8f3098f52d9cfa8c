//! Instance repository

use sqlx::PgPool;

use crate::models::Instance;

/// Instance repository
#[derive(Clone)]
pub struct InstanceRepository {
    pool: PgPool,
}

impl InstanceRepository {
    /// Create a new instance repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get an instance by its unique name
    pub async fn get_by_name(&self, instance_name: &str) -> Result<Option<Instance>, sqlx::Error> {
        sqlx::query_as::<_, Instance>("SELECT * FROM instances WHERE instance_name = $1")
            .bind(instance_name)
            .fetch_optional(&self.pool)
            .await
    }

    /// List connected instances among the given names, in the given order
    pub async fn list_connected(&self, names: &[String]) -> Result<Vec<Instance>, sqlx::Error> {
        let instances = sqlx::query_as::<_, Instance>(
            r#"
            SELECT * FROM instances
            WHERE instance_name = ANY($1) AND connection_status = 'OPEN'
            "#,
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await?;

        // ANY() does not preserve input order; callers (the distributor) rely
        // on the selection order for deterministic tie-breaking.
        let mut ordered = Vec::with_capacity(instances.len());
        for name in names {
            if let Some(instance) = instances.iter().find(|i| &i.instance_name == name) {
                ordered.push(instance.clone());
            }
        }
        Ok(ordered)
    }
}
