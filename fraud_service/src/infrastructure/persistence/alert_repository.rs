use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::NewFraudAlert;
use crate::domain::error::FraudError;
use crate::domain::repository::AlertRepository;

/// Repositorio de alertas de fraude (PostgreSQL, append-only).
pub struct PostgresAlertRepository {
    pool: PgPool,
}

impl PostgresAlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertRepository for PostgresAlertRepository {
    async fn insert(&self, alert: NewFraudAlert) -> Result<(), FraudError> {
        sqlx::query(
            r#"
            INSERT INTO fraud_alerts (id, wallet_id, alert_type, details)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&alert.wallet_id)
        .bind(alert.alert_type.as_str())
        .bind(&alert.details)
        .execute(&self.pool)
        .await
        .map_err(|e| FraudError::RepositoryError(e.to_string()))?;

        Ok(())
    }
}
