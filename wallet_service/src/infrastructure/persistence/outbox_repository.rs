use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::entities::{NewOutboxEvent, OutboxRow};
use crate::domain::error::WalletError;
use crate::infrastructure::persistence::map_sqlx_err;
use crate::infrastructure::persistence::models::OutboxModel;

/// Repositorio del outbox transaccional.
pub struct PostgresOutboxRepository {
    pool: PgPool,
}

impl PostgresOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserta una fila de outbox en la transaccion de negocio en curso.
    pub async fn insert(
        conn: &mut PgConnection,
        event: &NewOutboxEvent,
    ) -> Result<(), WalletError> {
        let payload = serde_json::to_value(&event.payload)
            .map_err(|e| WalletError::RepositoryError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO outbox_events (id, aggregate_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event.id)
        .bind(&event.aggregate_id)
        .bind(event.event_type.as_str())
        .bind(payload)
        .execute(conn)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    /// Filas pendientes de publicar, de la mas vieja a la mas nueva.
    pub async fn fetch_unpublished(&self, limit: i64) -> Result<Vec<OutboxRow>, WalletError> {
        let models = sqlx::query_as::<_, OutboxModel>(
            r#"
            SELECT * FROM outbox_events
            WHERE NOT published
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    /// Marca el lote publicado en un solo UPDATE.
    pub async fn mark_published(&self, ids: &[Uuid]) -> Result<u64, WalletError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET published = TRUE
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}
