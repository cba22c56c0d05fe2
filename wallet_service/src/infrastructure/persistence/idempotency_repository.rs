use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use std::time::Duration;

use crate::domain::entities::StoredResponse;
use crate::domain::error::WalletError;
use crate::domain::repository::IdempotencyStore;
use crate::infrastructure::persistence::map_sqlx_err;

/// Repositorio del registro de idempotencia (request_id -> respuesta).
pub struct PostgresIdempotencyRepository {
    pool: PgPool,
}

impl PostgresIdempotencyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserta el registro como ultimo paso de la transaccion de negocio.
    ///
    /// Una violacion de unicidad significa que un request concurrente con el
    /// mismo id gano la carrera; sube como `DuplicateKey` y el reintento del
    /// llamador termina devolviendo la respuesta almacenada.
    pub async fn insert(
        conn: &mut PgConnection,
        request_id: &str,
        response: &StoredResponse,
    ) -> Result<(), WalletError> {
        let value = serde_json::to_value(response)
            .map_err(|e| WalletError::RepositoryError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (request_id, response)
            VALUES ($1, $2)
            "#,
        )
        .bind(request_id)
        .bind(value)
        .execute(conn)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    /// Recoleccion de filas vencidas (TTL >= 24h). Corre en el tick del
    /// relay.
    pub async fn purge_older_than(&self, ttl: Duration) -> Result<u64, WalletError> {
        let result = sqlx::query(
            r#"
            DELETE FROM idempotency_keys
            WHERE created_at < now() - make_interval(secs => $1)
            "#,
        )
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl IdempotencyStore for PostgresIdempotencyRepository {
    /// Busca la respuesta almacenada para un request_id.
    async fn find(&self, request_id: &str) -> Result<Option<StoredResponse>, WalletError> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            r#"SELECT response FROM idempotency_keys WHERE request_id = $1"#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match row {
            None => Ok(None),
            Some((value,)) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| WalletError::RepositoryError(format!("corrupt stored response: {}", e))),
        }
    }

    /// Variante best-effort fuera de transaccion: registra el sobre de error
    /// de una falla de regla de negocio para que el replay lo devuelva tal
    /// cual. Ignora el duplicado (gano otro insert).
    async fn record_best_effort(&self, request_id: &str, response: &StoredResponse) {
        let value = match serde_json::to_value(response) {
            Ok(v) => v,
            Err(_) => return,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (request_id, response)
            VALUES ($1, $2)
            ON CONFLICT (request_id) DO NOTHING
            "#,
        )
        .bind(request_id)
        .bind(value)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(request_id, error = %e, "failed to record idempotency response");
        }
    }
}
