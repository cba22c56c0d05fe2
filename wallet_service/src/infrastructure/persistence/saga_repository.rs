use sqlx::{PgConnection, PgPool};
use std::time::Duration;

use crate::domain::entities::TransferSaga;
use crate::domain::error::WalletError;
use crate::domain::types::SagaId;
use crate::infrastructure::persistence::map_sqlx_err;
use crate::infrastructure::persistence::models::TransferSagaModel;

/// Repositorio de sagas de transferencia.
pub struct PostgresSagaRepository {
    pool: PgPool,
}

impl PostgresSagaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(conn: &mut PgConnection, saga: &TransferSaga) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            INSERT INTO transfer_sagas (
                id, from_wallet_id, to_wallet_id, amount, currency, state, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(saga.id())
        .bind(saga.from_wallet_id())
        .bind(saga.to_wallet_id())
        .bind(saga.amount())
        .bind(saga.currency())
        .bind(saga.state())
        .bind(saga.metadata())
        .execute(conn)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    /// Recarga la saga dentro de la transaccion, con lock de fila.
    ///
    /// Cada pierna re-verifica el estado actual antes de transicionar; por
    /// eso la recarga es parte del protocolo, no una optimizacion.
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: SagaId,
    ) -> Result<Option<TransferSaga>, WalletError> {
        let model_opt = sqlx::query_as::<_, TransferSagaModel>(
            r#"
            SELECT * FROM transfer_sagas
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_sqlx_err)?;

        Ok(model_opt.map(|m| m.into()))
    }

    pub async fn find_by_id(&self, id: SagaId) -> Result<Option<TransferSaga>, WalletError> {
        let model_opt = sqlx::query_as::<_, TransferSagaModel>(
            r#"SELECT * FROM transfer_sagas WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(model_opt.map(|m| m.into()))
    }

    /// Persiste el estado y la metadata tras una transicion.
    pub async fn update(conn: &mut PgConnection, saga: &TransferSaga) -> Result<(), WalletError> {
        let result = sqlx::query(
            r#"
            UPDATE transfer_sagas
            SET state = $2, metadata = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(saga.id())
        .bind(saga.state())
        .bind(saga.metadata())
        .execute(conn)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(WalletError::RepositoryError(format!(
                "saga {} vanished during update",
                saga.id()
            )));
        }

        Ok(())
    }

    /// Sagas varadas en DEBITED hace mas de `stuck_for` (scan de
    /// recuperacion, ordenadas de la mas vieja a la mas nueva).
    pub async fn find_stuck(
        &self,
        stuck_for: Duration,
        limit: i64,
    ) -> Result<Vec<SagaId>, WalletError> {
        let ids: Vec<(SagaId,)> = sqlx::query_as(
            r#"
            SELECT id FROM transfer_sagas
            WHERE state = 'DEBITED'
              AND updated_at < now() - make_interval(secs => $1)
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(stuck_for.as_secs_f64())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
