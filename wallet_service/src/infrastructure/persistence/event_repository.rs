use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use crate::domain::entities::{NewWalletEvent, WalletEvent};
use crate::domain::error::WalletError;
use crate::domain::repository::EventJournal;
use crate::domain::types::WalletId;
use crate::infrastructure::persistence::map_sqlx_err;
use crate::infrastructure::persistence::models::WalletEventModel;

/// Historial: tope duro de filas por pagina.
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Normaliza la paginacion del historial: `1 <= limit <= 100`, `offset >= 0`.
pub fn clamp_page(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, MAX_HISTORY_LIMIT), offset.max(0))
}

/// Repositorio del journal de eventos.
///
/// Expone unicamente INSERT + SELECT; la inmutabilidad del journal se
/// refuerza ademas con el trigger y los permisos del rol de runtime
/// (ver migracion 0002).
pub struct PostgresEventRepository {
    pool: PgPool,
}

impl PostgresEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserta un evento en el journal dentro de la transaccion en curso.
    ///
    /// Una violacion del indice unico `(sagaId, leg)` significa que esa
    /// pierna de la saga ya dejo su evento; el llamador la interpreta como
    /// "ya aplicado".
    pub async fn insert(
        conn: &mut PgConnection,
        event: &NewWalletEvent,
    ) -> Result<i64, WalletError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO wallet_events (wallet_id, event_type, currency, amount, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&event.wallet_id)
        .bind(event.event_type.as_str())
        .bind(&event.currency)
        .bind(event.amount)
        .bind(&event.metadata)
        .fetch_one(conn)
        .await
        .map_err(map_sqlx_err)?;

        Ok(id)
    }
}

#[async_trait]
impl EventJournal for PostgresEventRepository {
    /// Historial paginado de una billetera, de lo mas reciente a lo mas
    /// antiguo. El limite se recorta a `MAX_HISTORY_LIMIT`.
    async fn list_for_wallet(
        &self,
        wallet_id: &WalletId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletEvent>, WalletError> {
        let (limit, offset) = clamp_page(limit, offset);

        let models = sqlx::query_as::<_, WalletEventModel>(
            r#"
            SELECT * FROM wallet_events
            WHERE wallet_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(wallet_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        models.into_iter().map(WalletEvent::try_from).collect()
    }
}
