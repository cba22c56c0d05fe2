use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use crate::domain::entities::Wallet;
use crate::domain::error::WalletError;
use crate::domain::repository::WalletReader;
use crate::domain::types::WalletId;
use crate::infrastructure::persistence::map_sqlx_err;
use crate::infrastructure::persistence::models::WalletModel;

/// Repositorio de Billeteras basado en PostgreSQL.
///
/// Las lecturas simples usan el pool; las operaciones que participan de una
/// transaccion reciben la conexion transaccional explicitamente, de modo que
/// el lock de fila (`FOR UPDATE`) viva exactamente lo que vive la
/// transaccion.
pub struct PostgresWalletRepository {
    pool: PgPool,
}

impl PostgresWalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Carga una billetera tomando el lock exclusivo de fila.
    ///
    /// Toda mutacion pasa por aca: el lock serializa las operaciones por
    /// billetera y se libera en el commit/rollback de la transaccion.
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: &WalletId,
    ) -> Result<Option<Wallet>, WalletError> {
        let model_opt = sqlx::query_as::<_, WalletModel>(
            r#"
            SELECT * FROM wallets
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

    /// Lectura dentro de la transaccion en curso, sin lock de fila.
    pub async fn fetch(
        conn: &mut PgConnection,
        id: &WalletId,
    ) -> Result<Option<Wallet>, WalletError> {
        let model_opt = sqlx::query_as::<_, WalletModel>(
            r#"
            SELECT * FROM wallets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_sqlx_err)?;

        Ok(model_opt.map(|m| m.into()))
    }

    /// Inserta una billetera nueva (auto-provision o alta administrativa).
    pub async fn insert(conn: &mut PgConnection, wallet: &Wallet) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            INSERT INTO wallets (
                id, balance, currency, status, daily_withdrawal_limit,
                daily_withdrawal_total, last_withdrawal_date, version,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(wallet.id())
        .bind(wallet.balance())
        .bind(wallet.currency())
        .bind(wallet.status())
        .bind(wallet.daily_withdrawal_limit())
        .bind(wallet.daily_withdrawal_total())
        .bind(wallet.last_withdrawal_date())
        .bind(wallet.version())
        .bind(wallet.created_at())
        .bind(wallet.updated_at())
        .execute(conn)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    /// Persiste el estado mutado incrementando la version.
    ///
    /// El predicado sobre `version` detecta escrituras perdidas: con el lock
    /// de fila no deberia dispararse, pero si lo hace se reporta como
    /// conflicto optimista y la politica de reintentos decide.
    pub async fn update(conn: &mut PgConnection, wallet: &Wallet) -> Result<(), WalletError> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $2,
                status = $3,
                daily_withdrawal_limit = $4,
                daily_withdrawal_total = $5,
                last_withdrawal_date = $6,
                version = version + 1,
                updated_at = now()
            WHERE id = $1 AND version = $7
            "#,
        )
        .bind(wallet.id())
        .bind(wallet.balance())
        .bind(wallet.status())
        .bind(wallet.daily_withdrawal_limit())
        .bind(wallet.daily_withdrawal_total())
        .bind(wallet.last_withdrawal_date())
        .bind(wallet.version())
        .execute(conn)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(WalletError::VersionConflict(wallet.id().clone()));
        }

        Ok(())
    }
}

#[async_trait]
impl WalletReader for PostgresWalletRepository {
    /// Busca una billetera por su ID (sin lock).
    async fn find(&self, id: &WalletId) -> Result<Option<Wallet>, WalletError> {
        let model_opt = sqlx::query_as::<_, WalletModel>(
            r#"
            SELECT * FROM wallets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(model_opt.map(|m| m.into()))
    }
}
