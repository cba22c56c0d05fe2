use chrono::{DateTime, NaiveDate, Utc};
use common::events::WalletEventType;
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::entities::{
    OutboxRow, TransferSaga, TransferSagaState, Wallet, WalletEvent, WalletStatus,
};
use crate::domain::error::WalletError;
use crate::domain::types::{SagaId, WalletId};

// Modelo de Base de Datos para Wallet (especifico de SQLx)
// Representa la tabla 'wallets' en PostgreSQL.
#[derive(Debug, FromRow)]
pub struct WalletModel {
    pub id: WalletId,
    pub balance: Decimal,
    pub currency: String,
    pub status: WalletStatus,
    pub daily_withdrawal_limit: Option<Decimal>,
    pub daily_withdrawal_total: Decimal,
    pub last_withdrawal_date: Option<NaiveDate>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Conversión Modelo -> Dominio
// Permite reconstruir la entidad de dominio al leer de la base de datos.
impl From<WalletModel> for Wallet {
    fn from(m: WalletModel) -> Self {
        Wallet::reconstitute(
            m.id,
            m.balance,
            m.currency.trim_end().to_string(), // CHAR(3) llega con padding
            m.status,
            m.daily_withdrawal_limit,
            m.daily_withdrawal_total,
            m.last_withdrawal_date,
            m.version,
            m.created_at,
            m.updated_at,
        )
    }
}

// Modelo de Base de Datos para TransferSaga.
#[derive(Debug, FromRow)]
pub struct TransferSagaModel {
    pub id: SagaId,
    pub from_wallet_id: WalletId,
    pub to_wallet_id: WalletId,
    pub amount: Decimal,
    pub currency: String,
    pub state: TransferSagaState,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TransferSagaModel> for TransferSaga {
    fn from(m: TransferSagaModel) -> Self {
        TransferSaga::reconstitute(
            m.id,
            m.from_wallet_id,
            m.to_wallet_id,
            m.amount,
            m.currency.trim_end().to_string(),
            m.state,
            m.metadata,
            m.created_at,
            m.updated_at,
        )
    }
}

// Modelo de Base de Datos para WalletEvent.
// El event_type se guarda como TEXT (el vocabulario vive en `common`), por
// lo que la conversion al dominio es falible.
#[derive(Debug, FromRow)]
pub struct WalletEventModel {
    pub id: i64,
    pub wallet_id: WalletId,
    pub event_type: String,
    pub currency: String,
    pub amount: Option<Decimal>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<WalletEventModel> for WalletEvent {
    type Error = WalletError;

    fn try_from(m: WalletEventModel) -> Result<Self, Self::Error> {
        let event_type: WalletEventType = m
            .event_type
            .parse()
            .map_err(|e| WalletError::RepositoryError(format!("corrupt event row: {}", e)))?;
        Ok(WalletEvent {
            id: m.id,
            wallet_id: m.wallet_id,
            event_type,
            currency: m.currency.trim_end().to_string(),
            amount: m.amount,
            metadata: m.metadata,
            created_at: m.created_at,
        })
    }
}

// Modelo de Base de Datos para el outbox.
#[derive(Debug, FromRow)]
pub struct OutboxModel {
    pub id: Uuid,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published: bool,
}

impl From<OutboxModel> for OutboxRow {
    fn from(m: OutboxModel) -> Self {
        OutboxRow {
            id: m.id,
            aggregate_id: m.aggregate_id,
            event_type: m.event_type,
            payload: m.payload,
            created_at: m.created_at,
            published: m.published,
        }
    }
}
