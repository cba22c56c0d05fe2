use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::domain::entities::{StoredResponse, Wallet, WalletEvent};
use crate::domain::error::WalletError;
use crate::domain::types::WalletId;

// Interface (Port) for read-only wallet lookups
#[async_trait]
pub trait WalletReader: Send + Sync {
    async fn find(&self, id: &WalletId) -> Result<Option<Wallet>, WalletError>;
}

// Interface (Port) for the append-only event journal read side
#[async_trait]
pub trait EventJournal: Send + Sync {
    async fn list_for_wallet(
        &self,
        wallet_id: &WalletId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletEvent>, WalletError>;
}

/// Puerto del cache read-through de balances.
///
/// Las fallas del cache degradan con gracia: un `get` fallido se trata como
/// miss y un `set`/`invalidate` fallido solo se loguea; la fuente de verdad
/// es siempre la base de datos.
#[async_trait]
pub trait BalanceCache: Send + Sync {
    async fn get(&self, id: &WalletId) -> Result<Option<Decimal>, WalletError>;
    async fn set(&self, id: &WalletId, balance: Decimal) -> Result<(), WalletError>;
    async fn invalidate(&self, id: &WalletId) -> Result<(), WalletError>;
}

/// Puerto de consulta/registro del almacen de idempotencia.
///
/// La insercion transaccional (ultimo paso de la transaccion de negocio) es
/// responsabilidad del repositorio concreto; este puerto cubre el lookup
/// previo y el registro best-effort de sobres de error.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn find(&self, request_id: &str) -> Result<Option<StoredResponse>, WalletError>;
    async fn record_best_effort(&self, request_id: &str, response: &StoredResponse);
}

/// Puerto del lock distribuido de requests (set-if-absent con TTL).
#[async_trait]
pub trait RequestLock: Send + Sync {
    /// `true` si el lock se adquirio; `false` si otro proceso lo tiene.
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, WalletError>;
    async fn release(&self, key: &str) -> Result<(), WalletError>;
}
