use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::domain::entities::{
    AdminAction, BalanceSummary, LimitSummary, StatusSummary, StoredResponse, TransferSaga,
    TransferSagaState,
};
use crate::domain::error::{TransferError, WalletError};
use crate::domain::types::{SagaId, WalletId};

/// Puerto de las operaciones transaccionales del motor de billeteras.
///
/// Cada metodo es UNA transaccion coordinada: lock de fila sobre la
/// billetera, reglas de negocio en la entidad, evento del journal + fila de
/// outbox, y como ultimo paso el registro de idempotencia con la respuesta
/// calculada (si llego `request_id`). Los casos de uso orquestan por encima
/// (replay, reintentos, cache) sin tocar el store.
#[async_trait]
pub trait WalletOps: Send + Sync {
    /// Deposito. Si la billetera no existe se auto-provisiona y el evento
    /// WALLET_CREATED sale en la misma transaccion que FUNDS_DEPOSITED.
    async fn deposit(
        &self,
        wallet_id: &WalletId,
        amount: Decimal,
        request_id: Option<&str>,
    ) -> Result<BalanceSummary, WalletError>;

    /// Retiro. La billetera debe existir y estar ACTIVE (si no,
    /// `WalletNotActive`); aplica limite diario y chequeo de fondos.
    async fn withdraw(
        &self,
        wallet_id: &WalletId,
        amount: Decimal,
        request_id: Option<&str>,
    ) -> Result<BalanceSummary, WalletError>;

    /// Freeze / unfreeze / close. Billetera inexistente es `NotFound`; los
    /// no-op (unfreeze desde ACTIVE, freeze repetido) no escriben evento.
    async fn transition(
        &self,
        wallet_id: &WalletId,
        action: AdminAction,
        request_id: Option<&str>,
    ) -> Result<StatusSummary, WalletError>;

    /// Fija (`Some`, positivo) o remueve (`None`) el limite diario, con los
    /// tipos de evento dedicados DAILY_LIMIT_SET / DAILY_LIMIT_REMOVED.
    async fn set_daily_limit(
        &self,
        wallet_id: &WalletId,
        limit: Option<Decimal>,
        request_id: Option<&str>,
    ) -> Result<LimitSummary, WalletError>;
}

/// Registro de idempotencia a insertar junto con la pierna final de la saga.
#[derive(Debug, Clone)]
pub struct IdempotencyEntry {
    pub request_id: String,
    pub response: StoredResponse,
}

/// Puerto entre el motor de sagas y el motor de billeteras.
///
/// La saga orquesta; cada pierna es una transaccion propia que bloquea UNA
/// billetera, muta el balance, transiciona la saga y deja el evento + fila
/// de outbox. La dependencia es unidireccional: la saga llama al motor de
/// billeteras a traves de este trait, nunca al reves.
#[async_trait]
pub trait TransferLegs: Send + Sync {
    /// Valida precondiciones (origen existe, divisas compatibles),
    /// auto-provisiona el destino heredando la divisa del origen, inserta
    /// la saga en PENDING y emite TRANSFER_INITIATED.
    async fn create_saga(
        &self,
        from: &WalletId,
        to: &WalletId,
        amount: Decimal,
    ) -> Result<TransferSaga, TransferError>;

    /// Pierna de debito: bloquea el origen, aplica semantica de retiro,
    /// transiciona PENDING -> DEBITED y registra FUNDS_WITHDRAWN.
    async fn debit(&self, saga: &TransferSaga) -> Result<(), TransferError>;

    /// Pierna de credito: bloquea el destino (debe estar ACTIVE), acredita
    /// y registra FUNDS_DEPOSITED con `{sagaId, leg}` idempotente.
    async fn credit(&self, saga: &TransferSaga) -> Result<(), TransferError>;

    /// Transiciona DEBITED -> COMPLETED, registra TRANSFER_COMPLETED y, si
    /// corresponde, inserta el registro de idempotencia en la misma
    /// transaccion.
    async fn complete(
        &self,
        saga: &TransferSaga,
        idempotency: Option<IdempotencyEntry>,
    ) -> Result<(), TransferError>;

    /// Marca una saga que nunca debito como PENDING -> FAILED con la razon.
    async fn fail_pending(&self, saga: &TransferSaga, reason: &str) -> Result<(), TransferError>;

    /// Compensacion: reembolsa el origen (camino privilegiado, acepta
    /// FROZEN), transiciona DEBITED -> COMPENSATED y emite
    /// TRANSFER_COMPENSATED + TRANSFER_FAILED. Si el origen esta CLOSED no
    /// hay reembolso y la saga termina FAILED. Devuelve el estado final.
    async fn compensate(
        &self,
        saga: &TransferSaga,
        reason: &str,
    ) -> Result<TransferSagaState, TransferError>;

    /// Recarga una saga por id (usado por la recuperacion).
    async fn load_saga(&self, id: SagaId) -> Result<Option<TransferSaga>, TransferError>;

    /// Sagas varadas en DEBITED hace mas de `stuck_for`.
    async fn find_stuck_sagas(
        &self,
        stuck_for: Duration,
        limit: i64,
    ) -> Result<Vec<SagaId>, TransferError>;
}
