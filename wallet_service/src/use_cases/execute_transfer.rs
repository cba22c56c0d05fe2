use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::entities::{validate_amount, Outcome, StoredResponse, TransferSagaState};
use crate::domain::error::{Retryable, TransferError};
use crate::domain::gateways::{IdempotencyEntry, TransferLegs};
use crate::domain::repository::{BalanceCache, IdempotencyStore};
use crate::domain::types::WalletId;
use crate::use_cases::TransferSummary;

/// Caso de uso central: transferencia entre dos billeteras via saga.
///
/// Orquesta las piernas (crear saga -> debitar -> acreditar -> completar) y
/// decide compensación cuando algo falla después del débito. Cada pierna es
/// una transacción propia del motor de billeteras; este caso de uso nunca
/// toca el store directamente.
pub struct ExecuteTransferUseCase {
    legs: Arc<dyn TransferLegs>,
    idempotency: Arc<dyn IdempotencyStore>,
    balance_cache: Arc<dyn BalanceCache>,
}

impl ExecuteTransferUseCase {
    pub fn new(
        legs: Arc<dyn TransferLegs>,
        idempotency: Arc<dyn IdempotencyStore>,
        balance_cache: Arc<dyn BalanceCache>,
    ) -> Self {
        Self {
            legs,
            idempotency,
            balance_cache,
        }
    }

    /// Ejecuta la transferencia completa, manejando idempotencia y
    /// compensación.
    ///
    /// En éxito el estado devuelto es COMPLETED. En falla el llamador ve el
    /// error original y la saga queda COMPENSATED o FAILED en el store (o
    /// DEBITED si la propia compensación falló, para que la recuperación la
    /// retome).
    #[tracing::instrument(name = "ExecuteTransferUseCase::execute", skip(self))]
    pub async fn execute(
        &self,
        from: WalletId,
        to: WalletId,
        amount: Decimal,
        request_id: Option<&str>,
    ) -> Result<Outcome<TransferSummary>, TransferError> {
        // 1. Idempotency Check: mismo request id => misma respuesta, sin
        //    mover fondos otra vez.
        if let Some(rid) = request_id {
            if let Some(stored) = self.idempotency.find(rid).await.map_err(TransferError::from)? {
                return Ok(Outcome::Replayed(stored));
            }
        }

        // 2. Validaciones rapidas antes de cualquier escritura.
        if from == to {
            return Err(TransferError::SameWallet(from));
        }
        validate_amount(amount).map_err(TransferError::from)?;

        // 3. Saga en PENDING + TRANSFER_INITIATED.
        let saga = match self.legs.create_saga(&from, &to, amount).await {
            Ok(saga) => saga,
            Err(e) => {
                self.record_failure(request_id, &e).await;
                return Err(e);
            }
        };

        // 4. Pierna de debito. Si falla, la saga nunca debito: PENDING ->
        //    FAILED y el error de negocio sube al cliente.
        if let Err(e) = self.legs.debit(&saga).await {
            warn!(saga_id = %saga.id(), error = %e, "debit leg failed, failing saga");
            if let Err(fail_err) = self.legs.fail_pending(&saga, &e.to_string()).await {
                error!(saga_id = %saga.id(), error = %fail_err, "could not mark saga FAILED");
            }
            self.record_failure(request_id, &e).await;
            return Err(e);
        }

        let summary = TransferSummary {
            saga_id: saga.id(),
            state: TransferSagaState::Completed,
            from_wallet_id: from.clone(),
            to_wallet_id: to.clone(),
            amount,
        };
        let entry = request_id.map(|rid| IdempotencyEntry {
            request_id: rid.to_string(),
            response: StoredResponse::ok(&summary),
        });

        // 5. Credito + completado. Cualquier falla despues del debito
        //    dispara compensacion.
        let outcome = async {
            self.legs.credit(&saga).await?;
            self.legs.complete(&saga, entry).await
        }
        .await;

        match outcome {
            Ok(()) => {
                info!(saga_id = %saga.id(), "transfer completed");
                self.invalidate_caches(&from, &to).await;
                Ok(Outcome::Fresh(summary))
            }
            Err(e) => {
                warn!(saga_id = %saga.id(), error = %e, "credit leg failed, compensating");
                match self.legs.compensate(&saga, &e.to_string()).await {
                    Ok(final_state) => {
                        info!(saga_id = %saga.id(), state = final_state.as_str(), "saga compensated");
                        self.invalidate_caches(&from, &to).await;
                    }
                    Err(comp_err) => {
                        // La saga queda DEBITED; la recuperacion la retoma.
                        error!(
                            saga_id = %saga.id(),
                            error = %comp_err,
                            "compensation failed, saga left DEBITED for recovery"
                        );
                    }
                }
                self.record_failure(request_id, &e).await;
                Err(e)
            }
        }
    }

    async fn invalidate_caches(&self, from: &WalletId, to: &WalletId) {
        for wallet_id in [from, to] {
            if let Err(e) = self.balance_cache.invalidate(wallet_id).await {
                warn!(wallet_id = %wallet_id, error = %e, "balance cache invalidation failed");
            }
        }
    }

    async fn record_failure(&self, request_id: Option<&str>, error: &TransferError) {
        if let Some(rid) = request_id {
            if error.status_code() == 422 && !error.is_retryable() {
                let stored = StoredResponse {
                    status_code: error.status_code(),
                    body: error.envelope(),
                };
                self.idempotency.record_best_effort(rid, &stored).await;
            }
        }
    }
}
