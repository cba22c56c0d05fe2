use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::entities::TransferSagaState;
use crate::domain::error::TransferError;
use crate::domain::gateways::TransferLegs;
use crate::domain::repository::BalanceCache;
use crate::domain::types::SagaId;

/// Caso de uso: recuperar una saga varada en DEBITED.
///
/// Reintenta la pierna de credito y el completado; si el credito vuelve a
/// fallar, compensa con razon `Recovery failed: ...`. Es idempotente porque
/// cada pierna re-verifica el estado actual de la saga y el evento de
/// credito esta indexado por `(sagaId, leg)`.
pub struct RecoverSagaUseCase {
    legs: Arc<dyn TransferLegs>,
    balance_cache: Arc<dyn BalanceCache>,
}

impl RecoverSagaUseCase {
    pub fn new(legs: Arc<dyn TransferLegs>, balance_cache: Arc<dyn BalanceCache>) -> Self {
        Self {
            legs,
            balance_cache,
        }
    }

    #[tracing::instrument(name = "RecoverSagaUseCase::execute", skip(self))]
    pub async fn execute(&self, saga_id: SagaId) -> Result<TransferSagaState, TransferError> {
        let saga = self
            .legs
            .load_saga(saga_id)
            .await?
            .ok_or(TransferError::SagaNotFound(saga_id))?;

        // Otra replica (o el flujo original) pudo haberla avanzado.
        if saga.state() != TransferSagaState::Debited {
            return Ok(saga.state());
        }

        let outcome = async {
            self.legs.credit(&saga).await?;
            self.legs.complete(&saga, None).await
        }
        .await;

        let final_state = match outcome {
            Ok(()) => {
                info!(saga_id = %saga_id, "stuck saga completed by recovery");
                TransferSagaState::Completed
            }
            Err(e) => {
                let reason = format!("Recovery failed: {}", e);
                warn!(saga_id = %saga_id, error = %e, "credit retry failed, compensating");
                self.legs.compensate(&saga, &reason).await?
            }
        };

        for wallet_id in [saga.from_wallet_id(), saga.to_wallet_id()] {
            if let Err(e) = self.balance_cache.invalidate(wallet_id).await {
                warn!(wallet_id = %wallet_id, error = %e, "balance cache invalidation failed");
            }
        }

        Ok(final_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{StoredResponse, TransferSaga};
    use crate::domain::error::WalletError;
    use crate::domain::gateways::IdempotencyEntry;
    use crate::domain::types::WalletId;
    use async_trait::async_trait;
    use mockall::mock;
    use rust_decimal::Decimal;
    use std::time::Duration;

    mock! {
        pub TransferLegsImpl {}

        #[async_trait]
        impl TransferLegs for TransferLegsImpl {
            async fn create_saga(&self, from: &WalletId, to: &WalletId, amount: Decimal) -> Result<TransferSaga, TransferError>;
            async fn debit(&self, saga: &TransferSaga) -> Result<(), TransferError>;
            async fn credit(&self, saga: &TransferSaga) -> Result<(), TransferError>;
            async fn complete(&self, saga: &TransferSaga, idempotency: Option<IdempotencyEntry>) -> Result<(), TransferError>;
            async fn fail_pending(&self, saga: &TransferSaga, reason: &str) -> Result<(), TransferError>;
            async fn compensate(&self, saga: &TransferSaga, reason: &str) -> Result<TransferSagaState, TransferError>;
            async fn load_saga(&self, id: SagaId) -> Result<Option<TransferSaga>, TransferError>;
            async fn find_stuck_sagas(&self, stuck_for: Duration, limit: i64) -> Result<Vec<SagaId>, TransferError>;
        }
    }

    mock! {
        pub BalanceCacheImpl {}

        #[async_trait]
        impl BalanceCache for BalanceCacheImpl {
            async fn get(&self, id: &WalletId) -> Result<Option<Decimal>, WalletError>;
            async fn set(&self, id: &WalletId, balance: Decimal) -> Result<(), WalletError>;
            async fn invalidate(&self, id: &WalletId) -> Result<(), WalletError>;
        }
    }

    fn debited_saga() -> TransferSaga {
        let mut saga = TransferSaga::new(
            WalletId::new("alice"),
            WalletId::new("bob"),
            Decimal::from(100),
            "USD".to_string(),
        )
        .unwrap();
        saga.transition(TransferSagaState::Debited).unwrap();
        saga
    }

    fn lenient_cache() -> MockBalanceCacheImpl {
        let mut cache = MockBalanceCacheImpl::new();
        cache.expect_invalidate().returning(|_| Ok(()));
        cache
    }

    #[tokio::test]
    async fn test_recovery_completes_a_stuck_saga() {
        let mut legs = MockTransferLegsImpl::new();
        let saga = debited_saga();
        let saga_id = saga.id();

        legs.expect_load_saga()
            .returning(move |_| Ok(Some(saga.clone())));
        legs.expect_credit().times(1).returning(|_| Ok(()));
        legs.expect_complete()
            .withf(|_, idem| idem.is_none())
            .times(1)
            .returning(|_, _| Ok(()));
        legs.expect_compensate().times(0);

        let use_case = RecoverSagaUseCase::new(Arc::new(legs), Arc::new(lenient_cache()));
        let state = use_case.execute(saga_id).await.unwrap();

        assert_eq!(state, TransferSagaState::Completed);
    }

    #[tokio::test]
    async fn test_recovery_skips_sagas_no_longer_debited() {
        let mut legs = MockTransferLegsImpl::new();
        let mut saga = debited_saga();
        saga.transition(TransferSagaState::Completed).unwrap();
        let saga_id = saga.id();

        legs.expect_load_saga()
            .returning(move |_| Ok(Some(saga.clone())));
        legs.expect_credit().times(0);
        legs.expect_complete().times(0);

        let use_case = RecoverSagaUseCase::new(Arc::new(legs), Arc::new(lenient_cache()));
        let state = use_case.execute(saga_id).await.unwrap();

        assert_eq!(state, TransferSagaState::Completed);
    }

    #[tokio::test]
    async fn test_recovery_compensates_when_credit_keeps_failing() {
        let mut legs = MockTransferLegsImpl::new();
        let saga = debited_saga();
        let saga_id = saga.id();

        legs.expect_load_saga()
            .returning(move |_| Ok(Some(saga.clone())));
        legs.expect_credit()
            .returning(|_| Err(WalletError::WalletClosed(WalletId::new("bob")).into()));
        legs.expect_compensate()
            .withf(|_, reason| reason.starts_with("Recovery failed:"))
            .times(1)
            .returning(|_, _| Ok(TransferSagaState::Compensated));

        let use_case = RecoverSagaUseCase::new(Arc::new(legs), Arc::new(lenient_cache()));
        let state = use_case.execute(saga_id).await.unwrap();

        assert_eq!(state, TransferSagaState::Compensated);
    }

    #[tokio::test]
    async fn test_recovery_errors_on_unknown_saga() {
        let mut legs = MockTransferLegsImpl::new();
        legs.expect_load_saga().returning(|_| Ok(None));

        let use_case = RecoverSagaUseCase::new(Arc::new(legs), Arc::new(lenient_cache()));
        let result = use_case.execute(SagaId::new()).await;

        assert!(matches!(result, Err(TransferError::SagaNotFound(_))));
    }
}
