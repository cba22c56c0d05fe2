use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::entities::{validate_amount, Outcome, StoredResponse};
use crate::domain::error::{Retryable, WalletError};
use crate::domain::gateways::WalletOps;
use crate::domain::repository::{BalanceCache, IdempotencyStore};
use crate::domain::types::WalletId;
use crate::infrastructure::retry::{with_retries, RetryPolicy};
use crate::use_cases::BalanceSummary;

/// Caso de uso: depositar fondos en una billetera.
///
/// Si la billetera no existe, el motor la auto-provisiona (balance 0,
/// divisa por defecto) y emite WALLET_CREATED en la misma transaccion que
/// el deposito. Toda la operacion es idempotente cuando llega `request_id`.
pub struct DepositUseCase {
    ops: Arc<dyn WalletOps>,
    idempotency: Arc<dyn IdempotencyStore>,
    balance_cache: Arc<dyn BalanceCache>,
    retry: RetryPolicy,
}

impl DepositUseCase {
    pub fn new(
        ops: Arc<dyn WalletOps>,
        idempotency: Arc<dyn IdempotencyStore>,
        balance_cache: Arc<dyn BalanceCache>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ops,
            idempotency,
            balance_cache,
            retry,
        }
    }

    #[tracing::instrument(name = "DepositUseCase::execute", skip(self))]
    pub async fn execute(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        request_id: Option<&str>,
    ) -> Result<Outcome<BalanceSummary>, WalletError> {
        // 1. Idempotency Check: un request ya visto devuelve la respuesta
        //    almacenada sin efectos, sea exito o sobre de error.
        if let Some(rid) = request_id {
            if let Some(stored) = self.idempotency.find(rid).await? {
                return Ok(Outcome::Replayed(stored));
            }
        }

        // 2. Validacion rapida, antes de tocar el store.
        let amount = match validate_amount(amount) {
            Ok(amount) => amount,
            Err(e) => {
                self.record_failure(request_id, &e).await;
                return Err(e);
            }
        };

        // 3. Ejecucion bajo la politica compartida de reintentos.
        let result = with_retries(&self.retry, "wallet.deposit", || {
            self.ops.deposit(&wallet_id, amount, request_id)
        })
        .await;

        match result {
            Ok(summary) => {
                // Write-through del balance; una falla aqui solo se loguea.
                if let Err(e) = self.balance_cache.set(&wallet_id, summary.balance).await {
                    tracing::warn!(wallet_id = %wallet_id, error = %e, "balance cache update failed");
                }
                Ok(Outcome::Fresh(summary))
            }
            Err(e) => {
                self.record_failure(request_id, &e).await;
                Err(e)
            }
        }
    }

    async fn record_failure(&self, request_id: Option<&str>, error: &WalletError) {
        // Solo las violaciones de regla de negocio se registran: un replay
        // debe devolver el mismo sobre 422 sin re-ejecutar nada.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AdminAction, LimitSummary, StatusSummary};
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::*;
    use std::time::Duration;

    mock! {
        pub WalletOpsImpl {}

        #[async_trait]
        impl WalletOps for WalletOpsImpl {
            async fn deposit(&self, wallet_id: &WalletId, amount: Decimal, request_id: Option<&str>) -> Result<BalanceSummary, WalletError>;
            async fn withdraw(&self, wallet_id: &WalletId, amount: Decimal, request_id: Option<&str>) -> Result<BalanceSummary, WalletError>;
            async fn transition(&self, wallet_id: &WalletId, action: AdminAction, request_id: Option<&str>) -> Result<StatusSummary, WalletError>;
            async fn set_daily_limit(&self, wallet_id: &WalletId, limit: Option<Decimal>, request_id: Option<&str>) -> Result<LimitSummary, WalletError>;
        }
    }

    mock! {
        pub IdempotencyStoreImpl {}

        #[async_trait]
        impl IdempotencyStore for IdempotencyStoreImpl {
            async fn find(&self, request_id: &str) -> Result<Option<StoredResponse>, WalletError>;
            async fn record_best_effort(&self, request_id: &str, response: &StoredResponse);
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

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            backoff_factor: 2,
            max_backoff: Duration::from_millis(2),
            max_jitter: Duration::from_millis(1),
        }
    }

    fn use_case(
        ops: MockWalletOpsImpl,
        idempotency: MockIdempotencyStoreImpl,
        cache: MockBalanceCacheImpl,
    ) -> DepositUseCase {
        DepositUseCase::new(
            Arc::new(ops),
            Arc::new(idempotency),
            Arc::new(cache),
            fast_retry(),
        )
    }

    #[tokio::test]
    async fn test_deposit_applies_and_caches_new_balance() {
        let mut ops = MockWalletOpsImpl::new();
        let mut idempotency = MockIdempotencyStoreImpl::new();
        let mut cache = MockBalanceCacheImpl::new();

        idempotency
            .expect_find()
            .with(eq("req-1"))
            .times(1)
            .returning(|_| Ok(None));
        // Una sola llamada al motor: auto-provision + WALLET_CREATED +
        // FUNDS_DEPOSITED viven en esa unica transaccion (escenario de la
        // primera billetera "alice").
        ops.expect_deposit()
            .withf(|id, amount, rid| {
                id.as_str() == "alice" && *amount == Decimal::from(100) && rid == &Some("req-1")
            })
            .times(1)
            .returning(|id, amount, _| {
                Ok(BalanceSummary {
                    wallet_id: id.clone(),
                    balance: amount,
                })
            });
        cache
            .expect_set()
            .with(eq(WalletId::new("alice")), eq(Decimal::from(100)))
            .times(1)
            .returning(|_, _| Ok(()));

        let result = use_case(ops, idempotency, cache)
            .execute(WalletId::new("alice"), Decimal::from(100), Some("req-1"))
            .await
            .unwrap();

        match result {
            Outcome::Fresh(summary) => {
                assert_eq!(summary.wallet_id, WalletId::new("alice"));
                assert_eq!(summary.balance, Decimal::from(100));
            }
            Outcome::Replayed(_) => panic!("Expected a fresh deposit"),
        }
    }

    #[tokio::test]
    async fn test_replay_returns_stored_response_without_side_effects() {
        let mut ops = MockWalletOpsImpl::new();
        let mut idempotency = MockIdempotencyStoreImpl::new();
        let mut cache = MockBalanceCacheImpl::new();

        idempotency
            .expect_find()
            .with(eq("req-1"))
            .times(1)
            .returning(|_| {
                Ok(Some(StoredResponse {
                    status_code: 200,
                    body: serde_json::json!({"walletId": "alice", "balance": 100.0}),
                }))
            });
        // Sin segundo deposito y sin tocar el cache.
        ops.expect_deposit().times(0);
        cache.expect_set().times(0);

        let result = use_case(ops, idempotency, cache)
            .execute(WalletId::new("alice"), Decimal::from(100), Some("req-1"))
            .await
            .unwrap();

        match result {
            Outcome::Replayed(stored) => {
                assert_eq!(stored.status_code, 200);
                assert_eq!(stored.body["balance"], 100.0);
            }
            Outcome::Fresh(_) => panic!("Expected a replayed response"),
        }
    }

    #[tokio::test]
    async fn test_cache_failure_degrades_to_a_warning() {
        let mut ops = MockWalletOpsImpl::new();
        let idempotency = MockIdempotencyStoreImpl::new();
        let mut cache = MockBalanceCacheImpl::new();

        ops.expect_deposit().times(1).returning(|id, amount, _| {
            Ok(BalanceSummary {
                wallet_id: id.clone(),
                balance: amount,
            })
        });
        cache
            .expect_set()
            .times(1)
            .returning(|_, _| Err(WalletError::CacheError("connection refused".into())));

        // El deposito sigue siendo exitoso aunque el write-through falle.
        let result = use_case(ops, idempotency, cache)
            .execute(WalletId::new("alice"), Decimal::from(25), None)
            .await;

        assert!(matches!(result, Ok(Outcome::Fresh(_))));
    }

    #[tokio::test]
    async fn test_invalid_amount_records_envelope_without_store_calls() {
        let mut ops = MockWalletOpsImpl::new();
        let mut idempotency = MockIdempotencyStoreImpl::new();
        let mut cache = MockBalanceCacheImpl::new();

        idempotency.expect_find().returning(|_| Ok(None));
        idempotency
            .expect_record_best_effort()
            .withf(|rid, stored| rid == "req-2" && stored.status_code == 422)
            .times(1)
            .return_const(());
        ops.expect_deposit().times(0);
        cache.expect_set().times(0);

        let result = use_case(ops, idempotency, cache)
            .execute(WalletId::new("alice"), Decimal::from(-5), Some("req-2"))
            .await;

        assert!(matches!(result, Err(WalletError::InvalidAmount(_))));
    }

    #[tokio::test]
    async fn test_transient_store_error_is_retried() {
        let mut ops = MockWalletOpsImpl::new();
        let idempotency = MockIdempotencyStoreImpl::new();
        let mut cache = MockBalanceCacheImpl::new();

        ops.expect_deposit()
            .times(1)
            .returning(|_, _, _| Err(WalletError::StoreConflict("deadlock".into())));
        ops.expect_deposit().times(1).returning(|id, amount, _| {
            Ok(BalanceSummary {
                wallet_id: id.clone(),
                balance: amount,
            })
        });
        cache.expect_set().returning(|_, _| Ok(()));

        let result = use_case(ops, idempotency, cache)
            .execute(WalletId::new("alice"), Decimal::from(10), None)
            .await;

        assert!(matches!(result, Ok(Outcome::Fresh(_))));
    }
}
