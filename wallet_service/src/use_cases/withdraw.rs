use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::entities::{validate_amount, Outcome, StoredResponse};
use crate::domain::error::{Retryable, WalletError};
use crate::domain::gateways::WalletOps;
use crate::domain::repository::{BalanceCache, IdempotencyStore};
use crate::domain::types::WalletId;
use crate::infrastructure::retry::{with_retries, RetryPolicy};
use crate::use_cases::BalanceSummary;

/// Caso de uso: retirar fondos de una billetera.
///
/// La billetera debe existir y estar ACTIVE. El acumulado diario se
/// reinicia en el primer retiro de una nueva fecha UTC y el limite diario,
/// si existe, se aplica antes del chequeo de fondos.
pub struct WithdrawUseCase {
    ops: Arc<dyn WalletOps>,
    idempotency: Arc<dyn IdempotencyStore>,
    balance_cache: Arc<dyn BalanceCache>,
    retry: RetryPolicy,
}

impl WithdrawUseCase {
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

    #[tracing::instrument(name = "WithdrawUseCase::execute", skip(self))]
    pub async fn execute(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        request_id: Option<&str>,
    ) -> Result<Outcome<BalanceSummary>, WalletError> {
        if let Some(rid) = request_id {
            if let Some(stored) = self.idempotency.find(rid).await? {
                return Ok(Outcome::Replayed(stored));
            }
        }

        let amount = match validate_amount(amount) {
            Ok(amount) => amount,
            Err(e) => {
                self.record_failure(request_id, &e).await;
                return Err(e);
            }
        };

        let result = with_retries(&self.retry, "wallet.withdraw", || {
            self.ops.withdraw(&wallet_id, amount, request_id)
        })
        .await;

        match result {
            Ok(summary) => {
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
    use std::str::FromStr;
    use std::time::Duration;

    mock! {
        pub WalletOpsImpl {}

        #[async_trait]
        impl WalletOps for WalletOpsImpl {
            async fn deposit<'a>(&'a self, wallet_id: &'a WalletId, amount: Decimal, request_id: Option<&'a str>) -> Result<BalanceSummary, WalletError>;
            async fn withdraw<'a>(&'a self, wallet_id: &'a WalletId, amount: Decimal, request_id: Option<&'a str>) -> Result<BalanceSummary, WalletError>;
            async fn transition<'a>(&'a self, wallet_id: &'a WalletId, action: AdminAction, request_id: Option<&'a str>) -> Result<StatusSummary, WalletError>;
            async fn set_daily_limit<'a>(&'a self, wallet_id: &'a WalletId, limit: Option<Decimal>, request_id: Option<&'a str>) -> Result<LimitSummary, WalletError>;
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
    ) -> WithdrawUseCase {
        WithdrawUseCase::new(
            Arc::new(ops),
            Arc::new(idempotency),
            Arc::new(cache),
            fast_retry(),
        )
    }

    #[tokio::test]
    async fn test_withdraw_applies_and_caches_new_balance() {
        let mut ops = MockWalletOpsImpl::new();
        let mut idempotency = MockIdempotencyStoreImpl::new();
        let mut cache = MockBalanceCacheImpl::new();

        idempotency
            .expect_find()
            .with(eq("req-1"))
            .times(1)
            .returning(|_| Ok(None));
        ops.expect_withdraw()
            .withf(|id, amount, rid| {
                id.as_str() == "alice"
                    && *amount == Decimal::from_str("30.50").unwrap()
                    && rid == &Some("req-1")
            })
            .times(1)
            .returning(|id, _, _| {
                Ok(BalanceSummary {
                    wallet_id: id.clone(),
                    balance: Decimal::from_str("69.50").unwrap(),
                })
            });
        cache
            .expect_set()
            .with(
                eq(WalletId::new("alice")),
                eq(Decimal::from_str("69.50").unwrap()),
            )
            .times(1)
            .returning(|_, _| Ok(()));

        let result = use_case(ops, idempotency, cache)
            .execute(
                WalletId::new("alice"),
                Decimal::from_str("30.50").unwrap(),
                Some("req-1"),
            )
            .await
            .unwrap();

        match result {
            Outcome::Fresh(summary) => {
                assert_eq!(summary.balance, Decimal::from_str("69.50").unwrap());
            }
            Outcome::Replayed(_) => panic!("Expected a fresh withdrawal"),
        }
    }

    #[tokio::test]
    async fn test_missing_wallet_maps_to_not_active_422() {
        let mut ops = MockWalletOpsImpl::new();
        let mut idempotency = MockIdempotencyStoreImpl::new();
        let mut cache = MockBalanceCacheImpl::new();

        idempotency.expect_find().returning(|_| Ok(None));
        // Una billetera inexistente sale como WalletNotActive (422), no 404.
        ops.expect_withdraw()
            .times(1)
            .returning(|id, _, _| Err(WalletError::WalletNotActive(id.clone())));
        idempotency
            .expect_record_best_effort()
            .withf(|rid, stored| {
                rid == "req-9"
                    && stored.status_code == 422
                    && stored.body["type"] == "WalletNotActive"
            })
            .times(1)
            .return_const(());
        cache.expect_set().times(0);

        let result = use_case(ops, idempotency, cache)
            .execute(WalletId::new("ghost"), Decimal::from(10), Some("req-9"))
            .await;

        assert!(matches!(result, Err(WalletError::WalletNotActive(_))));
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_not_retried() {
        let mut ops = MockWalletOpsImpl::new();
        let idempotency = MockIdempotencyStoreImpl::new();
        let mut cache = MockBalanceCacheImpl::new();

        // Error de regla de negocio: exactamente un intento.
        ops.expect_withdraw()
            .times(1)
            .returning(|id, _, _| Err(WalletError::InsufficientFunds(id.clone())));
        cache.expect_set().times(0);

        let result = use_case(ops, idempotency, cache)
            .execute(WalletId::new("alice"), Decimal::from(1000), None)
            .await;

        assert!(matches!(result, Err(WalletError::InsufficientFunds(_))));
    }

    #[tokio::test]
    async fn test_replay_returns_stored_response_without_side_effects() {
        let mut ops = MockWalletOpsImpl::new();
        let mut idempotency = MockIdempotencyStoreImpl::new();
        let cache = MockBalanceCacheImpl::new();

        idempotency
            .expect_find()
            .with(eq("req-7"))
            .times(1)
            .returning(|_| {
                Ok(Some(StoredResponse {
                    status_code: 422,
                    body: serde_json::json!({
                        "statusCode": 422,
                        "error": "Unprocessable Entity",
                        "message": "Insufficient funds in wallet: alice",
                        "type": "InsufficientFunds",
                    }),
                }))
            });
        ops.expect_withdraw().times(0);

        // El replay devuelve el sobre original intacto, incluso si fue un
        // error.
        let result = use_case(ops, idempotency, cache)
            .execute(WalletId::new("alice"), Decimal::from(50), Some("req-7"))
            .await
            .unwrap();

        match result {
            Outcome::Replayed(stored) => {
                assert_eq!(stored.status_code, 422);
                assert_eq!(stored.body["type"], "InsufficientFunds");
            }
            Outcome::Fresh(_) => panic!("Expected a replayed response"),
        }
    }

    #[tokio::test]
    async fn test_transient_store_error_is_retried() {
        let mut ops = MockWalletOpsImpl::new();
        let idempotency = MockIdempotencyStoreImpl::new();
        let mut cache = MockBalanceCacheImpl::new();

        ops.expect_withdraw()
            .times(1)
            .returning(|_, _, _| Err(WalletError::StoreConflict("serialization failure".into())));
        ops.expect_withdraw().times(1).returning(|id, _, _| {
            Ok(BalanceSummary {
                wallet_id: id.clone(),
                balance: Decimal::from(40),
            })
        });
        cache.expect_set().returning(|_, _| Ok(()));

        let result = use_case(ops, idempotency, cache)
            .execute(WalletId::new("alice"), Decimal::from(10), None)
            .await;

        assert!(matches!(result, Ok(Outcome::Fresh(_))));
    }
}
