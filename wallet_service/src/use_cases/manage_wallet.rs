use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::entities::{AdminAction, Outcome, StoredResponse};
use crate::domain::error::{Retryable, WalletError};
use crate::domain::gateways::WalletOps;
use crate::domain::repository::{BalanceCache, IdempotencyStore};
use crate::domain::types::WalletId;
use crate::infrastructure::retry::{with_retries, RetryPolicy};
use crate::use_cases::{LimitSummary, StatusSummary};

/// Caso de uso: operaciones administrativas (freeze, unfreeze, close,
/// limite diario de retiro).
///
/// El motor carga bajo lock, valida en la entidad, y solo escribe evento +
/// fila de outbox cuando hubo cambio real (los no-op responden igual pero
/// no ensucian el journal). El cache de balance se invalida en toda
/// transicion administrativa.
pub struct ManageWalletUseCase {
    ops: Arc<dyn WalletOps>,
    idempotency: Arc<dyn IdempotencyStore>,
    balance_cache: Arc<dyn BalanceCache>,
    retry: RetryPolicy,
}

impl ManageWalletUseCase {
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

    #[tracing::instrument(name = "ManageWalletUseCase::freeze", skip(self))]
    pub async fn freeze(
        &self,
        wallet_id: WalletId,
        request_id: Option<&str>,
    ) -> Result<Outcome<StatusSummary>, WalletError> {
        self.transition(wallet_id, AdminAction::Freeze, request_id)
            .await
    }

    #[tracing::instrument(name = "ManageWalletUseCase::unfreeze", skip(self))]
    pub async fn unfreeze(
        &self,
        wallet_id: WalletId,
        request_id: Option<&str>,
    ) -> Result<Outcome<StatusSummary>, WalletError> {
        self.transition(wallet_id, AdminAction::Unfreeze, request_id)
            .await
    }

    #[tracing::instrument(name = "ManageWalletUseCase::close", skip(self))]
    pub async fn close(
        &self,
        wallet_id: WalletId,
        request_id: Option<&str>,
    ) -> Result<Outcome<StatusSummary>, WalletError> {
        self.transition(wallet_id, AdminAction::Close, request_id)
            .await
    }

    async fn transition(
        &self,
        wallet_id: WalletId,
        action: AdminAction,
        request_id: Option<&str>,
    ) -> Result<Outcome<StatusSummary>, WalletError> {
        if let Some(rid) = request_id {
            if let Some(stored) = self.idempotency.find(rid).await? {
                return Ok(Outcome::Replayed(stored));
            }
        }

        let result = with_retries(&self.retry, "wallet.admin", || {
            self.ops.transition(&wallet_id, action, request_id)
        })
        .await;

        match result {
            Ok(summary) => {
                if let Err(e) = self.balance_cache.invalidate(&wallet_id).await {
                    tracing::warn!(wallet_id = %wallet_id, error = %e, "balance cache invalidation failed");
                }
                Ok(Outcome::Fresh(summary))
            }
            Err(e) => {
                self.record_failure(request_id, &e).await;
                Err(e)
            }
        }
    }

    #[tracing::instrument(name = "ManageWalletUseCase::set_daily_limit", skip(self))]
    pub async fn set_daily_limit(
        &self,
        wallet_id: WalletId,
        limit: Option<Decimal>,
        request_id: Option<&str>,
    ) -> Result<Outcome<LimitSummary>, WalletError> {
        if let Some(rid) = request_id {
            if let Some(stored) = self.idempotency.find(rid).await? {
                return Ok(Outcome::Replayed(stored));
            }
        }

        let result = with_retries(&self.retry, "wallet.set_daily_limit", || {
            self.ops.set_daily_limit(&wallet_id, limit, request_id)
        })
        .await;

        match result {
            Ok(summary) => {
                if let Err(e) = self.balance_cache.invalidate(&wallet_id).await {
                    tracing::warn!(wallet_id = %wallet_id, error = %e, "balance cache invalidation failed");
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
