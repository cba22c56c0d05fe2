use async_trait::async_trait;
use chrono::Utc;
use common::events::{EventMessage, WalletEventType};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::entities::{
    NewOutboxEvent, NewWalletEvent, TransferSaga, TransferSagaState, Wallet,
};
use crate::domain::error::{TransferError, WalletError};
use crate::domain::gateways::{IdempotencyEntry, TransferLegs};
use crate::domain::types::{SagaId, WalletId};
use crate::infrastructure::coordinator::{TransactionCoordinator, TxOptions};
use crate::infrastructure::persistence::idempotency_repository::PostgresIdempotencyRepository;
use crate::infrastructure::persistence::saga_repository::PostgresSagaRepository;
use crate::infrastructure::persistence::wallet_repository::PostgresWalletRepository;
use crate::infrastructure::persistence::event_repository::PostgresEventRepository;
use crate::infrastructure::retry::{with_retries, RetryPolicy};

/// Implementacion SQL de las piernas de transferencia.
///
/// Cada pierna abre su propia transaccion via el coordinador, bloquea UNA
/// billetera y re-verifica el estado de la saga antes de transicionar. La
/// saga nunca sostiene los dos locks de billetera a la vez.
pub struct SqlTransferLegs {
    coordinator: Arc<TransactionCoordinator>,
    sagas: Arc<PostgresSagaRepository>,
    retry: RetryPolicy,
}

impl SqlTransferLegs {
    pub fn new(
        coordinator: Arc<TransactionCoordinator>,
        sagas: Arc<PostgresSagaRepository>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            coordinator,
            sagas,
            retry,
        }
    }

    async fn create_saga_once(
        &self,
        from: &WalletId,
        to: &WalletId,
        amount: Decimal,
    ) -> Result<TransferSaga, TransferError> {
        let mut ctx = self.coordinator.begin(TxOptions::default()).await?;

        let source = PostgresWalletRepository::fetch(ctx.conn(), from)
            .await?
            .ok_or_else(|| WalletError::WalletNotActive(from.clone()))?;

        // Destino: se auto-provisiona heredando la divisa del origen.
        let destination = PostgresWalletRepository::fetch(ctx.conn(), to).await?;
        match &destination {
            Some(dest) if dest.currency() != source.currency() => {
                return Err(WalletError::CurrencyMismatch {
                    from: source.currency().to_string(),
                    to: dest.currency().to_string(),
                }
                .into());
            }
            Some(_) => {}
            None => {
                let wallet = Wallet::open(to.clone(), source.currency())?;
                PostgresWalletRepository::insert(ctx.conn(), &wallet).await?;
                let created = NewWalletEvent::new(
                    to.clone(),
                    WalletEventType::WalletCreated,
                    source.currency(),
                    None,
                    serde_json::json!({ "provisionedBy": "transfer" }),
                );
                PostgresEventRepository::insert(ctx.conn(), &created).await?;
                ctx.publish_event(NewOutboxEvent::mirror(&created));
            }
        }

        let saga = TransferSaga::new(
            from.clone(),
            to.clone(),
            amount,
            source.currency().to_string(),
        )?;
        PostgresSagaRepository::insert(ctx.conn(), &saga).await?;

        let initiated = NewWalletEvent::new(
            from.clone(),
            WalletEventType::TransferInitiated,
            saga.currency(),
            Some(saga.amount()),
            serde_json::json!({
                "sagaId": saga.id().to_string(),
                "transferTo": to.to_string(),
            }),
        );
        PostgresEventRepository::insert(ctx.conn(), &initiated).await?;
        ctx.publish_event(NewOutboxEvent::mirror(&initiated));

        ctx.commit().await?;
        Ok(saga)
    }

    async fn debit_once(&self, saga: &TransferSaga) -> Result<(), TransferError> {
        let mut ctx = self.coordinator.begin(TxOptions::default()).await?;

        let mut current = PostgresSagaRepository::find_for_update(ctx.conn(), saga.id())
            .await?
            .ok_or(TransferError::SagaNotFound(saga.id()))?;

        match current.state() {
            TransferSagaState::Pending => {}
            // Reintento tras un commit que no llego a reportarse: ya debitada.
            TransferSagaState::Debited => return Ok(()),
            other => {
                return Err(TransferError::IllegalTransition {
                    from: other.as_str().to_string(),
                    to: TransferSagaState::Debited.as_str().to_string(),
                });
            }
        }

        let mut source = PostgresWalletRepository::find_for_update(ctx.conn(), saga.from_wallet_id())
            .await?
            .ok_or_else(|| WalletError::WalletNotActive(saga.from_wallet_id().clone()))?;

        // Semantica completa de retiro: estado, limite diario y fondos.
        source.withdraw(saga.amount(), Utc::now().date_naive())?;
        PostgresWalletRepository::update(ctx.conn(), &source).await?;

        current.transition(TransferSagaState::Debited)?;
        PostgresSagaRepository::update(ctx.conn(), &current).await?;

        let withdrawn = NewWalletEvent::new(
            saga.from_wallet_id().clone(),
            WalletEventType::FundsWithdrawn,
            saga.currency(),
            Some(saga.amount()),
            serde_json::json!({
                "sagaId": saga.id().to_string(),
                "transferTo": saga.to_wallet_id().to_string(),
                "leg": "debit",
            }),
        );
        PostgresEventRepository::insert(ctx.conn(), &withdrawn).await?;
        ctx.publish_event(NewOutboxEvent::mirror(&withdrawn));

        ctx.commit().await?;
        Ok(())
    }

    async fn credit_once(&self, saga: &TransferSaga) -> Result<(), TransferError> {
        let mut ctx = self.coordinator.begin(TxOptions::default()).await?;

        let current = PostgresSagaRepository::find_for_update(ctx.conn(), saga.id())
            .await?
            .ok_or(TransferError::SagaNotFound(saga.id()))?;

        match current.state() {
            TransferSagaState::Debited => {}
            // La saga ya termino; el credito quedo aplicado en su momento.
            TransferSagaState::Completed => return Ok(()),
            other => {
                return Err(TransferError::IllegalTransition {
                    from: other.as_str().to_string(),
                    to: TransferSagaState::Completed.as_str().to_string(),
                });
            }
        }

        let mut destination =
            PostgresWalletRepository::find_for_update(ctx.conn(), saga.to_wallet_id())
                .await?
                .ok_or_else(|| WalletError::WalletNotActive(saga.to_wallet_id().clone()))?;

        destination.credit(saga.amount(), false)?;
        PostgresWalletRepository::update(ctx.conn(), &destination).await?;

        let deposited = NewWalletEvent::new(
            saga.to_wallet_id().clone(),
            WalletEventType::FundsDeposited,
            saga.currency(),
            Some(saga.amount()),
            serde_json::json!({
                "sagaId": saga.id().to_string(),
                "transferFrom": saga.from_wallet_id().to_string(),
                "leg": "credit",
            }),
        );

        // El indice unico (sagaId, leg) hace idempotente esta pierna: si el
        // evento ya existe, el credito ya se aplico en un intento anterior y
        // esta transaccion entera debe descartarse.
        match PostgresEventRepository::insert(ctx.conn(), &deposited).await {
            Ok(_) => {}
            Err(WalletError::DuplicateKey(_)) => {
                drop(ctx);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        ctx.publish_event(NewOutboxEvent::mirror(&deposited));

        ctx.commit().await?;
        Ok(())
    }

    async fn complete_once(
        &self,
        saga: &TransferSaga,
        idempotency: Option<&IdempotencyEntry>,
    ) -> Result<(), TransferError> {
        let mut ctx = self.coordinator.begin(TxOptions::default()).await?;

        let mut current = PostgresSagaRepository::find_for_update(ctx.conn(), saga.id())
            .await?
            .ok_or(TransferError::SagaNotFound(saga.id()))?;

        if current.state() == TransferSagaState::Completed {
            return Ok(());
        }

        current.transition(TransferSagaState::Completed)?;
        PostgresSagaRepository::update(ctx.conn(), &current).await?;

        let completed = NewWalletEvent::new(
            saga.from_wallet_id().clone(),
            WalletEventType::TransferCompleted,
            saga.currency(),
            Some(saga.amount()),
            serde_json::json!({
                "sagaId": saga.id().to_string(),
                "transferTo": saga.to_wallet_id().to_string(),
            }),
        );
        PostgresEventRepository::insert(ctx.conn(), &completed).await?;
        ctx.publish_event(NewOutboxEvent::mirror(&completed));

        if let Some(entry) = idempotency {
            PostgresIdempotencyRepository::insert(
                ctx.conn(),
                &entry.request_id,
                &entry.response,
            )
            .await?;
        }

        ctx.commit().await?;
        Ok(())
    }

    async fn fail_pending_once(
        &self,
        saga: &TransferSaga,
        reason: &str,
    ) -> Result<(), TransferError> {
        let mut ctx = self.coordinator.begin(TxOptions::default()).await?;

        let mut current = PostgresSagaRepository::find_for_update(ctx.conn(), saga.id())
            .await?
            .ok_or(TransferError::SagaNotFound(saga.id()))?;

        if current.state() == TransferSagaState::Failed {
            return Ok(());
        }

        current.transition(TransferSagaState::Failed)?;
        current.record_reason("failureReason", reason);
        PostgresSagaRepository::update(ctx.conn(), &current).await?;

        let failed = NewWalletEvent::new(
            saga.from_wallet_id().clone(),
            WalletEventType::TransferFailed,
            saga.currency(),
            Some(saga.amount()),
            serde_json::json!({
                "sagaId": saga.id().to_string(),
                "reason": reason,
            }),
        );
        PostgresEventRepository::insert(ctx.conn(), &failed).await?;
        ctx.publish_event(NewOutboxEvent::mirror(&failed));

        ctx.commit().await?;
        Ok(())
    }

    async fn compensate_once(
        &self,
        saga: &TransferSaga,
        reason: &str,
    ) -> Result<TransferSagaState, TransferError> {
        let mut ctx = self.coordinator.begin(TxOptions::default()).await?;

        let mut current = PostgresSagaRepository::find_for_update(ctx.conn(), saga.id())
            .await?
            .ok_or(TransferError::SagaNotFound(saga.id()))?;

        match current.state() {
            TransferSagaState::Debited => {}
            TransferSagaState::Compensated => return Ok(TransferSagaState::Compensated),
            TransferSagaState::Failed => return Ok(TransferSagaState::Failed),
            other => {
                return Err(TransferError::IllegalTransition {
                    from: other.as_str().to_string(),
                    to: TransferSagaState::Compensated.as_str().to_string(),
                });
            }
        }

        let mut source = PostgresWalletRepository::find_for_update(ctx.conn(), saga.from_wallet_id())
            .await?
            .ok_or_else(|| WalletError::WalletNotActive(saga.from_wallet_id().clone()))?;

        let final_state = if source.status() == crate::domain::entities::WalletStatus::Closed {
            // Sin reembolso posible: la saga termina FAILED por la unica
            // arista legal (DEBITED -> COMPENSATED -> FAILED).
            current.transition(TransferSagaState::Compensated)?;
            current.record_reason("compensationReason", "refund skipped: source wallet closed");
            current.transition(TransferSagaState::Failed)?;
            current.record_reason("failureReason", reason);
            PostgresSagaRepository::update(ctx.conn(), &current).await?;
            TransferSagaState::Failed
        } else {
            // Camino privilegiado: el refund entra aunque el origen este
            // congelado.
            source.credit(saga.amount(), true)?;
            PostgresWalletRepository::update(ctx.conn(), &source).await?;

            let compensated = NewWalletEvent::new(
                saga.from_wallet_id().clone(),
                WalletEventType::TransferCompensated,
                saga.currency(),
                Some(saga.amount()),
                serde_json::json!({
                    "sagaId": saga.id().to_string(),
                    "reason": reason,
                    "leg": "compensation",
                }),
            );
            match PostgresEventRepository::insert(ctx.conn(), &compensated).await {
                Ok(_) => ctx.publish_event(NewOutboxEvent::mirror(&compensated)),
                // Refund ya aplicado por un intento anterior.
                Err(WalletError::DuplicateKey(_)) => {
                    drop(ctx);
                    return Ok(TransferSagaState::Compensated);
                }
                Err(e) => return Err(e.into()),
            }

            current.transition(TransferSagaState::Compensated)?;
            current.record_reason("compensationReason", reason);
            PostgresSagaRepository::update(ctx.conn(), &current).await?;
            TransferSagaState::Compensated
        };

        // La falla de la transferencia se notifica siempre rio abajo.
        ctx.publish_event(NewOutboxEvent {
            id: Uuid::new_v4(),
            aggregate_id: saga.from_wallet_id().to_string(),
            event_type: WalletEventType::TransferFailed,
            payload: EventMessage {
                event_type: WalletEventType::TransferFailed,
                wallet_id: saga.from_wallet_id().to_string(),
                amount: Some(saga.amount()),
                metadata: serde_json::json!({
                    "sagaId": saga.id().to_string(),
                    "reason": reason,
                }),
                timestamp: Utc::now(),
            },
        });

        ctx.commit().await?;
        Ok(final_state)
    }
}

#[async_trait]
impl TransferLegs for SqlTransferLegs {
    async fn create_saga(
        &self,
        from: &WalletId,
        to: &WalletId,
        amount: Decimal,
    ) -> Result<TransferSaga, TransferError> {
        with_retries(&self.retry, "transfer.create_saga", || {
            self.create_saga_once(from, to, amount)
        })
        .await
    }

    async fn debit(&self, saga: &TransferSaga) -> Result<(), TransferError> {
        with_retries(&self.retry, "transfer.debit", || self.debit_once(saga)).await
    }

    async fn credit(&self, saga: &TransferSaga) -> Result<(), TransferError> {
        with_retries(&self.retry, "transfer.credit", || self.credit_once(saga)).await
    }

    async fn complete(
        &self,
        saga: &TransferSaga,
        idempotency: Option<IdempotencyEntry>,
    ) -> Result<(), TransferError> {
        with_retries(&self.retry, "transfer.complete", || {
            self.complete_once(saga, idempotency.as_ref())
        })
        .await
    }

    async fn fail_pending(&self, saga: &TransferSaga, reason: &str) -> Result<(), TransferError> {
        with_retries(&self.retry, "transfer.fail_pending", || {
            self.fail_pending_once(saga, reason)
        })
        .await
    }

    async fn compensate(
        &self,
        saga: &TransferSaga,
        reason: &str,
    ) -> Result<TransferSagaState, TransferError> {
        with_retries(&self.retry, "transfer.compensate", || {
            self.compensate_once(saga, reason)
        })
        .await
    }

    async fn load_saga(&self, id: SagaId) -> Result<Option<TransferSaga>, TransferError> {
        Ok(self.sagas.find_by_id(id).await?)
    }

    async fn find_stuck_sagas(
        &self,
        stuck_for: Duration,
        limit: i64,
    ) -> Result<Vec<SagaId>, TransferError> {
        Ok(self.sagas.find_stuck(stuck_for, limit).await?)
    }
}
