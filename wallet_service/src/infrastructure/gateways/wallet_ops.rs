use async_trait::async_trait;
use chrono::Utc;
use common::events::WalletEventType;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::entities::{
    AdminAction, BalanceSummary, LimitSummary, NewOutboxEvent, NewWalletEvent, StatusSummary,
    StoredResponse, Wallet,
};
use crate::domain::error::WalletError;
use crate::domain::gateways::WalletOps;
use crate::domain::types::WalletId;
use crate::infrastructure::coordinator::{TransactionCoordinator, TxContext, TxOptions};
use crate::infrastructure::persistence::event_repository::PostgresEventRepository;
use crate::infrastructure::persistence::idempotency_repository::PostgresIdempotencyRepository;
use crate::infrastructure::persistence::wallet_repository::PostgresWalletRepository;

/// Implementacion SQL de las operaciones del motor de billeteras.
///
/// Cada operacion abre una transaccion coordinada, toma el lock de fila y
/// deja (mutacion + evento + fila de outbox + registro de idempotencia) en
/// un solo commit.
pub struct SqlWalletOps {
    coordinator: Arc<TransactionCoordinator>,
    default_currency: String,
}

impl SqlWalletOps {
    pub fn new(coordinator: Arc<TransactionCoordinator>, default_currency: String) -> Self {
        Self {
            coordinator,
            default_currency,
        }
    }

    async fn append_event(
        ctx: &mut TxContext,
        wallet: &Wallet,
        event_type: WalletEventType,
        amount: Option<Decimal>,
        request_id: Option<&str>,
    ) -> Result<(), WalletError> {
        let event = NewWalletEvent::new(
            wallet.id().clone(),
            event_type,
            wallet.currency(),
            amount,
            match request_id {
                Some(rid) => serde_json::json!({ "requestId": rid }),
                None => serde_json::json!({}),
            },
        );
        PostgresEventRepository::insert(ctx.conn(), &event).await?;
        ctx.publish_event(NewOutboxEvent::mirror(&event));
        Ok(())
    }

    async fn record_response<T: serde::Serialize>(
        ctx: &mut TxContext,
        request_id: Option<&str>,
        summary: &T,
    ) -> Result<(), WalletError> {
        // Ultimo paso de la transaccion: el registro de idempotencia viaja
        // con el cambio de estado, o ninguno de los dos persiste.
        if let Some(rid) = request_id {
            PostgresIdempotencyRepository::insert(ctx.conn(), rid, &StoredResponse::ok(summary))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl WalletOps for SqlWalletOps {
    async fn deposit(
        &self,
        wallet_id: &WalletId,
        amount: Decimal,
        request_id: Option<&str>,
    ) -> Result<BalanceSummary, WalletError> {
        let mut ctx = self
            .coordinator
            .begin(TxOptions::with_request_id(request_id))
            .await?;

        let (mut wallet, created) =
            match PostgresWalletRepository::find_for_update(ctx.conn(), wallet_id).await? {
                Some(wallet) => (wallet, false),
                None => (
                    Wallet::open(wallet_id.clone(), &self.default_currency)?,
                    true,
                ),
            };

        if created {
            PostgresWalletRepository::insert(ctx.conn(), &wallet).await?;
            let created_event = NewWalletEvent::new(
                wallet_id.clone(),
                WalletEventType::WalletCreated,
                wallet.currency(),
                None,
                serde_json::json!({ "provisionedBy": "deposit" }),
            );
            PostgresEventRepository::insert(ctx.conn(), &created_event).await?;
            ctx.publish_event(NewOutboxEvent::mirror(&created_event));
        }

        wallet.deposit(amount)?;
        PostgresWalletRepository::update(ctx.conn(), &wallet).await?;

        Self::append_event(
            &mut ctx,
            &wallet,
            WalletEventType::FundsDeposited,
            Some(amount),
            request_id,
        )
        .await?;

        let summary = BalanceSummary {
            wallet_id: wallet_id.clone(),
            balance: wallet.balance(),
        };
        Self::record_response(&mut ctx, request_id, &summary).await?;

        ctx.commit().await?;
        Ok(summary)
    }

    async fn withdraw(
        &self,
        wallet_id: &WalletId,
        amount: Decimal,
        request_id: Option<&str>,
    ) -> Result<BalanceSummary, WalletError> {
        let mut ctx = self
            .coordinator
            .begin(TxOptions::with_request_id(request_id))
            .await?;

        let mut wallet = PostgresWalletRepository::find_for_update(ctx.conn(), wallet_id)
            .await?
            .ok_or_else(|| WalletError::WalletNotActive(wallet_id.clone()))?;

        wallet.withdraw(amount, Utc::now().date_naive())?;
        PostgresWalletRepository::update(ctx.conn(), &wallet).await?;

        Self::append_event(
            &mut ctx,
            &wallet,
            WalletEventType::FundsWithdrawn,
            Some(amount),
            request_id,
        )
        .await?;

        let summary = BalanceSummary {
            wallet_id: wallet_id.clone(),
            balance: wallet.balance(),
        };
        Self::record_response(&mut ctx, request_id, &summary).await?;

        ctx.commit().await?;
        Ok(summary)
    }

    async fn transition(
        &self,
        wallet_id: &WalletId,
        action: AdminAction,
        request_id: Option<&str>,
    ) -> Result<StatusSummary, WalletError> {
        let mut ctx = self
            .coordinator
            .begin(TxOptions::with_request_id(request_id))
            .await?;

        let mut wallet = PostgresWalletRepository::find_for_update(ctx.conn(), wallet_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(wallet_id.clone()))?;

        let (changed, event_type) = match action {
            AdminAction::Freeze => (wallet.freeze()?, WalletEventType::WalletFrozen),
            AdminAction::Unfreeze => (wallet.unfreeze()?, WalletEventType::WalletUnfrozen),
            AdminAction::Close => (wallet.close()?, WalletEventType::WalletClosed),
        };

        // Los no-op responden igual pero no ensucian el journal.
        if changed {
            PostgresWalletRepository::update(ctx.conn(), &wallet).await?;
            Self::append_event(&mut ctx, &wallet, event_type, None, request_id).await?;
        }

        let summary = StatusSummary {
            wallet_id: wallet_id.clone(),
            status: wallet.status(),
        };
        Self::record_response(&mut ctx, request_id, &summary).await?;

        ctx.commit().await?;
        Ok(summary)
    }

    async fn set_daily_limit(
        &self,
        wallet_id: &WalletId,
        limit: Option<Decimal>,
        request_id: Option<&str>,
    ) -> Result<LimitSummary, WalletError> {
        let mut ctx = self
            .coordinator
            .begin(TxOptions::with_request_id(request_id))
            .await?;

        let mut wallet = PostgresWalletRepository::find_for_update(ctx.conn(), wallet_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(wallet_id.clone()))?;

        wallet.set_daily_limit(limit)?;
        PostgresWalletRepository::update(ctx.conn(), &wallet).await?;

        // Tipos de evento dedicados para el limite diario; no se reutilizan
        // los de freeze/unfreeze.
        let event_type = match limit {
            Some(_) => WalletEventType::DailyLimitSet,
            None => WalletEventType::DailyLimitRemoved,
        };
        Self::append_event(&mut ctx, &wallet, event_type, limit, request_id).await?;

        let summary = LimitSummary {
            wallet_id: wallet_id.clone(),
            daily_withdrawal_limit: wallet.daily_withdrawal_limit(),
        };
        Self::record_response(&mut ctx, request_id, &summary).await?;

        ctx.commit().await?;
        Ok(summary)
    }
}
