pub mod deposit;
pub mod execute_transfer;
pub mod get_balance;
pub mod get_history;
pub mod manage_wallet;
pub mod recover_saga;
pub mod withdraw;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use crate::domain::entities::{BalanceSummary, LimitSummary, StatusSummary};

use crate::domain::entities::TransferSagaState;
use crate::domain::types::{SagaId, WalletId};

/// Resultado de una transferencia.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    #[schema(value_type = String)]
    pub saga_id: SagaId,
    #[schema(value_type = String)]
    pub state: TransferSagaState,
    #[schema(value_type = String)]
    pub from_wallet_id: WalletId,
    #[schema(value_type = String)]
    pub to_wallet_id: WalletId,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}
