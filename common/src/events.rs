use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Tipos de evento del journal de billeteras.
///
/// Cada cambio de estado persistido en `wallet_events` y publicado al bus
/// lleva exactamente uno de estos tipos. El nombre serializado (SCREAMING_SNAKE_CASE)
/// es el mismo que viaja en el payload y el que se guarda en la base de datos.
///
/// # Examples
/// ```
/// use common::events::WalletEventType;
///
/// assert_eq!(WalletEventType::FundsDeposited.as_str(), "FUNDS_DEPOSITED");
/// assert_eq!(WalletEventType::FundsDeposited.routing_key(), "wallet.funds_deposited");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletEventType {
    WalletCreated,
    FundsDeposited,
    FundsWithdrawn,
    TransferInitiated,
    TransferCompleted,
    TransferFailed,
    TransferCompensated,
    WalletFrozen,
    WalletUnfrozen,
    WalletClosed,
    DailyLimitSet,
    DailyLimitRemoved,
}

impl WalletEventType {
    pub const ALL: [WalletEventType; 12] = [
        WalletEventType::WalletCreated,
        WalletEventType::FundsDeposited,
        WalletEventType::FundsWithdrawn,
        WalletEventType::TransferInitiated,
        WalletEventType::TransferCompleted,
        WalletEventType::TransferFailed,
        WalletEventType::TransferCompensated,
        WalletEventType::WalletFrozen,
        WalletEventType::WalletUnfrozen,
        WalletEventType::WalletClosed,
        WalletEventType::DailyLimitSet,
        WalletEventType::DailyLimitRemoved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletEventType::WalletCreated => "WALLET_CREATED",
            WalletEventType::FundsDeposited => "FUNDS_DEPOSITED",
            WalletEventType::FundsWithdrawn => "FUNDS_WITHDRAWN",
            WalletEventType::TransferInitiated => "TRANSFER_INITIATED",
            WalletEventType::TransferCompleted => "TRANSFER_COMPLETED",
            WalletEventType::TransferFailed => "TRANSFER_FAILED",
            WalletEventType::TransferCompensated => "TRANSFER_COMPENSATED",
            WalletEventType::WalletFrozen => "WALLET_FROZEN",
            WalletEventType::WalletUnfrozen => "WALLET_UNFROZEN",
            WalletEventType::WalletClosed => "WALLET_CLOSED",
            WalletEventType::DailyLimitSet => "DAILY_LIMIT_SET",
            WalletEventType::DailyLimitRemoved => "DAILY_LIMIT_REMOVED",
        }
    }

    /// Subject (routing key) al que se publica este tipo de evento.
    ///
    /// Convención: `wallet.<tipo_en_minúsculas>`, por ejemplo
    /// `wallet.funds_withdrawn`.
    pub fn routing_key(&self) -> String {
        format!("{}.{}", SUBJECT_PREFIX, self.as_str().to_lowercase())
    }

    /// Subject terminal (dead-letter) para este tipo de evento.
    pub fn dead_letter_key(&self) -> String {
        format!("{}.dlq.{}", SUBJECT_PREFIX, self.as_str().to_lowercase())
    }
}

impl fmt::Display for WalletEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("Unknown wallet event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for WalletEventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WalletEventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// Prefijo de subjects del bus de eventos. El stream durable captura `wallet.>`.
pub const SUBJECT_PREFIX: &str = "wallet";

/// Patrón de subjects que captura el stream de eventos (incluye los DLQ).
pub const SUBJECT_WILDCARD: &str = "wallet.>";

/// Payload que viaja por el bus de eventos.
///
/// Es un contrato estable entre `wallet_service` (productor, vía outbox) y
/// los consumidores (`fraud_service`). Los consumidores deben tolerar
/// entregas duplicadas y fuera de orden.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub event_type: WalletEventType,
    pub wallet_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl EventMessage {
    pub fn routing_key(&self) -> String {
        self.event_type.routing_key()
    }

    pub fn dead_letter_key(&self) -> String {
        self.event_type.dead_letter_key()
    }
}
