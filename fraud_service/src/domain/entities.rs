use serde::{Deserialize, Serialize};

/// Reglas de fraude soportadas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    HighValueTransaction,
    RapidWithdrawals,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::HighValueTransaction => "HIGH_VALUE_TRANSACTION",
            AlertType::RapidWithdrawals => "RAPID_WITHDRAWALS",
        }
    }
}

/// Alerta de fraude nueva, lista para insertar (append-only).
#[derive(Debug, Clone)]
pub struct NewFraudAlert {
    pub wallet_id: String,
    pub alert_type: AlertType,
    pub details: serde_json::Value,
}

/// Decision del consumidor sobre un mensaje.
///
/// El loop de consumo la traduce al protocolo del broker: ack, nak con
/// delay (cola de espera) o publicacion en la dead-letter queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Procesado (o duplicado ya procesado): confirmar.
    Ack,
    /// Error transitorio: redelivery tras el delay indicado.
    Retry { delay: std::time::Duration },
    /// Irrecuperable o reintentos agotados: a la DLQ.
    DeadLetter { reason: String },
}
