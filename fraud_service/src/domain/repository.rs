use async_trait::async_trait;
use std::time::Duration;

use crate::domain::entities::NewFraudAlert;
use crate::domain::error::FraudError;

// Port for fraud alert persistence (append-only)
#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn insert(&self, alert: NewFraudAlert) -> Result<(), FraudError>;
}

/// Puerto del cache del consumidor: deduplicacion de eventos y ventana
/// deslizante de retiros.
#[async_trait]
pub trait FraudCache: Send + Sync {
    /// Set-if-absent atomico sobre `processed_event:<key>`; `true` si la
    /// clave no existia (primer procesamiento).
    async fn mark_processed(&self, key: &str, ttl: Duration) -> Result<bool, FraudError>;

    /// Libera la marca cuando el procesamiento fallo, para que el redelivery
    /// no se confunda con un duplicado.
    async fn unmark_processed(&self, key: &str) -> Result<(), FraudError>;

    /// Registra un retiro en la ventana deslizante de la billetera y
    /// devuelve la cardinalidad vigente.
    async fn record_withdrawal(
        &self,
        wallet_id: &str,
        timestamp_ms: i64,
        window: Duration,
    ) -> Result<u64, FraudError>;
}
