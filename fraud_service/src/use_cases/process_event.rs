use common::events::{EventMessage, WalletEventType};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::entities::{AlertType, Disposition, NewFraudAlert};
use crate::domain::error::FraudError;
use crate::domain::repository::{AlertRepository, FraudCache};

/// Parametros de las reglas de fraude.
#[derive(Debug, Clone)]
pub struct FraudRules {
    /// Umbral de la regla high-value (estrictamente mayor dispara).
    pub threshold: Decimal,
    /// Cardinalidad maxima de la ventana antes de alertar.
    pub max_withdrawals: u64,
    /// Ventana deslizante de retiros.
    pub window: Duration,
    /// TTL de las claves de deduplicacion.
    pub processed_ttl: Duration,
    /// Escalera de delays de reintento (colas de espera).
    pub retry_delays: Vec<Duration>,
}

impl Default for FraudRules {
    fn default() -> Self {
        Self {
            threshold: Decimal::from(10_000),
            max_withdrawals: 3,
            window: Duration::from_secs(5 * 60),
            processed_ttl: Duration::from_secs(86_400),
            retry_delays: vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ],
        }
    }
}

/// Clave de idempotencia del evento: SHA-256 de
/// `walletId|eventType|timestamp|amount?`, en hexadecimal.
pub fn event_idempotency_key(message: &EventMessage) -> String {
    let mut raw = format!(
        "{}|{}|{}",
        message.wallet_id,
        message.event_type.as_str(),
        message.timestamp.to_rfc3339(),
    );
    if let Some(amount) = message.amount {
        raw.push('|');
        raw.push_str(&amount.to_string());
    }

    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)
}

/// Caso de uso: procesar un evento del bus y aplicar las reglas de fraude.
///
/// El consumidor es at-least-once: todo el flujo es idempotente via la
/// clave `processed_event:<hash>`. La decision devuelta (ack / retry con
/// delay / dead-letter) la ejecuta el loop de consumo.
pub struct ProcessEventUseCase {
    alerts: Arc<dyn AlertRepository>,
    cache: Arc<dyn FraudCache>,
    rules: FraudRules,
}

impl ProcessEventUseCase {
    pub fn new(alerts: Arc<dyn AlertRepository>, cache: Arc<dyn FraudCache>, rules: FraudRules) -> Self {
        Self {
            alerts,
            cache,
            rules,
        }
    }

    /// Procesa un payload crudo. `delivery_attempt` arranca en 1 para la
    /// primera entrega.
    pub async fn execute(&self, payload: &[u8], delivery_attempt: u64) -> Disposition {
        // 1. Parseo: un mensaje ilegible jamas va a mejorar con reintentos.
        let message: EventMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "unparseable event payload, dead-lettering");
                return Disposition::DeadLetter {
                    reason: format!("unparseable payload: {}", e),
                };
            }
        };

        // 2-3. Deduplicacion at-least-once.
        let key = format!("processed_event:{}", event_idempotency_key(&message));
        match self.cache.mark_processed(&key, self.rules.processed_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                info!(wallet_id = %message.wallet_id, "duplicate event, acking");
                return Disposition::Ack;
            }
            Err(e) => {
                // Perdida de idempotencia tolerable: las reglas siguen
                // siendo deterministas y el journal de alertas es auditable.
                warn!(error = %e, "dedupe cache unavailable, processing anyway");
            }
        }

        // 4. Reglas (solo los retiros disparan analisis).
        if message.event_type == WalletEventType::FundsWithdrawn {
            if let Err(e) = self.apply_rules(&message).await {
                // Se libera la marca de dedupe: el redelivery debe poder
                // re-aplicar las reglas en vez de caer como duplicado.
                if let Err(unmark_err) = self.cache.unmark_processed(&key).await {
                    warn!(error = %unmark_err, "failed to release dedupe key before retry");
                }
                return self.retry_or_dead_letter(delivery_attempt, &e);
            }
        }

        Disposition::Ack
    }

    async fn apply_rules(&self, message: &EventMessage) -> Result<(), FraudError> {
        let Some(amount) = message.amount else {
            warn!(wallet_id = %message.wallet_id, "withdrawal event without amount, skipping rules");
            return Ok(());
        };

        // Regla high-value: estrictamente mayor al umbral.
        if amount > self.rules.threshold {
            info!(wallet_id = %message.wallet_id, %amount, "high value transaction detected");
            self.alerts
                .insert(NewFraudAlert {
                    wallet_id: message.wallet_id.clone(),
                    alert_type: AlertType::HighValueTransaction,
                    details: serde_json::json!({
                        "amount": amount,
                        "threshold": self.rules.threshold,
                    }),
                })
                .await?;
        }

        // Regla rapid-withdrawals: cardinalidad de la ventana deslizante.
        let count = self
            .cache
            .record_withdrawal(
                &message.wallet_id,
                message.timestamp.timestamp_millis(),
                self.rules.window,
            )
            .await?;

        if count > self.rules.max_withdrawals {
            info!(wallet_id = %message.wallet_id, count, "rapid withdrawals detected");
            self.alerts
                .insert(NewFraudAlert {
                    wallet_id: message.wallet_id.clone(),
                    alert_type: AlertType::RapidWithdrawals,
                    details: serde_json::json!({
                        "withdrawalCount": count,
                        "timeWindow": self.rules.window.as_secs(),
                    }),
                })
                .await?;
        }

        Ok(())
    }

    fn retry_or_dead_letter(&self, delivery_attempt: u64, error: &FraudError) -> Disposition {
        let retries_used = delivery_attempt.saturating_sub(1) as usize;
        match self.rules.retry_delays.get(retries_used) {
            Some(delay) => {
                warn!(error = %error, attempt = delivery_attempt, delay_ms = delay.as_millis() as u64, "rule application failed, scheduling retry");
                Disposition::Retry { delay: *delay }
            }
            None => {
                warn!(error = %error, attempt = delivery_attempt, "retries exhausted, dead-lettering");
                Disposition::DeadLetter {
                    reason: format!("retries exhausted: {}", error),
                }
            }
        }
    }
}
