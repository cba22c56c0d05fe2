use async_trait::async_trait;
use chrono::Utc;
use common::events::{EventMessage, WalletEventType};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fraud_service::domain::entities::{AlertType, Disposition, NewFraudAlert};
use fraud_service::domain::error::FraudError;
use fraud_service::domain::repository::{AlertRepository, FraudCache};
use fraud_service::use_cases::process_event::{FraudRules, ProcessEventUseCase};

/// Repositorio de alertas en memoria.
#[derive(Default)]
struct InMemoryAlerts {
    alerts: Mutex<Vec<NewFraudAlert>>,
    fail_next: Mutex<bool>,
}

impl InMemoryAlerts {
    fn count(&self, alert_type: AlertType) -> usize {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|alert| alert.alert_type == alert_type)
            .count()
    }
}

#[async_trait]
impl AlertRepository for InMemoryAlerts {
    async fn insert(&self, alert: NewFraudAlert) -> Result<(), FraudError> {
        if *self.fail_next.lock().unwrap() {
            return Err(FraudError::RepositoryError("injected failure".into()));
        }
        self.alerts.lock().unwrap().push(alert);
        Ok(())
    }
}

/// Cache en memoria: claves de dedupe + ventana por billetera.
#[derive(Default)]
struct InMemoryFraudCache {
    processed: Mutex<HashSet<String>>,
    windows: Mutex<HashMap<String, Vec<i64>>>,
}

#[async_trait]
impl FraudCache for InMemoryFraudCache {
    async fn mark_processed(&self, key: &str, _ttl: Duration) -> Result<bool, FraudError> {
        Ok(self.processed.lock().unwrap().insert(key.to_string()))
    }

    async fn unmark_processed(&self, key: &str) -> Result<(), FraudError> {
        self.processed.lock().unwrap().remove(key);
        Ok(())
    }

    async fn record_withdrawal(
        &self,
        wallet_id: &str,
        timestamp_ms: i64,
        window: Duration,
    ) -> Result<u64, FraudError> {
        let mut windows = self.windows.lock().unwrap();
        let entries = windows.entry(wallet_id.to_string()).or_default();
        entries.push(timestamp_ms);
        let cutoff = Utc::now().timestamp_millis() - window.as_millis() as i64;
        entries.retain(|ts| *ts >= cutoff);
        Ok(entries.len() as u64)
    }
}

fn withdrawal(wallet_id: &str, amount: i64) -> Vec<u8> {
    let message = EventMessage {
        event_type: WalletEventType::FundsWithdrawn,
        wallet_id: wallet_id.to_string(),
        amount: Some(Decimal::from(amount)),
        metadata: serde_json::json!({}),
        timestamp: Utc::now(),
    };
    serde_json::to_vec(&message).unwrap()
}

#[tokio::test]
async fn test_high_value_alert_written_once_across_redeliveries() {
    let alerts = Arc::new(InMemoryAlerts::default());
    let cache = Arc::new(InMemoryFraudCache::default());
    let use_case = ProcessEventUseCase::new(alerts.clone(), cache, FraudRules::default());

    // Retiro de 20000 sobre un umbral de 10000 (escenario end-to-end 6).
    let payload = withdrawal("wallet-50k", 20_000);

    assert_eq!(use_case.execute(&payload, 1).await, Disposition::Ack);
    assert_eq!(alerts.count(AlertType::HighValueTransaction), 1);

    // Redelivery del mismo payload: deduplicado, sin alerta adicional.
    assert_eq!(use_case.execute(&payload, 2).await, Disposition::Ack);
    assert_eq!(alerts.count(AlertType::HighValueTransaction), 1);
}

#[tokio::test]
async fn test_rapid_withdrawals_fire_after_window_fills() {
    let alerts = Arc::new(InMemoryAlerts::default());
    let cache = Arc::new(InMemoryFraudCache::default());
    let use_case = ProcessEventUseCase::new(alerts.clone(), cache, FraudRules::default());

    // Cuatro retiros chicos distintos dentro de la ventana: el cuarto
    // supera max_withdrawals = 3.
    for amount in [10, 11, 12, 13] {
        let disposition = use_case.execute(&withdrawal("burst", amount), 1).await;
        assert_eq!(disposition, Disposition::Ack);
    }

    assert_eq!(alerts.count(AlertType::RapidWithdrawals), 1);
    assert_eq!(alerts.count(AlertType::HighValueTransaction), 0);
}

#[tokio::test]
async fn test_transient_failure_retries_then_succeeds() {
    let alerts = Arc::new(InMemoryAlerts::default());
    let cache = Arc::new(InMemoryFraudCache::default());
    let use_case = ProcessEventUseCase::new(alerts.clone(), cache, FraudRules::default());

    let payload = withdrawal("flaky", 50_000);

    // Primera entrega: el insert falla y el mensaje va a la cola de espera
    // de 1000ms.
    *alerts.fail_next.lock().unwrap() = true;
    let disposition = use_case.execute(&payload, 1).await;
    assert_eq!(
        disposition,
        Disposition::Retry {
            delay: Duration::from_millis(1000)
        }
    );
    assert_eq!(alerts.count(AlertType::HighValueTransaction), 0);

    // Redelivery: la marca de dedupe fue liberada, la regla corre de nuevo.
    *alerts.fail_next.lock().unwrap() = false;
    let disposition = use_case.execute(&payload, 2).await;
    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(alerts.count(AlertType::HighValueTransaction), 1);
}

#[tokio::test]
async fn test_exhausted_retries_go_to_dead_letter() {
    let alerts = Arc::new(InMemoryAlerts::default());
    *alerts.fail_next.lock().unwrap() = true;
    let cache = Arc::new(InMemoryFraudCache::default());
    let use_case = ProcessEventUseCase::new(alerts.clone(), cache, FraudRules::default());

    let payload = withdrawal("doomed", 50_000);

    // Entregas 1-3 agotan la escalera [1000, 2000, 4000]; la cuarta va a la
    // DLQ.
    for (attempt, expected_ms) in [(1, 1000), (2, 2000), (3, 4000)] {
        let disposition = use_case.execute(&payload, attempt).await;
        assert_eq!(
            disposition,
            Disposition::Retry {
                delay: Duration::from_millis(expected_ms)
            }
        );
    }

    let disposition = use_case.execute(&payload, 4).await;
    assert!(matches!(disposition, Disposition::DeadLetter { .. }));
    assert_eq!(alerts.count(AlertType::HighValueTransaction), 0);
}
