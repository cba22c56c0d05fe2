use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::domain::gateways::TransferLegs;
use crate::use_cases::recover_saga::RecoverSagaUseCase;

/// Job en segundo plano que avanza sagas varadas en DEBITED.
///
/// Esto puede ocurrir si el proceso murio entre el debito y el credito, o
/// si la compensacion misma fallo. Cada tick toma hasta `batch_size` sagas
/// cuyo `updated_at` supera el umbral y las re-dirige una por una; una saga
/// que falla no frena a las demas.
pub struct SagaRecoveryJob {
    legs: Arc<dyn TransferLegs>,
    recover: Arc<RecoverSagaUseCase>,
    stuck_threshold: Duration,
    batch_size: i64,
}

impl SagaRecoveryJob {
    pub fn new(
        legs: Arc<dyn TransferLegs>,
        recover: Arc<RecoverSagaUseCase>,
        stuck_threshold: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            legs,
            recover,
            stuck_threshold,
            batch_size,
        }
    }

    /// Un tick de recuperacion.
    pub async fn run(&self) {
        let stuck = match self
            .legs
            .find_stuck_sagas(self.stuck_threshold, self.batch_size)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "failed to scan for stuck sagas");
                return;
            }
        };

        if stuck.is_empty() {
            return;
        }

        info!(count = stuck.len(), "found stuck sagas, recovering");
        for saga_id in stuck {
            match self.recover.execute(saga_id).await {
                Ok(state) => {
                    info!(saga_id = %saga_id, state = state.as_str(), "saga recovery finished");
                }
                Err(e) => {
                    // Quedara para el proximo tick.
                    error!(saga_id = %saga_id, error = %e, "saga recovery failed");
                }
            }
        }
    }

    /// Loop de recuperacion, secuencial (a lo sumo un tick a la vez por
    /// proceso) y sensible a la señal de apagado.
    pub async fn run_loop(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(period_secs = period.as_secs(), "saga recovery started");
        loop {
            tokio::select! {
                _ = interval.tick() => self.run().await,
                _ = shutdown.changed() => {
                    info!("saga recovery stopping");
                    break;
                }
            }
        }
    }
}
