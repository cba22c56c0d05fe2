use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::infrastructure::messaging::publisher::EventPublisher;
use crate::infrastructure::persistence::idempotency_repository::PostgresIdempotencyRepository;
use crate::infrastructure::persistence::outbox_repository::PostgresOutboxRepository;

/// Job en segundo plano que drena el outbox hacia el bus de eventos.
///
/// Cada tick toma hasta `batch_size` filas sin publicar (de la mas vieja a
/// la mas nueva), publica una por una y marca las exitosas en un solo
/// UPDATE. Una fila que falla no bloquea a las siguientes: queda para el
/// proximo tick. La garantia resultante es at-least-once; los consumidores
/// deduplican.
///
/// El mismo tick aprovecha para recolectar registros de idempotencia
/// vencidos.
pub struct OutboxRelayJob {
    outbox: Arc<PostgresOutboxRepository>,
    idempotency: Arc<PostgresIdempotencyRepository>,
    publisher: Arc<EventPublisher>,
    batch_size: i64,
    idempotency_ttl: Duration,
}

impl OutboxRelayJob {
    pub fn new(
        outbox: Arc<PostgresOutboxRepository>,
        idempotency: Arc<PostgresIdempotencyRepository>,
        publisher: Arc<EventPublisher>,
        batch_size: i64,
        idempotency_ttl: Duration,
    ) -> Self {
        Self {
            outbox,
            idempotency,
            publisher,
            batch_size,
            idempotency_ttl,
        }
    }

    /// Un tick del relay.
    pub async fn run(&self) {
        let rows = match self.outbox.fetch_unpublished(self.batch_size).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "failed to fetch unpublished outbox rows");
                return;
            }
        };

        if !rows.is_empty() {
            let mut published = Vec::with_capacity(rows.len());
            for row in &rows {
                let payload = match serde_json::to_vec(&row.payload) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!(outbox_id = %row.id, error = %e, "unserializable outbox payload, skipping");
                        continue;
                    }
                };

                match self
                    .publisher
                    .publish_raw(row.routing_key(), payload)
                    .await
                {
                    Ok(()) => published.push(row.id),
                    Err(e) => {
                        warn!(outbox_id = %row.id, error = %e, "publish failed, will retry next tick");
                    }
                }
            }

            match self.outbox.mark_published(&published).await {
                Ok(count) if count > 0 => {
                    info!(published = count, fetched = rows.len(), "outbox batch relayed");
                }
                Ok(_) => {}
                Err(e) => {
                    // Las filas se republicaran; los consumidores deduplican.
                    error!(error = %e, "failed to mark outbox rows as published");
                }
            }
        }

        match self.idempotency.purge_older_than(self.idempotency_ttl).await {
            Ok(purged) if purged > 0 => {
                debug!(purged, "expired idempotency records purged");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "idempotency purge failed"),
        }
    }

    /// Loop del relay: un tick por periodo hasta la señal de apagado.
    ///
    /// El loop es secuencial, asi que nunca hay dos ticks solapados en el
    /// mismo proceso; entre replicas el solapamiento es benigno porque el
    /// marcado de filas es idempotente.
    pub async fn run_loop(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(period_secs = period.as_secs(), "outbox relay started");
        loop {
            tokio::select! {
                _ = interval.tick() => self.run().await,
                _ = shutdown.changed() => {
                    info!("outbox relay stopping");
                    break;
                }
            }
        }
    }
}
