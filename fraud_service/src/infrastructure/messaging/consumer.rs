use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, Consumer},
    stream, AckKind,
};
use common::events::{WalletEventType, SUBJECT_WILDCARD};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::domain::entities::Disposition;
use crate::use_cases::process_event::ProcessEventUseCase;

#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("Event bus connection error: {0}")]
    Connection(String),

    #[error("Event bus consume error: {0}")]
    Consume(String),
}

/// Consumidor at-least-once de eventos de billetera.
///
/// Topologia instalada al conectar: el stream durable `wallet_events`
/// (subjects `wallet.>`) y un consumidor pull durable filtrado a
/// `wallet.funds_withdrawn` y `wallet.transfer_completed`, con
/// `max_ack_pending = 1` (prefetch 1: reparto cooperativo entre workers).
///
/// Los reintinerarios de un mensaje fallido se implementan con NAK +
/// delay (la escalera de colas de espera) y la dead-letter queue es el
/// subject `wallet.dlq.<tipo>` del mismo stream.
pub struct FraudConsumer {
    jetstream: jetstream::Context,
    stream_name: String,
    consumer_name: String,
    process: Arc<ProcessEventUseCase>,
}

impl FraudConsumer {
    pub async fn connect(
        url: &str,
        stream_name: &str,
        consumer_name: &str,
        process: Arc<ProcessEventUseCase>,
    ) -> Result<Self, ConsumeError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| ConsumeError::Connection(e.to_string()))?;

        Ok(Self {
            jetstream: jetstream::new(client),
            stream_name: stream_name.to_string(),
            consumer_name: consumer_name.to_string(),
            process,
        })
    }

    async fn consumer(&self) -> Result<Consumer<pull::Config>, ConsumeError> {
        let stream = self
            .jetstream
            .get_or_create_stream(stream::Config {
                name: self.stream_name.clone(),
                subjects: vec![SUBJECT_WILDCARD.to_string()],
                retention: stream::RetentionPolicy::Limits,
                storage: stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| ConsumeError::Connection(e.to_string()))?;

        stream
            .get_or_create_consumer(
                &self.consumer_name,
                pull::Config {
                    durable_name: Some(self.consumer_name.clone()),
                    filter_subjects: vec![
                        WalletEventType::FundsWithdrawn.routing_key(),
                        WalletEventType::TransferCompleted.routing_key(),
                    ],
                    ack_policy: AckPolicy::Explicit,
                    max_ack_pending: 1,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ConsumeError::Connection(e.to_string()))
    }

    /// Loop principal: consume hasta la señal de apagado, reconectando el
    /// stream de mensajes ante errores del broker.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConsumeError> {
        info!(
            stream = %self.stream_name,
            consumer = %self.consumer_name,
            "fraud consumer started"
        );

        loop {
            let consumer = self.consumer().await?;
            let mut messages = consumer
                .messages()
                .await
                .map_err(|e| ConsumeError::Consume(e.to_string()))?;

            loop {
                tokio::select! {
                    maybe_message = messages.next() => {
                        match maybe_message {
                            Some(Ok(message)) => self.handle(message).await,
                            Some(Err(e)) => {
                                warn!(error = %e, "message stream error, re-subscribing");
                                break;
                            }
                            None => {
                                warn!("message stream ended, re-subscribing");
                                break;
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("fraud consumer stopping");
                        return Ok(());
                    }
                }
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn handle(&self, message: jetstream::Message) {
        // El numero de entrega del broker es el contador de reintentos.
        let delivery_attempt = message
            .info()
            .map(|info| info.delivered.max(1) as u64)
            .unwrap_or(1);

        let disposition = self.process.execute(&message.payload, delivery_attempt).await;

        match disposition {
            Disposition::Ack => {
                if let Err(e) = message.ack().await {
                    warn!(error = %e, "ack failed, broker will redeliver");
                }
            }
            Disposition::Retry { delay } => {
                if let Err(e) = message.ack_with(AckKind::Nak(Some(delay))).await {
                    warn!(error = %e, "nak failed, broker will redeliver");
                }
            }
            Disposition::DeadLetter { reason } => {
                let subject = message.subject.to_string();
                let dlq_subject = subject.replacen("wallet.", "wallet.dlq.", 1);
                warn!(subject, dlq_subject, reason, "dead-lettering message");

                match self
                    .jetstream
                    .publish(dlq_subject, message.payload.clone())
                    .await
                {
                    Ok(ack_future) => match ack_future.await {
                        Ok(_) => {
                            if let Err(e) = message.ack().await {
                                warn!(error = %e, "ack after dead-letter failed");
                            }
                        }
                        Err(e) => {
                            // Sin confirmacion del DLQ no se acka: el
                            // mensaje volvera y se reintentara el traslado.
                            error!(error = %e, "dead-letter publish unconfirmed, leaving message unacked");
                        }
                    },
                    Err(e) => {
                        error!(error = %e, "dead-letter publish failed, leaving message unacked");
                    }
                }
            }
        }
    }
}
