use async_nats::jetstream::{self, stream};
use common::events::{EventMessage, SUBJECT_WILDCARD};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Event bus connection error: {0}")]
    Connection(String),

    #[error("Event bus publish error: {0}")]
    Publish(String),

    #[error("Event serialization error: {0}")]
    Serialization(String),
}

/// Publicador de eventos sobre NATS JetStream.
///
/// El stream durable captura todos los subjects `wallet.>` (incluidos los
/// dead-letter `wallet.dlq.*`). Cada publish espera el ack de JetStream
/// (publisher confirms): si el ack no llega, la fila queda en el outbox y
/// el relay la reintenta.
pub struct EventPublisher {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    stream_name: String,
}

impl EventPublisher {
    pub async fn connect(url: &str, stream_name: &str) -> Result<Self, PublishError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| PublishError::Connection(e.to_string()))?;

        let publisher = Self {
            jetstream: jetstream::new(client.clone()),
            client,
            stream_name: stream_name.to_string(),
        };
        publisher.install_topology().await?;

        Ok(publisher)
    }

    /// Estado de la conexion subyacente (para los health checks).
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    /// Crea (o reutiliza) el stream durable del bus.
    async fn install_topology(&self) -> Result<(), PublishError> {
        self.jetstream
            .get_or_create_stream(stream::Config {
                name: self.stream_name.clone(),
                subjects: vec![SUBJECT_WILDCARD.to_string()],
                retention: stream::RetentionPolicy::Limits,
                storage: stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| PublishError::Connection(e.to_string()))?;

        Ok(())
    }

    /// Publica un payload en su routing key y espera el ack del broker.
    pub async fn publish(&self, message: &EventMessage) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| PublishError::Serialization(e.to_string()))?;
        self.publish_raw(message.routing_key(), payload).await
    }

    pub async fn publish_raw(
        &self,
        subject: String,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        self.jetstream
            .publish(subject, payload.into())
            .await
            .map_err(|e| PublishError::Publish(e.to_string()))?
            .await
            .map_err(|e| PublishError::Publish(e.to_string()))?;

        Ok(())
    }
}
