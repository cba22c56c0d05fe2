use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::entities::NewOutboxEvent;
use crate::domain::error::WalletError;
use crate::domain::repository::RequestLock;
use crate::infrastructure::cache::request_lock::request_lock_key;
use crate::infrastructure::messaging::publisher::EventPublisher;
use crate::infrastructure::persistence::map_sqlx_err;
use crate::infrastructure::persistence::outbox_repository::PostgresOutboxRepository;

/// Opciones de apertura de una transaccion coordinada.
#[derive(Debug, Default, Clone)]
pub struct TxOptions {
    /// Request id del cliente; si esta presente se toma el lock distribuido
    /// `lock:req:<requestId>` por la vida de la transaccion.
    pub request_id: Option<String>,
    /// Sube el aislamiento de READ COMMITTED (default) a SERIALIZABLE.
    pub serializable: bool,
}

impl TxOptions {
    pub fn with_request_id(request_id: Option<&str>) -> Self {
        Self {
            request_id: request_id.map(|s| s.to_string()),
            serializable: false,
        }
    }
}

/// Coordinador de transacciones.
///
/// Corre la logica de negocio dentro de una transaccion del store mientras
/// acumula eventos en un buffer en memoria; el commit persiste las filas de
/// outbox junto con las mutaciones (todo o nada) y despues intenta, best
/// effort, publicarlas al bus. Si esa publicacion no ocurre, el relay las
/// entrega igual.
pub struct TransactionCoordinator {
    pool: PgPool,
    lock: Arc<dyn RequestLock>,
    publisher: Arc<EventPublisher>,
    lock_ttl: Duration,
}

impl TransactionCoordinator {
    pub fn new(
        pool: PgPool,
        lock: Arc<dyn RequestLock>,
        publisher: Arc<EventPublisher>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            lock,
            publisher,
            lock_ttl,
        }
    }

    /// Abre una transaccion coordinada.
    ///
    /// Si el lock distribuido esta ocupado, falla con `ConcurrentRequest`.
    /// Si el servicio de locks no responde, se sigue sin lock: el insert de
    /// idempotencia en el store deduplica de todos modos.
    pub async fn begin(&self, opts: TxOptions) -> Result<TxContext, WalletError> {
        let held_lock = match &opts.request_id {
            Some(request_id) => {
                let key = request_lock_key(request_id);
                match self.lock.acquire(&key, self.lock_ttl).await {
                    Ok(true) => Some(key),
                    Ok(false) => {
                        return Err(WalletError::ConcurrentRequest(request_id.clone()));
                    }
                    Err(e) => {
                        warn!(request_id, error = %e, "request lock unavailable, proceeding without it");
                        None
                    }
                }
            }
            None => None,
        };

        let mut tx = match self.pool.begin().await.map_err(map_sqlx_err) {
            Ok(tx) => tx,
            Err(e) => {
                if let Some(key) = &held_lock {
                    let _ = self.lock.release(key).await;
                }
                return Err(e);
            }
        };

        if opts.serializable {
            if let Err(e) = sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)
            {
                if let Some(key) = &held_lock {
                    let _ = self.lock.release(key).await;
                }
                return Err(e);
            }
        }

        Ok(TxContext {
            tx: Some(tx),
            pending: Vec::new(),
            held_lock,
            lock: self.lock.clone(),
            publisher: self.publisher.clone(),
            pool: self.pool.clone(),
        })
    }
}

/// Contexto de una transaccion coordinada en curso.
///
/// Si se descarta sin `commit()`, la transaccion hace rollback y el lock se
/// libera; nada de lo acumulado llega al store ni al bus.
pub struct TxContext {
    tx: Option<Transaction<'static, Postgres>>,
    pending: Vec<NewOutboxEvent>,
    held_lock: Option<String>,
    lock: Arc<dyn RequestLock>,
    publisher: Arc<EventPublisher>,
    pool: PgPool,
}

impl TxContext {
    /// Handle transaccional para los repositorios.
    ///
    /// Panic si se usa despues del commit: eso es un error de programacion.
    pub fn conn(&mut self) -> &mut PgConnection {
        let tx = self.tx.as_mut().expect("transaction already committed");
        &mut **tx
    }

    /// Encola un evento para publicar; se persiste como fila de outbox en el
    /// commit, atomicamente con las mutaciones de negocio.
    pub fn publish_event(&mut self, event: NewOutboxEvent) {
        self.pending.push(event);
    }

    /// Persiste el buffer de outbox, commitea y libera el lock. Despues del
    /// commit dispara la publicacion best-effort de los payloads.
    pub async fn commit(mut self) -> Result<(), WalletError> {
        for event in &self.pending {
            let tx = self.tx.as_mut().expect("transaction already committed");
            PostgresOutboxRepository::insert(&mut **tx, event).await?;
        }

        let tx = self.tx.take().expect("transaction already committed");
        tx.commit().await.map_err(map_sqlx_err)?;

        self.release_lock().await;

        // Fire-and-forget: si algo falla aca, el relay entrega igual.
        let events = std::mem::take(&mut self.pending);
        if !events.is_empty() {
            let publisher = self.publisher.clone();
            let pool = self.pool.clone();
            tokio::spawn(async move {
                for event in events {
                    match publisher.publish(&event.payload).await {
                        Ok(()) => {
                            let marked = sqlx::query(
                                "UPDATE outbox_events SET published = TRUE WHERE id = $1",
                            )
                            .bind(event.id)
                            .execute(&pool)
                            .await;
                            if let Err(e) = marked {
                                debug!(outbox_id = %event.id, error = %e, "publish succeeded but row not marked; relay may redeliver");
                            }
                        }
                        Err(e) => {
                            debug!(outbox_id = %event.id, error = %e, "post-commit publish failed; relay will deliver");
                        }
                    }
                }
            });
        }

        Ok(())
    }

    async fn release_lock(&mut self) {
        if let Some(key) = self.held_lock.take() {
            if let Err(e) = self.lock.release(&key).await {
                warn!(key, error = %e, "failed to release request lock (TTL will expire it)");
            }
        }
    }
}

impl Drop for TxContext {
    fn drop(&mut self) {
        // Camino de error: la transaccion (si sigue viva) hace rollback al
        // soltarse; el lock se libera en una tarea aparte porque Drop no
        // puede esperar.
        if let Some(key) = self.held_lock.take() {
            let lock = self.lock.clone();
            tokio::spawn(async move {
                let _ = lock.release(&key).await;
            });
        }
    }
}
