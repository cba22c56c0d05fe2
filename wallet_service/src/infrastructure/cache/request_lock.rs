use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::domain::error::WalletError;
use crate::domain::repository::RequestLock;

/// Lock distribuido de requests sobre Redis (SET NX EX).
///
/// El TTL es la red de seguridad: si el proceso muere con el lock tomado,
/// expira solo. El camino normal lo libera el coordinador al terminar la
/// transaccion.
pub struct RedisRequestLock {
    conn: ConnectionManager,
}

impl RedisRequestLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RequestLock for RedisRequestLock {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, WalletError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| WalletError::CacheError(e.to_string()))?;

        // SET ... NX responde OK si seteo, nil si la clave ya existia.
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str) -> Result<(), WalletError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| WalletError::CacheError(e.to_string()))?;
        Ok(())
    }
}

/// Clave del lock de request: `lock:req:<requestId>`.
pub fn request_lock_key(request_id: &str) -> String {
    format!("lock:req:{}", request_id)
}
