use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::domain::error::FraudError;
use crate::domain::repository::FraudCache;

fn window_key(wallet_id: &str) -> String {
    format!("withdrawals:{}", wallet_id)
}

/// Cache del consumidor sobre Redis: claves de deduplicacion y sorted sets
/// por billetera para la ventana deslizante de retiros.
pub struct RedisFraudCache {
    conn: ConnectionManager,
}

impl RedisFraudCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl FraudCache for RedisFraudCache {
    async fn mark_processed(&self, key: &str, ttl: Duration) -> Result<bool, FraudError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| FraudError::CacheError(e.to_string()))?;

        Ok(reply.is_some())
    }

    async fn unmark_processed(&self, key: &str) -> Result<(), FraudError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| FraudError::CacheError(e.to_string()))?;
        Ok(())
    }

    async fn record_withdrawal(
        &self,
        wallet_id: &str,
        timestamp_ms: i64,
        window: Duration,
    ) -> Result<u64, FraudError> {
        let key = window_key(wallet_id);
        let window_start = Utc::now().timestamp_millis() - window.as_millis() as i64;
        let mut conn = self.conn.clone();

        // ZADD + recorte de scores viejos + TTL + cardinalidad, en un solo
        // round-trip.
        let (_, _, _, count): (i64, i64, i64, u64) = redis::pipe()
            .cmd("ZADD")
            .arg(&key)
            .arg(timestamp_ms)
            .arg(timestamp_ms)
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(window_start)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(window.as_secs())
            .cmd("ZCARD")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| FraudError::CacheError(e.to_string()))?;

        Ok(count)
    }
}
