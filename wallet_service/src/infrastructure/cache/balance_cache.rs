use async_trait::async_trait;
use redis::aio::ConnectionManager;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::error::WalletError;
use crate::domain::repository::BalanceCache;
use crate::domain::types::WalletId;

fn balance_key(id: &WalletId) -> String {
    format!("wallet:balance:{}", id)
}

/// Cache read-through de balances sobre Redis.
///
/// El valor se escribe tras cada operacion exitosa y expira a los 30s
/// (configurable); la base de datos es siempre la fuente de verdad, de modo
/// que cualquier falla aqui se degrada a un miss.
pub struct RedisBalanceCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisBalanceCache {
    pub fn new(conn: ConnectionManager, ttl: Duration) -> Self {
        Self { conn, ttl }
    }
}

#[async_trait]
impl BalanceCache for RedisBalanceCache {
    async fn get(&self, id: &WalletId) -> Result<Option<Decimal>, WalletError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(balance_key(id))
            .query_async(&mut conn)
            .await
            .map_err(|e| WalletError::CacheError(e.to_string()))?;

        match value {
            None => Ok(None),
            Some(raw) => Decimal::from_str(&raw)
                .map(Some)
                .map_err(|e| WalletError::CacheError(format!("corrupt cached balance: {}", e))),
        }
    }

    async fn set(&self, id: &WalletId, balance: Decimal) -> Result<(), WalletError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(balance_key(id))
            .arg(balance.to_string())
            .arg("EX")
            .arg(self.ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| WalletError::CacheError(e.to_string()))?;
        Ok(())
    }

    async fn invalidate(&self, id: &WalletId) -> Result<(), WalletError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(balance_key(id))
            .query_async(&mut conn)
            .await
            .map_err(|e| WalletError::CacheError(e.to_string()))?;
        Ok(())
    }
}
