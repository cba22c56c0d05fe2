use std::env;
use std::time::Duration;

use crate::infrastructure::retry::RetryPolicy;

/// Configuracion del servicio, leida del entorno con defaults razonables.
///
/// Todo es sobreescribible por variable de entorno; solo DATABASE_URL es
/// obligatoria.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub nats_url: String,
    pub redis_url: String,
    pub host: String,
    pub port: String,
    pub events_stream: String,
    pub default_currency: String,
    pub db_max_connections: u32,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub saga_stuck_threshold: Duration,
    pub idempotency_ttl: Duration,
    pub balance_cache_ttl: Duration,
    pub request_lock_ttl: Duration,
    pub relay_period: Duration,
    pub recovery_period: Duration,
    pub relay_batch_size: i64,
    pub recovery_batch_size: i64,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            nats_url: var_or("NATS_URL", "nats://127.0.0.1:4222"),
            redis_url: var_or("REDIS_URL", "redis://127.0.0.1:6379"),
            host: var_or("HOST", "127.0.0.1"),
            port: var_or("PORT", "3000"),
            events_stream: var_or("EVENTS_STREAM", "wallet_events"),
            default_currency: var_or("DEFAULT_CURRENCY", "USD"),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 5),
            max_retries: parse_or("MAX_RETRIES", 10),
            initial_backoff: Duration::from_millis(parse_or("INITIAL_BACKOFF_MS", 50)),
            saga_stuck_threshold: Duration::from_millis(parse_or("SAGA_STUCK_THRESHOLD_MS", 60_000)),
            idempotency_ttl: Duration::from_secs(parse_or("IDEMPOTENCY_TTL_SECS", 86_400)),
            balance_cache_ttl: Duration::from_secs(parse_or("BALANCE_CACHE_TTL_SECS", 30)),
            request_lock_ttl: Duration::from_secs(parse_or("REQUEST_LOCK_TTL_SECS", 60)),
            relay_period: Duration::from_secs(parse_or("RELAY_PERIOD_SECS", 5)),
            recovery_period: Duration::from_secs(parse_or("RECOVERY_PERIOD_SECS", 10)),
            relay_batch_size: parse_or("RELAY_BATCH_SIZE", 100),
            recovery_batch_size: parse_or("RECOVERY_BATCH_SIZE", 10),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            initial_backoff: self.initial_backoff,
            ..RetryPolicy::default()
        }
    }
}
