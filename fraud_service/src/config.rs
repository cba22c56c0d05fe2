use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::use_cases::process_event::FraudRules;

/// Configuracion del consumidor de fraude, leida del entorno.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub nats_url: String,
    pub redis_url: String,
    pub events_stream: String,
    pub consumer_name: String,
    pub fraud_threshold: Decimal,
    pub fraud_max_withdrawals: u64,
    pub fraud_window: Duration,
    pub processed_ttl: Duration,
    pub retry_delays: Vec<Duration>,
    pub db_max_connections: u32,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

/// Lista separada por comas, ej. `RETRY_DELAYS_MS=1000,2000,4000`.
fn delays_or(key: &str, default: &[u64]) -> Vec<Duration> {
    let parsed: Option<Vec<u64>> = env::var(key).ok().map(|raw| {
        raw.split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect()
    });

    parsed
        .filter(|delays: &Vec<u64>| !delays.is_empty())
        .unwrap_or_else(|| default.to_vec())
        .into_iter()
        .map(Duration::from_millis)
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            nats_url: var_or("NATS_URL", "nats://127.0.0.1:4222"),
            redis_url: var_or("REDIS_URL", "redis://127.0.0.1:6379"),
            events_stream: var_or("EVENTS_STREAM", "wallet_events"),
            consumer_name: var_or("FRAUD_CONSUMER", "fraud_detection"),
            fraud_threshold: parse_or("FRAUD_THRESHOLD", Decimal::from(10_000)),
            fraud_max_withdrawals: parse_or("FRAUD_MAX_WITHDRAWALS", 3),
            fraud_window: Duration::from_secs(parse_or("FRAUD_WINDOW_MINUTES", 5) * 60),
            processed_ttl: Duration::from_secs(parse_or("IDEMPOTENCY_TTL_SECS", 86_400)),
            retry_delays: delays_or("RETRY_DELAYS_MS", &[1000, 2000, 4000]),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 5),
        })
    }

    pub fn fraud_rules(&self) -> FraudRules {
        FraudRules {
            threshold: self.fraud_threshold,
            max_withdrawals: self.fraud_max_withdrawals,
            window: self.fraud_window,
            processed_ttl: self.processed_ttl,
            retry_delays: self.retry_delays.clone(),
        }
    }
}
