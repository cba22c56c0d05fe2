use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::domain::error::Retryable;

/// Politica compartida de reintentos para errores transitorios del store.
///
/// Backoff exponencial: base 50ms, factor 2, tope 5s, mas 0-100ms de
/// jitter, hasta 10 intentos.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_factor: u32,
    pub max_backoff: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(50),
            backoff_factor: 2,
            max_backoff: Duration::from_secs(5),
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Delay previo al intento `attempt` (1-indexed; el primer reintento es
    /// el intento 2).
    fn delay_before(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(2);
        let backoff = self
            .initial_backoff
            .saturating_mul(self.backoff_factor.saturating_pow(exp))
            .min(self.max_backoff);
        let jitter_ms = rand::thread_rng().gen_range(0..=self.max_jitter.as_millis() as u64);
        backoff + Duration::from_millis(jitter_ms)
    }
}

/// Ejecuta `operation` reintentando los errores clasificados como
/// recuperables. Los errores de regla de negocio cortan al primer intento.
pub async fn with_retries<T, E, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_before(attempt + 1);
                tracing::warn!(
                    operation = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retryable error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
