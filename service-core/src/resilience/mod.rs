pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use retry::{
    RetryConfig, Transient, TransientKind, retry_with_backoff, retry_with_backoff_notify,
};

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// Retry-with-backoff wrapped in a circuit breaker.
///
/// One `run` counts once against the breaker no matter how many attempts the
/// retry loop made, and an open circuit skips the retry loop entirely.
#[derive(Clone)]
pub struct DbGuard {
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
}

impl DbGuard {
    pub fn new(breaker: Arc<CircuitBreaker>, retry: RetryConfig) -> Self {
        Self { breaker, retry }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub async fn run<T, E, F, Fut>(
        &self,
        operation_name: &str,
        f: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + Display,
    {
        self.breaker
            .call_counting(
                || retry_with_backoff(&self.retry, operation_name, f),
                E::counts_against_breaker,
            )
            .await
    }
}
