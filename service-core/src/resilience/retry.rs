use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Failure classes that are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// Authentication rejected while the server is saturated.
    AuthUnderLoad,
    Unreachable,
    ConnectionTimeout,
    OperationTimeout,
    TlsFailure,
    /// The server dropped the connection mid-request.
    ConnectionClosed,
    /// Concurrent insert lost a unique-constraint race.
    UniqueConstraintRace,
}

impl TransientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransientKind::AuthUnderLoad => "auth_under_load",
            TransientKind::Unreachable => "unreachable",
            TransientKind::ConnectionTimeout => "connection_timeout",
            TransientKind::OperationTimeout => "operation_timeout",
            TransientKind::TlsFailure => "tls_failure",
            TransientKind::ConnectionClosed => "connection_closed",
            TransientKind::UniqueConstraintRace => "unique_constraint_race",
        }
    }
}

/// Errors that can tell whether retrying them makes sense.
pub trait Transient {
    fn transient_kind(&self) -> Option<TransientKind>;

    fn is_transient(&self) -> bool {
        self.transient_kind().is_some()
    }

    /// Whether this error, once retries are spent, says the backend is unhealthy.
    ///
    /// A lost unique-constraint race is a correct answer from a working
    /// database, so it never trips a breaker.
    fn counts_against_breaker(&self) -> bool {
        self.transient_kind() != Some(TransientKind::UniqueConstraintRace)
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `f`, retrying transient failures with exponential backoff.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    retry_with_backoff_notify(config, operation_name, f, |_, _| {}).await
}

/// Like [`retry_with_backoff`], calling `on_retry(attempt, &error)` before
/// each sleep. `attempt` is 1-based.
pub async fn retry_with_backoff_notify<T, E, F, Fut, N>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
    mut on_retry: N,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
    N: FnMut(u32, &E),
{
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                let Some(kind) = err.transient_kind() else {
                    return Err(err);
                };

                if attempt >= config.max_retries {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        kind = kind.as_str(),
                        error = %err,
                        "Retries exhausted"
                    );
                    return Err(err);
                }

                let delay = config.backoff_delay(attempt);
                attempt += 1;
                on_retry(attempt, &err);

                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_retries = config.max_retries,
                    kind = kind.as_str(),
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
