//! Circuit breaker guarding a single downstream dependency.
//!
//! Three states:
//! - Closed: calls pass through; consecutive failures are counted.
//! - Open: calls are rejected without running until the reset timeout has
//!   elapsed since the last failure.
//! - Half-Open: exactly one trial call is admitted; its outcome closes or
//!   re-opens the circuit.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time after the last failure before a trial call is admitted
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error("{0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open)
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

/// Admission ticket for one call. Dropping an unsettled trial ticket frees the
/// half-open slot so a cancelled caller cannot wedge the breaker.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` through the breaker. The lock is never held while `f` runs.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_counting(f, |_| true).await
    }

    /// Like [`call`](Self::call), but only errors for which `is_failure`
    /// returns true count against the breaker. Any other error is passed
    /// through and settles the call as healthy.
    pub async fn call_counting<T, E, F, Fut, P>(
        &self,
        f: F,
        is_failure: P,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        let permit = self.acquire().ok_or(CircuitBreakerError::Open)?;

        match f().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(err) => {
                if is_failure(&err) {
                    permit.fail();
                } else {
                    permit.succeed();
                }
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    fn acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.lock();
        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.config.reset_timeout);
                if !cooled_down {
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                info!(breaker = %self.name, "Circuit breaker half-open, admitting trial call");
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return None;
                }
                true
            }
        };

        if trial {
            inner.trial_in_flight = true;
        }

        Some(Permit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        inner.failures = 0;
        if trial {
            inner.trial_in_flight = false;
            inner.state = CircuitState::Closed;
            info!(breaker = %self.name, "Circuit breaker closed after successful trial");
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        if trial {
            inner.trial_in_flight = false;
            inner.state = CircuitState::Open;
            error!(breaker = %self.name, "Trial call failed, circuit breaker re-opened");
        } else if inner.state == CircuitState::Closed
            && inner.failures >= self.config.failure_threshold
        {
            inner.state = CircuitState::Open;
            error!(
                breaker = %self.name,
                failures = inner.failures,
                reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                "Circuit breaker opened"
            );
        } else {
            warn!(
                breaker = %self.name,
                failures = inner.failures,
                state = inner.state.as_str(),
                "Guarded call failed"
            );
        }
    }

    /// Current state, without triggering the open to half-open transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    /// Force the breaker back to closed.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.last_failure = None;
        inner.trial_in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::default()
                .with_failure_threshold(threshold)
                .with_reset_timeout(Duration::from_secs(60)),
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CircuitBreakerError<&'static str>> {
        cb.call(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), CircuitBreakerError<&'static str>> {
        cb.call(|| async { Ok::<_, &'static str>(()) }).await
    }

    #[tokio::test]
    async fn test_starts_closed() {
        let cb = breaker(3);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert!(succeed(&cb).await.is_ok());
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.failure_count(), 2);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold_and_skips_operation() {
        let cb = breaker(3);
        for _ in 0..3 {
            assert!(matches!(fail(&cb).await, Err(CircuitBreakerError::Inner("boom"))));
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        let result = cb
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(())
            })
            .await;

        assert!(result.unwrap_err().is_open());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_success_closes_circuit() {
        let cb = breaker(1);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(succeed(&cb).await.unwrap_err().is_open());

        tokio::time::advance(Duration::from_secs(2)).await;
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_failure_reopens_circuit() {
        let cb = breaker(1);
        let _ = fail(&cb).await;

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(matches!(fail(&cb).await, Err(CircuitBreakerError::Inner(_))));
        assert_eq!(cb.state(), CircuitState::Open);

        // Reset timeout restarts from the failed trial.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(succeed(&cb).await.unwrap_err().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_a_single_trial() {
        let cb = breaker(1);
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial = cb.call(|| async move {
            let _ = release_rx.await;
            Ok::<_, &'static str>(())
        });
        tokio::pin!(trial);

        // Drive the trial until it parks on the channel.
        assert!(futures::poll!(trial.as_mut()).is_pending());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        assert!(succeed(&cb).await.unwrap_err().is_open());

        release_tx.send(()).unwrap();
        trial.await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_frees_slot() {
        let cb = breaker(1);
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        {
            let trial = cb.call(|| std::future::pending::<Result<(), &'static str>>());
            tokio::pin!(trial);
            assert!(futures::poll!(trial.as_mut()).is_pending());
        }

        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_uncounted_errors_leave_circuit_closed() {
        let cb = breaker(2);
        let _ = fail(&cb).await;

        for _ in 0..5 {
            let result = cb
                .call_counting(|| async { Err::<(), _>("duplicate") }, |e| *e != "duplicate")
                .await;
            assert!(matches!(result, Err(CircuitBreakerError::Inner("duplicate"))));
        }

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_reset() {
        let cb = breaker(1);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }
}
