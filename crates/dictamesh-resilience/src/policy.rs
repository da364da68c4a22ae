//! The composed resilience policy.
//!
//! Outside-in: `RateLimiter -> CircuitBreaker -> Retry -> Timeout -> call`.
//! This ordering is stated but left as an exercise by the original spec;
//! every adapter needs it identically, so we supply the composed type once
//! here instead of each call site hand-assembling the chain.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use dictamesh_types::{ErrorKind, MeshError};

use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryConfig;
use crate::timeout::with_deadline;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub rate_per_sec: u32,
    pub burst: u32,
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: 100,
            burst: 20,
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Wraps a downstream call with rate limiting, a circuit breaker, retry
/// with backoff+jitter, and a per-call timeout, composed in the order
///
pub struct Policy {
    config: PolicyConfig,
    limiter: RateLimiter,
    breaker: Arc<CircuitBreaker>,
}

impl Policy {
    pub fn new(config: PolicyConfig) -> Self {
        let limiter = RateLimiter::new(config.rate_per_sec, config.burst);
        let breaker = Arc::new(CircuitBreaker::new(config.breaker));
        Self {
            config,
            limiter,
            breaker,
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Executes `op`, respecting the rate limit and circuit breaker before
    /// retrying retryable failures, in the outside-in order §4.1 states:
    /// `RateLimiter -> CircuitBreaker -> Retry -> Timeout -> call`. The
    /// breaker is admitted/recorded once per `execute` call, around the
    /// whole retry sequence, so a tripped breaker rejects immediately
    /// instead of being retried. `op` receives the 1-indexed attempt number
    /// so it can be surfaced in tracing/metrics.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, MeshError>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, MeshError>>,
    {
        self.limiter
            .wait(std::future::pending())
            .await
            .map_err(|_| MeshError::unavailable("rate limiter wait cancelled"))?;

        self.breaker
            .admit(Instant::now())
            .map_err(|_| MeshError::unavailable("circuit breaker is open"))?;

        let timeout = self.config.call_timeout;

        let outcome = crate::retry::retry(
            &self.config.retry,
            |err: &MeshError| err.is_retryable(),
            std::future::pending(),
            move |attempt| {
                let op_result = op(attempt);
                async move {
                    match with_deadline(timeout, op_result).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(err)) => Err(err.with_attempt(attempt)),
                        Err(_deadline) => Err(MeshError::new(ErrorKind::Timeout, "call exceeded its deadline")
                            .with_attempt(attempt)),
                    }
                }
            },
        )
        .await;

        match &outcome {
            Ok(_) => self.breaker.record(Instant::now(), true),
            Err(err) if err.kind.counts_toward_breaker() => self.breaker.record(Instant::now(), false),
            Err(_) => {}
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> Policy {
        Policy::new(PolicyConfig {
            rate_per_sec: 10_000,
            burst: 10_000,
            breaker: BreakerConfig {
                failure_threshold: 2,
                success_threshold: 1,
                open_timeout: Duration::from_millis(20),
            },
            retry: RetryConfig {
                max_attempts: 5,
                initial_delay: Duration::from_millis(1),
                multiplier: 1.0,
                max_delay: Duration::from_millis(2),
                jitter: crate::retry::Jitter::None,
            },
            call_timeout: Duration::from_millis(200),
        })
    }

    #[tokio::test]
    async fn succeeds_immediately_on_healthy_downstream() {
        let policy = fast_policy();
        let result = policy.execute(|_attempt| async { Ok::<_, MeshError>(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);
        let result = policy
            .execute(|_attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 1 {
                        Err(MeshError::unavailable("transient"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn non_retryable_error_surfaces_immediately() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);
        let result: Result<(), MeshError> = policy
            .execute(|_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(MeshError::validation("bad input")) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn breaker_trips_after_repeated_failures_and_surfaces_unavailable() {
        let policy = fast_policy();
        for _ in 0..2 {
            let _ = policy
                .execute(|_attempt| async { Err::<(), _>(MeshError::unavailable("down")) })
                .await;
        }
        assert_eq!(policy.breaker_state(), BreakerState::Open);
    }
}
