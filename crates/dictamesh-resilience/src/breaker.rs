//! Circuit breaker.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn label(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before tripping from `Closed` to `Open`.
    pub failure_threshold: u32,
    /// Consecutive successes in `HalfOpen` before closing.
    pub success_threshold: u32,
    /// Time spent `Open` before allowing a trial call through.
    #[serde(with = "humantime_serde")]
    pub open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

/// Thread-safe circuit breaker. One instance per protected downstream.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

#[derive(Debug, thiserror::Error)]
#[error("circuit breaker is open")]
pub struct BreakerOpen;

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    /// Call before issuing the downstream request. Transitions `Open` ->
    /// `HalfOpen` once `open_timeout` has elapsed, and admits exactly the
    /// calls a `Closed` or `HalfOpen` breaker should admit.
    pub fn admit(&self, now: Instant) -> Result<(), BreakerOpen> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|opened_at| now.saturating_duration_since(opened_at))
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.open_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.consecutive_successes = 0;
                    tracing::debug!("circuit breaker transitioning Open -> HalfOpen");
                    Ok(())
                } else {
                    Err(BreakerOpen)
                }
            }
        }
    }

    /// Records the outcome of a call admitted by [`Self::admit`].
    pub fn record(&self, now: Instant, success: bool) {
        let mut inner = self.inner.lock().unwrap();
        match (inner.state, success) {
            (BreakerState::Closed, true) => {
                inner.consecutive_failures = 0;
            }
            (BreakerState::Closed, false) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker tripped: Closed -> Open"
                    );
                }
            }
            (BreakerState::HalfOpen, true) => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    tracing::info!("circuit breaker recovered: HalfOpen -> Closed");
                }
            }
            (BreakerState::HalfOpen, false) => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                inner.consecutive_successes = 0;
                tracing::warn!("circuit breaker re-tripped: HalfOpen -> Open");
            }
            (BreakerState::Open, _) => {
                // A call shouldn't have been admitted while Open; ignore.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            open_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn closed_breaker_admits_calls_until_failure_threshold() {
        let breaker = CircuitBreaker::new(config());
        let now = Instant::now();
        for _ in 0..2 {
            assert!(breaker.admit(now).is_ok());
            breaker.record(now, false);
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.admit(now).is_ok());
        breaker.record(now, false);
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn open_breaker_rejects_until_timeout_elapses() {
        let breaker = CircuitBreaker::new(config());
        let t0 = Instant::now();
        for _ in 0..3 {
            breaker.record(t0, false);
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.admit(t0).is_err());

        let t1 = t0 + Duration::from_millis(60);
        assert!(breaker.admit(t1).is_ok());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_success_threshold_and_reopens_on_failure() {
        let breaker = CircuitBreaker::new(config());
        let t0 = Instant::now();
        for _ in 0..3 {
            breaker.record(t0, false);
        }
        let t1 = t0 + Duration::from_millis(60);
        breaker.admit(t1).unwrap();
        breaker.record(t1, true);
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record(t1, true);
        assert_eq!(breaker.state(), BreakerState::Closed);

        // Reopen scenario: a failure in HalfOpen immediately reopens.
        for _ in 0..3 {
            breaker.record(t1, false);
        }
        let t2 = t1 + Duration::from_millis(60);
        breaker.admit(t2).unwrap();
        breaker.record(t2, false);
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
