//! Token-bucket rate limiter.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};

pub struct RateLimiter {
    inner: GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RateLimiter {
    /// `rate` tokens/sec sustained, `burst` tokens of instantaneous capacity.
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(rate_per_sec.max(1)).unwrap();
        let burst = NonZeroU32::new(burst.max(1)).unwrap();
        let quota = Quota::per_second(rate).allow_burst(burst);
        Self {
            inner: GovernorLimiter::direct(quota),
        }
    }

    /// Non-blocking: returns `false` immediately if no token is available.
    pub fn allow(&self) -> bool {
        self.inner.check().is_ok()
    }

    /// Blocking: sleeps until a token is available, or `cancel` resolves.
    pub async fn wait(&self, cancel: impl std::future::Future<Output = ()>) -> Result<(), Cancelled> {
        tokio::pin!(cancel);
        loop {
            match self.inner.check() {
                Ok(()) => return Ok(()),
                Err(not_until) => {
                    let wait_for = not_until.wait_time_from(governor::clock::Clock::now(&DefaultClock::default()));
                    tokio::select! {
                        _ = tokio::time::sleep(wait_for.max(Duration::from_millis(1))) => {}
                        _ = &mut cancel => return Err(Cancelled),
                    }
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("rate limiter wait cancelled")]
pub struct Cancelled;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_rejects_once_burst_is_exhausted() {
        let limiter = RateLimiter::new(1, 2);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[tokio::test]
    async fn wait_eventually_admits_a_call() {
        let limiter = RateLimiter::new(1000, 1);
        assert!(limiter.allow());
        let result = tokio::time::timeout(Duration::from_secs(1), limiter.wait(std::future::pending())).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn wait_is_cancellable() {
        let limiter = RateLimiter::new(1, 1);
        assert!(limiter.allow());
        let result = limiter.wait(async { tokio::time::sleep(Duration::from_millis(5)).await }).await;
        assert!(result.is_err());
    }
}
