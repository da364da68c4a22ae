//! Retry with exponential backoff and jitter.
//!
//! Wraps the `exponential_backoff::Backoff` type behind a small trait so
//! callers don't need to reach for the crate directly.

use std::time::Duration;

pub use exponential_backoff::Backoff;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    None,
    Full,
    Equal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    pub multiplier: f64,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: Jitter::Full,
        }
    }
}

impl RetryConfig {
    /// The un-jittered delay before attempt `k` (1-indexed): `min(D, d0 * m^(k-1))`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_delay.as_millis() as f64) * exp;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Applies jitter to `base` using `rng`. `Full` jitter samples uniformly
    /// in `[0, base]`; `Equal` jitter samples in `[base/2, base]`; `None`
    /// returns `base` unchanged.
    pub fn jittered_delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let base = self.base_delay(attempt);
        match self.jitter {
            Jitter::None => base,
            Jitter::Full => Duration::from_millis(rng.gen_range(0..=base.as_millis() as u64)),
            Jitter::Equal => {
                let half = base.as_millis() as u64 / 2;
                let full = base.as_millis() as u64;
                if half >= full {
                    base
                } else {
                    Duration::from_millis(rng.gen_range(half..=full))
                }
            }
        }
    }
}

/// Runs `op` up to `config.max_attempts` times, sleeping between attempts
/// per the configured backoff+jitter, retrying only errors for which
/// `is_retryable` returns true. Honors `cancel` by aborting immediately
///.
pub async fn retry<T, E, F, Fut>(
    config: &RetryConfig,
    mut is_retryable: impl FnMut(&E) -> bool,
    cancel: impl std::future::Future<Output = ()>,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    tokio::pin!(cancel);
    let mut rng = rand::thread_rng();
    let mut attempt = 1;
    loop {
        let outcome = op(attempt).await;
        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= config.max_attempts || !is_retryable(&err) => return Err(err),
            Err(_err) => {
                let delay = config.jittered_delay(attempt, &mut rng);
                tracing::debug!(attempt, ?delay, "retrying after backoff");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = &mut cancel => return Err(_err),
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn base_delay_follows_exponential_growth_capped_at_max() {
        let cfg = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(1000),
            jitter: Jitter::None,
        };
        assert_eq!(cfg.base_delay(1), Duration::from_millis(100));
        assert_eq!(cfg.base_delay(2), Duration::from_millis(200));
        assert_eq!(cfg.base_delay(3), Duration::from_millis(400));
        assert_eq!(cfg.base_delay(10), Duration::from_millis(1000));
    }

    #[test]
    fn full_jitter_stays_within_bounds() {
        let cfg = RetryConfig {
            jitter: Jitter::Full,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            max_attempts: 5,
        };
        let mut rng = rand::thread_rng();
        for attempt in 1..=4 {
            let base = cfg.base_delay(attempt);
            for _ in 0..20 {
                let d = cfg.jittered_delay(attempt, &mut rng);
                assert!(d <= base, "{d:?} should be <= {base:?}");
            }
        }
    }

    #[test]
    fn equal_jitter_stays_within_half_to_full_bounds() {
        let cfg = RetryConfig {
            jitter: Jitter::Equal,
            initial_delay: Duration::from_millis(200),
            multiplier: 1.0,
            max_delay: Duration::from_secs(10),
            max_attempts: 5,
        };
        let base = cfg.base_delay(1);
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let d = cfg.jittered_delay(1, &mut rng);
            assert!(d >= base / 2 && d <= base);
        }
    }

    #[tokio::test]
    async fn retry_stops_at_max_attempts() {
        let cfg = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(5),
            jitter: Jitter::None,
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), &'static str> = retry(
            &cfg,
            |_e| true,
            std::future::pending(),
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err("boom"))
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_does_not_retry_non_retryable_errors() {
        let cfg = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), &'static str> = retry(
            &cfg,
            |_e| false,
            std::future::pending(),
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err("not-retryable"))
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let cfg = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(2),
            jitter: Jitter::None,
        };
        let calls = AtomicU32::new(0);
        let result = retry(
            &cfg,
            |_e: &&str| true,
            std::future::pending(),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err("retry-me")
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
