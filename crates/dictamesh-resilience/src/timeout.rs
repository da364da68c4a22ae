//! Scoped timeouts.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("operation exceeded its deadline of {0:?}")]
pub struct DeadlineExceeded(pub Duration);

/// Bounds `fut` by `deadline`, independent of whatever cancellation the
/// caller's own context may also apply.
pub async fn with_deadline<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = T>,
) -> Result<T, DeadlineExceeded> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| DeadlineExceeded(deadline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_before_deadline() {
        let result = with_deadline(Duration::from_millis(50), async { 7 }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn times_out_past_deadline() {
        let result = with_deadline(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            7
        })
        .await;
        assert!(result.is_err());
    }
}
