//! Deduplicates concurrent calls sharing a key so a cache miss on a hot
//! entity issues exactly one source fetch.

use std::collections::HashMap;
use std::sync::Arc;

use dictamesh_types::MeshError;
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// `T` must be `Clone` since every waiter on a shared in-flight call
/// receives its own copy of the eventual result.
pub struct SingleFlight<T: Clone + Send + 'static> {
    inflight: Mutex<HashMap<String, broadcast::Sender<Result<T, String>>>>,
}

impl<T: Clone + Send + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self { inflight: Mutex::new(HashMap::new()) }
    }

    /// Runs `f` for `key` if no call for `key` is already in flight;
    /// otherwise awaits the in-flight call's result. Errors are carried as
    /// their `Display` string across the broadcast channel and rehydrated
    /// into an `Internal` [`MeshError`] for followers (the leader's own
    /// error is returned unmodified).
    pub async fn run<F, Fut>(&self, key: &str, f: F) -> Result<T, MeshError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, MeshError>>,
    {
        let mut receiver = {
            let mut inflight = self.inflight.lock();
            if let Some(sender) = inflight.get(key) {
                Some(sender.subscribe())
            } else {
                let (sender, _) = broadcast::channel(1);
                inflight.insert(key.to_string(), sender);
                None
            }
        };

        if let Some(receiver) = receiver.take() {
            return self.follow(receiver).await;
        }

        let result = f().await;
        let broadcast_result = result.as_ref().map(|_| ()).map_err(|e| e.to_string());

        let sender = {
            let mut inflight = self.inflight.lock();
            inflight.remove(key)
        };

        if let Some(sender) = sender {
            let to_send = match (&result, &broadcast_result) {
                (Ok(value), _) => Ok(value.clone()),
                (Err(_), Err(msg)) => Err(msg.clone()),
                _ => unreachable!(),
            };
            let _ = sender.send(to_send);
        }

        result
    }

    async fn follow(&self, mut receiver: broadcast::Receiver<Result<T, String>>) -> Result<T, MeshError> {
        match receiver.recv().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(msg)) => Err(MeshError::internal(format!("in-flight call failed: {msg}"))),
            Err(_) => Err(MeshError::internal("in-flight call's leader dropped before completing")),
        }
    }
}

impl<T: Clone + Send + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle, since a `SingleFlight` is owned by the adapter runtime
/// and called concurrently from many task handlers.
pub type SharedSingleFlight<T> = Arc<SingleFlight<T>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_calls_for_same_key_share_one_execution() {
        let flight: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let flight = flight.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("product:1", || {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, MeshError>(42)
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_each_run_independently() {
        let flight: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let a = flight.run("a", || async { Ok::<_, MeshError>(1) }).await.unwrap();
        let b = flight.run("b", || async { Ok::<_, MeshError>(2) }).await.unwrap();
        assert_eq!((a, b), (1, 2));
    }
}
