//! Processed-event tracking for exactly-once handler effects.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

/// A check-then-act guard: `check` must be called before running a
/// handler's side effect, and `mark_processed` only after it succeeds.
pub struct IdempotencyStore {
    seen: DashMap<Uuid, Instant>,
    ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self { seen: DashMap::new(), ttl }
    }

    /// Returns `true` if `event_id` has already been processed within the
    /// TTL window (i.e. the handler must be skipped).
    pub fn already_processed(&self, event_id: Uuid) -> bool {
        match self.seen.get(&event_id) {
            Some(seen_at) => seen_at.elapsed() < self.ttl,
            None => false,
        }
    }

    pub fn mark_processed(&self, event_id: Uuid) {
        self.seen.insert(event_id, Instant::now());
    }

    /// Drops entries older than the TTL. Call periodically; entries are
    /// also treated as expired on read even without a sweep.
    pub fn sweep_expired(&self) {
        self.seen.retain(|_, seen_at| seen_at.elapsed() < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_event_is_not_processed() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        assert!(!store.already_processed(Uuid::new_v4()));
    }

    #[test]
    fn marked_event_is_processed_until_ttl_expires() {
        let store = IdempotencyStore::new(Duration::from_millis(10));
        let id = Uuid::new_v4();
        store.mark_processed(id);
        assert!(store.already_processed(id));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!store.already_processed(id));
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let store = IdempotencyStore::new(Duration::from_millis(5));
        store.mark_processed(Uuid::new_v4());
        std::thread::sleep(Duration::from_millis(15));
        store.sweep_expired();
        assert!(store.is_empty());
    }
}
