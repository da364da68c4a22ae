//! Bounded in-process LRU with per-entry TTL.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// An O(1) get/put LRU cache of raw bytes, keyed by the cache-key strings
/// from [`crate::key`]. Values are stored pre-serialized so L1 and L2 share
/// the same byte representation.
pub struct L1Cache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl L1Cache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str, now: Instant) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, value: Vec<u8>, ttl: Duration, now: Instant) {
        self.entries.lock().put(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.entries.lock().pop(key);
    }

    /// Removes every entry whose key starts with `prefix`. Used for
    /// `DeletePattern` on list-result keys.
    pub fn remove_prefix(&self, prefix: &str) {
        let mut entries = self.entries.lock();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            entries.pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = L1Cache::new(8);
        let now = Instant::now();
        cache.put("entity:a:1".into(), b"hello".to_vec(), Duration::from_secs(60), now);
        assert_eq!(cache.get("entity:a:1", now), Some(b"hello".to_vec()));
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = L1Cache::new(8);
        let now = Instant::now();
        cache.put("entity:a:1".into(), b"hello".to_vec(), Duration::from_millis(1), now);
        let later = now + Duration::from_millis(5);
        assert_eq!(cache.get("entity:a:1", later), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = L1Cache::new(2);
        let now = Instant::now();
        cache.put("a".into(), b"1".to_vec(), Duration::from_secs(60), now);
        cache.put("b".into(), b"2".to_vec(), Duration::from_secs(60), now);
        cache.put("c".into(), b"3".to_vec(), Duration::from_secs(60), now);
        assert_eq!(cache.get("a", now), None);
        assert_eq!(cache.get("b", now), Some(b"2".to_vec()));
        assert_eq!(cache.get("c", now), Some(b"3".to_vec()));
    }

    #[test]
    fn remove_prefix_clears_matching_list_keys() {
        let cache = L1Cache::new(8);
        let now = Instant::now();
        cache.put("list:product:a".into(), b"x".to_vec(), Duration::from_secs(60), now);
        cache.put("list:product:b".into(), b"y".to_vec(), Duration::from_secs(60), now);
        cache.put("entity:rest:1".into(), b"z".to_vec(), Duration::from_secs(60), now);
        cache.remove_prefix("list:product:");
        assert_eq!(cache.get("list:product:a", now), None);
        assert_eq!(cache.get("list:product:b", now), None);
        assert_eq!(cache.get("entity:rest:1", now), Some(b"z".to_vec()));
    }
}
