//! The multi-level cache facade composing L1 and L2.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use dictamesh_types::MeshError;

use crate::l1::L1Cache;
use crate::l2::L2Cache;

/// Which level satisfied a lookup, or `Miss` if neither did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitLevel {
    L1,
    L2,
    Miss,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub l1_capacity: usize,
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Grace period during which a just-invalidated key is still tolerated
    /// to read stale from L2 by a concurrent request that started its
    /// round trip before the invalidation.
    #[serde(with = "humantime_serde")]
    pub invalidation_grace: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 10_000,
            default_ttl: Duration::from_secs(60),
            invalidation_grace: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
}

/// A point-in-time snapshot of cache hit/miss counters, feeding the
/// `cache_hits_total`/`cache_misses_total` metric families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn total_hits(&self) -> u64 {
        self.l1_hits + self.l2_hits
    }

    pub fn total_requests(&self) -> u64 {
        self.total_hits() + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.total_hits() as f64 / total as f64
        }
    }
}

/// Composes a bounded in-process L1 with a remote L2, probing L1 first and
/// promoting L2 hits back into L1.
pub struct MultiLevelCache {
    l1: L1Cache,
    l2: Option<Arc<L2Cache>>,
    config: CacheConfig,
    counters: Counters,
}

impl MultiLevelCache {
    pub fn new(config: CacheConfig, l2: Option<L2Cache>) -> Self {
        Self {
            l1: L1Cache::new(config.l1_capacity),
            l2: l2.map(Arc::new),
            config,
            counters: Counters::default(),
        }
    }

    /// L1-only cache, useful for tests and single-node deployments.
    pub fn l1_only(config: CacheConfig) -> Self {
        Self::new(config, None)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_hits: self.counters.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.counters.l2_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }

    /// Probes L1, then L2 on miss, promoting an L2 hit back into L1 with
    /// the same TTL it is re-set with.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<(Option<T>, HitLevel), MeshError> {
        let now = Instant::now();
        if let Some(bytes) = self.l1.get(key, now) {
            self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| MeshError::internal(format!("cache value codec error for {key}")).with_source(e.into()))?;
            return Ok((Some(value), HitLevel::L1));
        }

        if let Some(l2) = &self.l2 {
            match l2.get(key).await {
                Ok(Some(bytes)) => {
                    self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
                    self.l1.put(key.to_string(), bytes.clone(), self.config.default_ttl, now);
                    let value = serde_json::from_slice(&bytes)
                        .map_err(|e| MeshError::internal(format!("cache value codec error for {key}")).with_source(e.into()))?;
                    return Ok((Some(value), HitLevel::L2));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(key, error = %err, "l2 cache lookup failed, treating as miss");
                }
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        Ok((None, HitLevel::Miss))
    }

    /// Writes through both levels with the given TTL (or the configured
    /// default TTL when `None`).
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<(), MeshError> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let bytes = serde_json::to_vec(value)
            .map_err(|e| MeshError::internal(format!("cache value codec error for {key}")).with_source(e.into()))?;
        self.l1.put(key.to_string(), bytes.clone(), ttl, Instant::now());
        if let Some(l2) = &self.l2 {
            l2.set(key, &bytes, ttl).await?;
        }
        Ok(())
    }

    /// Deletes a single key from both levels. Invalidation is applied to
    /// L1 first (locally visible immediately) then L2, so a concurrent
    /// reader can at worst observe a stale value for `invalidation_grace`.
    pub async fn delete(&self, key: &str) -> Result<(), MeshError> {
        self.l1.remove(key);
        if let Some(l2) = &self.l2 {
            l2.delete(key).await?;
        }
        debug!(key, "cache entry invalidated");
        Ok(())
    }

    /// Deletes every key starting with `prefix` (used to invalidate list
    /// results when a member entity changes).
    pub async fn delete_pattern(&self, prefix: &str) -> Result<(), MeshError> {
        self.l1.remove_prefix(prefix);
        if let Some(l2) = &self.l2 {
            l2.delete_pattern(prefix).await?;
        }
        Ok(())
    }

    pub fn invalidation_grace(&self) -> Duration {
        self.config.invalidation_grace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Widget {
        id: String,
        count: u32,
    }

    #[tokio::test]
    async fn l1_only_round_trips_and_counts_hits() {
        let cache = MultiLevelCache::l1_only(CacheConfig::default());
        let widget = Widget { id: "w1".into(), count: 3 };
        cache.set("entity:rest:w1", &widget, None).await.unwrap();

        let (value, level): (Option<Widget>, HitLevel) = cache.get("entity:rest:w1").await.unwrap();
        assert_eq!(value, Some(widget));
        assert_eq!(level, HitLevel::L1);
        assert_eq!(cache.stats().l1_hits, 1);
    }

    #[tokio::test]
    async fn miss_increments_miss_counter() {
        let cache = MultiLevelCache::l1_only(CacheConfig::default());
        let (value, level): (Option<Widget>, HitLevel) = cache.get("entity:rest:missing").await.unwrap();
        assert_eq!(value, None);
        assert_eq!(level, HitLevel::Miss);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn delete_removes_from_l1() {
        let cache = MultiLevelCache::l1_only(CacheConfig::default());
        let widget = Widget { id: "w1".into(), count: 3 };
        cache.set("entity:rest:w1", &widget, None).await.unwrap();
        cache.delete("entity:rest:w1").await.unwrap();
        let (value, level): (Option<Widget>, HitLevel) = cache.get("entity:rest:w1").await.unwrap();
        assert_eq!(value, None);
        assert_eq!(level, HitLevel::Miss);
    }

    #[tokio::test]
    async fn delete_pattern_clears_matching_list_keys_only() {
        let cache = MultiLevelCache::l1_only(CacheConfig::default());
        cache.set("list:product:a", &Widget { id: "a".into(), count: 1 }, None).await.unwrap();
        cache.set("entity:rest:a", &Widget { id: "a".into(), count: 1 }, None).await.unwrap();
        cache.delete_pattern("list:product:").await.unwrap();

        let (listed, _): (Option<Widget>, HitLevel) = cache.get("list:product:a").await.unwrap();
        assert_eq!(listed, None);
        let (entity, _): (Option<Widget>, HitLevel) = cache.get("entity:rest:a").await.unwrap();
        assert!(entity.is_some());
    }
}
