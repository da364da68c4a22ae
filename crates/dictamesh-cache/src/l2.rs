//! Remote L2 cache backed by Redis, with pipelined batch get/set.

use std::time::Duration;

use redis::AsyncCommands;

use dictamesh_types::{ErrorKind, MeshError};

/// A thin async wrapper over a `redis` multiplexed connection. Every method
/// maps connection/protocol failures onto [`ErrorKind::Unavailable`] so the
/// resilience layer's circuit breaker can see them.
#[derive(Clone)]
pub struct L2Cache {
    client: redis::Client,
}

impl L2Cache {
    pub fn new(redis_url: &str) -> Result<Self, MeshError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| MeshError::new(ErrorKind::Internal, "invalid redis url").with_source(e.into()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, MeshError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| MeshError::unavailable("redis connection failed").with_source(e.into()))
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, MeshError> {
        let mut conn = self.connection().await?;
        conn.get(key)
            .await
            .map_err(|e| MeshError::unavailable("redis GET failed").with_source(e.into()))
    }

    /// Pipelined batch get, preserving `keys`' order in the result.
    pub async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, MeshError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        conn.mget(keys)
            .await
            .map_err(|e| MeshError::unavailable("redis MGET failed").with_source(e.into()))
    }

    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), MeshError> {
        let mut conn = self.connection().await?;
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| MeshError::unavailable("redis SETEX failed").with_source(e.into()))
    }

    /// Pipelined batch set, all entries sharing the same TTL.
    pub async fn mset(&self, entries: &[(String, Vec<u8>)], ttl: Duration) -> Result<(), MeshError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let ttl_secs = ttl.as_secs().max(1);
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.set_ex(key, value, ttl_secs).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| MeshError::unavailable("redis pipelined MSET failed").with_source(e.into()))
    }

    pub async fn delete(&self, key: &str) -> Result<(), MeshError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| MeshError::unavailable("redis DEL failed").with_source(e.into()))
    }

    /// Scans for keys matching `prefix*` and deletes them. Uses `SCAN`
    /// rather than `KEYS` to avoid blocking the redis event loop.
    pub async fn delete_pattern(&self, prefix: &str) -> Result<u64, MeshError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut deleted = 0u64;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| MeshError::unavailable("redis SCAN failed").with_source(e.into()))?;
            if !keys.is_empty() {
                deleted += keys.len() as u64;
                conn.del::<_, ()>(&keys)
                    .await
                    .map_err(|e| MeshError::unavailable("redis DEL failed").with_source(e.into()))?;
            }
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(deleted)
    }
}
