//! Identifiers used across the catalog and event pipeline.
//!
//! [`RowId`] is the internal, dense identifier minted for catalog rows,
//! outbox rows, and events: an 8-byte value displayed as hex, the same shape
//! `models::Id` uses for Flow's `flowid` domain. [`EntityId`] is the
//! caller-facing canonical entity identifier, an opaque string namespaced by
//! a type-prefix convention (`product:123`, `deployment:abc`) .

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// A dense internal identifier: 8 bytes, displayed as lowercase hex.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId([u8; 8]);

impl RowId {
    pub fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> [u8; 8] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 8]
    }

    pub fn zero() -> Self {
        Self([0u8; 8])
    }

    pub fn from_hex<T: AsRef<[u8]>>(hex: T) -> Result<Self, hex::FromHexError> {
        let decoded = hex::decode(hex)?;
        let exact: [u8; 8] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(exact))
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", u64::from_be_bytes(self.0))
    }
}

impl fmt::Debug for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Display>::fmt(self, f)
    }
}

impl FromStr for RowId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl serde::Serialize for RowId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        format!("{self}").serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for RowId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let s = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        Self::from_hex(s.as_ref()).map_err(|err| D::Error::custom(format!("invalid id: {err}")))
    }
}

/// Monotonic, process-local generator of [`RowId`]s.
///
/// Not a distributed sequence: uniqueness across catalog rows relies on the
/// timestamp-high / counter-low split plus the `(source_system,
/// source_entity_id)` unique index at the storage layer, not on this
/// generator alone.
pub struct IdGenerator {
    shard: u16,
    counter: AtomicU64,
}

impl IdGenerator {
    pub fn new(shard: u16) -> Self {
        Self {
            shard,
            counter: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> RowId {
        let now_ms = chrono::Utc::now().timestamp_millis() as u64;
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
        // 40 bits of millis, 16 bits of shard, 8 bits of sequence wrap.
        let packed: u64 = ((now_ms & 0xFF_FFFF_FFFF) << 24)
            | ((self.shard as u64) << 8)
            | (seq & 0xFF);
        RowId(packed.to_be_bytes())
    }
}

/// Caller-facing canonical entity identifier, e.g. `product:123`.
///
/// Opaque beyond its type-prefix: the substring before the first `:` names
/// the entity type and must match the entity's `entity_type`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(type_prefix: &str, local_id: &str) -> Self {
        Self(format!("{type_prefix}:{local_id}"))
    }

    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidEntityId> {
        let raw = raw.into();
        let has_prefix = matches!(raw.split_once(':'), Some((prefix, _)) if !prefix.is_empty());
        if !has_prefix {
            return Err(InvalidEntityId(raw));
        }
        Ok(Self(raw))
    }

    pub fn type_prefix(&self) -> &str {
        self.0.split_once(':').map(|(p, _)| p).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Display>::fmt(self, f)
    }
}

impl FromStr for EntityId {
    type Err = InvalidEntityId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("entity id {0:?} is missing a `type:` prefix")]
pub struct InvalidEntityId(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_id_round_trips_through_hex() {
        let id = RowId::new([1, 2, 3, 4, 5, 6, 7, 8]);
        let hex = format!("{id}");
        assert_eq!(RowId::from_hex(hex).unwrap(), id);
    }

    #[test]
    fn id_generator_produces_distinct_increasing_ids() {
        let gen = IdGenerator::new(7);
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
    }

    #[test]
    fn entity_id_requires_type_prefix() {
        assert!(EntityId::parse("product:123").is_ok());
        assert!(EntityId::parse("no-prefix").is_err());
        assert!(EntityId::parse(":123").is_err());
    }

    #[test]
    fn entity_id_exposes_type_prefix() {
        let id = EntityId::new("product", "123");
        assert_eq!(id.type_prefix(), "product");
        assert_eq!(id.as_str(), "product:123");
    }
}
