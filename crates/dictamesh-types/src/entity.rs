//! The canonical [`Entity`] record and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EntityId;
use crate::relationship::Relationship;
use crate::value::AttributeMap;

/// SLO promises carried in an entity's metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SloPromise {
    pub availability: Option<f64>,
    pub p99_latency_ms: Option<u64>,
    /// Maximum acceptable staleness, in seconds.
    pub freshness_secs: Option<u64>,
}

/// Cache-control hints an entity's metadata may carry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheControl {
    pub no_cache: bool,
    pub max_age: Option<std::time::Duration>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub source_system: String,
    pub source_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub cache_control: CacheControl,
    #[serde(default)]
    pub slo: SloPromise,
    #[serde(default)]
    pub contains_pii: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityLifecycle {
    Discovered,
    Registered,
    Active,
    Deprecated,
    Deleted,
}

impl EntityLifecycle {
    /// Valid forward transitions between lifecycle states; `Active ->
    /// Deleted` is allowed directly (deprecation is optional, not mandatory).
    pub fn can_transition_to(self, next: EntityLifecycle) -> bool {
        use EntityLifecycle::*;
        matches!(
            (self, next),
            (Discovered, Registered)
                | (Registered, Active)
                | (Active, Deprecated)
                | (Active, Deleted)
                | (Deprecated, Deleted)
        )
    }
}

/// The canonical record exposed by the data mesh.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub entity_type: String,
    pub domain: String,
    pub attributes: AttributeMap,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    pub metadata: EntityMetadata,
    pub schema_version: u32,
    #[serde(default = "default_lifecycle")]
    pub lifecycle: EntityLifecycle,
}

fn default_lifecycle() -> EntityLifecycle {
    EntityLifecycle::Discovered
}

impl Entity {
    /// Invariant (1): entity type must match the `type:` prefix of its id.
    pub fn has_consistent_id(&self) -> bool {
        self.id.type_prefix() == self.entity_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_allows_only_declared_transitions() {
        use EntityLifecycle::*;
        assert!(Discovered.can_transition_to(Registered));
        assert!(Active.can_transition_to(Deleted));
        assert!(!Deleted.can_transition_to(Active));
        assert!(!Discovered.can_transition_to(Active));
    }

    #[test]
    fn entity_id_must_match_declared_type() {
        let entity = Entity {
            id: EntityId::new("product", "123"),
            entity_type: "product".into(),
            domain: "catalog".into(),
            attributes: Default::default(),
            relationships: vec![],
            metadata: EntityMetadata {
                source_system: "rest-catalog".into(),
                source_id: "123".into(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                cache_control: Default::default(),
                slo: Default::default(),
                contains_pii: false,
            },
            schema_version: 1,
            lifecycle: EntityLifecycle::Active,
        };
        assert!(entity.has_consistent_id());
    }
}
