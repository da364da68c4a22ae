//! Helpers for deriving the persisted [`CatalogRow`] view from an [`Entity`].

use chrono::Utc;
use dictamesh_types::catalog_row::{AuthKind, DiscoveryHint, DiscoveryMethod, GovernanceFlags, QualityMetrics};
use dictamesh_types::{CatalogRow, Entity, RowId};

pub fn entity_to_row(row_id: RowId, entity: &Entity) -> CatalogRow {
    CatalogRow {
        row_id,
        entity_id: entity.id.clone(),
        entity_type: entity.entity_type.clone(),
        domain: entity.domain.clone(),
        source_system: entity.metadata.source_system.clone(),
        source_entity_id: entity.metadata.source_id.clone(),
        discovery: DiscoveryHint {
            endpoint_template: String::new(),
            method: DiscoveryMethod::Get,
            auth_kind: AuthKind::None,
        },
        quality: QualityMetrics::default(),
        governance: GovernanceFlags {
            contains_pii: entity.metadata.contains_pii,
            classification: Default::default(),
            retention_days: None,
        },
        schema_version: entity.schema_version,
        lifecycle: entity.lifecycle,
        last_seen_at: Utc::now(),
    }
}
