//! Raw-record to canonical-entity mapping.
//!
//! A transform is deterministic and pure: given the same [`Record`] it
//! always produces the same [`Entity`] shape (modulo the clock values the
//! caller stamps in). Each adapter registers one transform per entity
//! type it owns.

use chrono::Utc;
use dictamesh_connector::Record;
use dictamesh_types::{AttributeMap, Entity, EntityId, EntityMetadata, MeshError, Relationship};

/// Maps a connector [`Record`] to a canonical [`Entity`] for one entity
/// type. Implementors are expected to be cheap, synchronous, and
/// side-effect free; anything requiring I/O belongs in the connector or
/// catalog layer instead.
pub trait Transform: Send + Sync {
    fn entity_type(&self) -> &str;

    /// Extracts attributes and relationships from `record`'s free-form
    /// `data`. `domain` and `source_system` are supplied by the adapter so
    /// the transform doesn't need to know its own configuration.
    fn transform(
        &self,
        record: &Record,
        domain: &str,
        source_system: &str,
    ) -> Result<TransformedEntity, MeshError>;
}

/// What a [`Transform`] produces before validation and schema-version
/// stamping: the attribute map plus any relationships discovered while
/// mapping the record (e.g. a foreign key becoming a `belongs_to` edge).
pub struct TransformedEntity {
    pub attributes: AttributeMap,
    pub relationships: Vec<Relationship>,
    pub contains_pii: bool,
}

/// Builds the canonical [`Entity`] from a transform's output, stamping
/// identity and timestamps. `schema_version` is the version the caller
/// intends to validate and store against.
pub fn assemble_entity(
    entity_type: &str,
    domain: &str,
    source_system: &str,
    source_id: &str,
    record: &Record,
    transformed: TransformedEntity,
    schema_version: u32,
) -> Entity {
    let now = Utc::now();
    Entity {
        id: EntityId::new(entity_type, source_id),
        entity_type: entity_type.to_string(),
        domain: domain.to_string(),
        attributes: transformed.attributes,
        relationships: transformed.relationships,
        metadata: EntityMetadata {
            source_system: source_system.to_string(),
            source_id: source_id.to_string(),
            created_at: record.observed_at,
            updated_at: now,
            cache_control: Default::default(),
            slo: Default::default(),
            contains_pii: transformed.contains_pii,
        },
        schema_version,
        lifecycle: dictamesh_types::EntityLifecycle::Discovered,
    }
}

/// A transform that copies every field of `record.data` straight into the
/// entity's attribute map with no relationship extraction, useful for
/// entity types with no declared foreign keys and as a default for tests.
pub struct PassthroughTransform {
    entity_type: String,
}

impl PassthroughTransform {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self { entity_type: entity_type.into() }
    }
}

impl Transform for PassthroughTransform {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn transform(
        &self,
        record: &Record,
        _domain: &str,
        _source_system: &str,
    ) -> Result<TransformedEntity, MeshError> {
        let attributes = record
            .data
            .iter()
            .map(|(k, v)| (k.clone(), dictamesh_types::Value::from(v.clone())))
            .collect();
        Ok(TransformedEntity {
            attributes,
            relationships: Vec::new(),
            contains_pii: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn passthrough_copies_all_fields() {
        let mut data = HashMap::new();
        data.insert("name".to_string(), serde_json::json!("Widget"));
        let record = Record {
            id: "123".into(),
            data,
            metadata: HashMap::new(),
            observed_at: Utc::now(),
        };
        let transform = PassthroughTransform::new("product");
        let out = transform.transform(&record, "catalog", "rest-catalog").unwrap();
        assert_eq!(out.attributes.get("name").and_then(|v| v.as_str()), Some("Widget"));
    }
}
