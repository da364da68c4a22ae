//! In-memory schema registry keyed by `(event_type, version)`, enforcing
//! compatibility on registration.
//!
//! Encoded events embed `schema_id`; this registry also resolves that id
//! back to a schema for decoders, with an in-memory cache of the
//! `apache_avro::Schema` built from each registered definition.

use std::collections::HashMap;
use std::sync::Arc;

use apache_avro::Schema as AvroSchema;
use dashmap::DashMap;
use dictamesh_types::schema::{check_compatible, Compatibility, Schema};

use crate::error::EventError;

#[derive(Default)]
struct SubjectVersions {
    latest: Option<Schema>,
    latest_id: Option<u64>,
    by_version: HashMap<u32, Schema>,
}

/// Process-wide `(event_type, version) -> Schema` registry with an
/// auto-incrementing numeric schema id per registered version.
pub struct SchemaRegistry {
    subjects: DashMap<String, SubjectVersions>,
    by_id: DashMap<u64, (String, u32)>,
    avro_cache: DashMap<u64, Arc<AvroSchema>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            subjects: DashMap::new(),
            by_id: DashMap::new(),
            avro_cache: DashMap::new(),
            next_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Registers `schema` for its `entity_type`, checking it against the
    /// current latest version under `schema.compatibility`. Returns the
    /// numeric schema id embedded in encoded payloads.
    pub fn register(&self, schema: Schema) -> Result<u64, EventError> {
        let subject = schema.entity_type.clone();
        let mode = schema.compatibility;

        let mut entry = self.subjects.entry(subject.clone()).or_default();
        if let Some(previous) = &entry.latest {
            check_compatible(previous, &schema, mode)?;
        }

        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        entry.by_version.insert(schema.version, schema.clone());
        entry.latest = Some(schema);
        entry.latest_id = Some(id);
        self.by_id.insert(id, (subject, entry.latest.as_ref().unwrap().version));
        Ok(id)
    }

    /// The schema id for the subject's current latest version, if any
    /// version has been registered yet.
    pub fn current_schema_id(&self, event_type: &str) -> Option<u64> {
        self.subjects.get(event_type)?.latest_id
    }

    pub fn get(&self, event_type: &str, version: u32) -> Option<Schema> {
        self.subjects.get(event_type)?.by_version.get(&version).cloned()
    }

    pub fn latest(&self, event_type: &str) -> Option<Schema> {
        self.subjects.get(event_type)?.latest.clone()
    }

    pub fn resolve_by_id(&self, schema_id: u64) -> Option<Schema> {
        let (subject, version) = self.by_id.get(&schema_id)?.clone();
        self.get(&subject, version)
    }

    /// Lazily compiles and caches the `apache_avro::Schema` for a
    /// registered `(event_type, version)` pair. Only meaningful for
    /// `SchemaFormat::Avro` schemas; JSON-Schema-format entries are
    /// validated elsewhere and never reach here.
    pub fn avro_schema(&self, schema_id: u64) -> Result<Arc<AvroSchema>, EventError> {
        if let Some(cached) = self.avro_cache.get(&schema_id) {
            return Ok(cached.clone());
        }
        let (subject, version) = self
            .by_id
            .get(&schema_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| EventError::SchemaNotFound { event_type: "<unknown>".into(), version: 0 })?;
        let schema = self.get(&subject, version).ok_or_else(|| EventError::SchemaNotFound {
            event_type: subject,
            version,
        })?;
        let avro = AvroSchema::parse(&schema.definition)?;
        let avro = Arc::new(avro);
        self.avro_cache.insert(schema_id, avro.clone());
        Ok(avro)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dictamesh_types::schema::SchemaFormat;

    fn avro_schema(version: u32, fields_extra: &str) -> Schema {
        let definition = serde_json::json!({
            "type": "record",
            "name": "Product",
            "fields": [
                {"name": "id", "type": "string"},
            ]
        });
        let _ = fields_extra;
        Schema {
            entity_type: "product".into(),
            version,
            format: SchemaFormat::Avro,
            definition,
            registered_at: Utc::now(),
            compatibility: Compatibility::None,
        }
    }

    #[test]
    fn registering_and_resolving_by_id_round_trips() {
        let registry = SchemaRegistry::new();
        let id = registry.register(avro_schema(1, "")).unwrap();
        let resolved = registry.resolve_by_id(id).unwrap();
        assert_eq!(resolved.entity_type, "product");
        assert_eq!(resolved.version, 1);
    }

    #[test]
    fn avro_schema_is_cached_after_first_parse() {
        let registry = SchemaRegistry::new();
        let id = registry.register(avro_schema(1, "")).unwrap();
        let first = registry.avro_schema(id).unwrap();
        let second = registry.avro_schema(id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn incompatible_schema_is_rejected_on_registration() {
        let registry = SchemaRegistry::new();
        let mut v1 = avro_schema(1, "");
        v1.compatibility = Compatibility::Backward;
        v1.format = SchemaFormat::JsonSchema;
        v1.definition = serde_json::json!({"properties": {"id": {}, "sku": {}}, "required": ["id", "sku"]});
        registry.register(v1).unwrap();

        let mut v2 = avro_schema(2, "");
        v2.compatibility = Compatibility::Backward;
        v2.format = SchemaFormat::JsonSchema;
        v2.definition = serde_json::json!({"properties": {"id": {}}, "required": ["id"]});
        let err = registry.register(v2).unwrap_err();
        assert!(matches!(err, EventError::IncompatibleSchema(_)));
    }
}
