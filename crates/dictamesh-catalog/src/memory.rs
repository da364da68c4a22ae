//! An in-memory [`CatalogRepository`], standing in for Postgres in tests
//! the way `InMemoryBus` stands in for a broker.

use std::collections::HashMap;

use async_trait::async_trait;
use dictamesh_types::id::IdGenerator;
use dictamesh_types::{changed_fields, CatalogRow, Entity, EntityId, Relationship, RowId, Schema};
use parking_lot::Mutex;

use crate::catalog_row::entity_to_row;
use crate::error::CatalogError;
use crate::lineage::LineageEdge;
use crate::repository::{CatalogRepository, GetOptions};
use crate::search::{SearchQuery, SearchResults};

#[derive(Default)]
struct State {
    entities: HashMap<String, Entity>,
    by_source: HashMap<(String, String), String>,
    relationships: Vec<Relationship>,
    lineage: Vec<LineageEdge>,
    schemas: HashMap<String, Vec<Schema>>,
}

pub struct InMemoryCatalog {
    state: Mutex<State>,
    id_gen: IdGenerator,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()), id_gen: IdGenerator::new(0) }
    }

    pub fn row_id_for(&self) -> RowId {
        self.id_gen.next()
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn create(&self, entity: &Entity) -> Result<CatalogRow, CatalogError> {
        let mut state = self.state.lock();
        let source_key = (entity.metadata.source_system.clone(), entity.metadata.source_id.clone());
        if state.by_source.contains_key(&source_key) {
            return Err(CatalogError::AlreadyExists(source_key.0, source_key.1));
        }
        let row_id = self.id_gen.next();
        state.entities.insert(entity.id.as_str().to_string(), entity.clone());
        state.by_source.insert(source_key, entity.id.as_str().to_string());
        Ok(entity_to_row(row_id, entity))
    }

    async fn get(&self, id: &EntityId, _opts: GetOptions) -> Result<Entity, CatalogError> {
        self.state
            .lock()
            .entities
            .get(id.as_str())
            .cloned()
            .filter(|e| e.lifecycle != dictamesh_types::EntityLifecycle::Deleted)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    async fn update(&self, entity: &Entity) -> Result<Option<(Entity, Vec<String>)>, CatalogError> {
        let mut state = self.state.lock();
        let existing = state
            .entities
            .get(entity.id.as_str())
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(entity.id.to_string()))?;
        let diff = changed_fields(&existing.attributes, &entity.attributes);
        if diff.is_empty() {
            return Ok(None);
        }
        state.entities.insert(entity.id.as_str().to_string(), entity.clone());
        Ok(Some((entity.clone(), diff)))
    }

    async fn delete(&self, id: &EntityId) -> Result<(), CatalogError> {
        let mut state = self.state.lock();
        let entity = state.entities.get_mut(id.as_str()).ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        entity.lifecycle = dictamesh_types::EntityLifecycle::Deleted;
        Ok(())
    }

    async fn create_relationship(&self, rel: &Relationship) -> Result<(), CatalogError> {
        let mut state = self.state.lock();
        let subject_exists = state.entities.contains_key(rel.subject_id.as_str());
        let object_exists = state.entities.contains_key(rel.object_id.as_str());
        if (!subject_exists || !object_exists) && !rel.dangling {
            let missing = if !subject_exists { &rel.subject_id } else { &rel.object_id };
            return Err(CatalogError::DanglingEndpoint(missing.to_string()));
        }
        state.relationships.push(rel.clone());
        Ok(())
    }

    async fn get_relationships(
        &self,
        id: &EntityId,
        relationship_type: Option<&str>,
    ) -> Result<Vec<Relationship>, CatalogError> {
        Ok(self
            .state
            .lock()
            .relationships
            .iter()
            .filter(|r| r.subject_id == *id || r.object_id == *id)
            .filter(|r| relationship_type.map_or(true, |rt| r.relationship_type == rt))
            .cloned()
            .collect())
    }

    async fn track_lineage(&self, edge: &LineageEdge) -> Result<(), CatalogError> {
        self.state.lock().lineage.push(edge.clone());
        Ok(())
    }

    async fn register_schema(&self, schema: &Schema) -> Result<(), CatalogError> {
        let mut state = self.state.lock();
        let versions = state.schemas.entry(schema.entity_type.clone()).or_default();
        if let Some(latest) = versions.last() {
            dictamesh_types::schema::check_compatible(latest, schema, schema.compatibility).map_err(|_| {
                CatalogError::IncompatibleSchema {
                    entity_type: schema.entity_type.clone(),
                    version: schema.version,
                }
            })?;
        }
        versions.push(schema.clone());
        Ok(())
    }

    async fn latest_schema(&self, entity_type: &str) -> Result<Option<Schema>, CatalogError> {
        Ok(self.state.lock().schemas.get(entity_type).and_then(|v| v.last().cloned()))
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResults<Entity>, CatalogError> {
        let state = self.state.lock();
        let mut matched: Vec<Entity> = state
            .entities
            .values()
            .filter(|e| e.lifecycle != dictamesh_types::EntityLifecycle::Deleted)
            .filter(|e| query.entity_type.as_deref().map_or(true, |t| t == e.entity_type))
            .filter(|e| query.domain.as_deref().map_or(true, |d| d == e.domain))
            .filter(|e| query.contains_pii.map_or(true, |pii| pii == e.metadata.contains_pii))
            .filter(|e| {
                query
                    .text
                    .as_deref()
                    .map_or(true, |text| e.id.as_str().contains(text) || e.metadata.source_id.contains(text))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        let total = matched.len() as i64;
        let start = (query.offset() as usize).min(matched.len());
        let end = (start + query.limit() as usize).min(matched.len());
        Ok(SearchResults { items: matched[start..end].to_vec(), total, page: query.page, page_size: query.page_size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dictamesh_types::{AttributeMap, EntityMetadata};

    fn entity(id: &str, source_id: &str) -> Entity {
        Entity {
            id: EntityId::new("product", id),
            entity_type: "product".into(),
            domain: "catalog".into(),
            attributes: AttributeMap::new(),
            relationships: vec![],
            metadata: EntityMetadata {
                source_system: "rest-catalog".into(),
                source_id: source_id.into(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                cache_control: Default::default(),
                slo: Default::default(),
                contains_pii: false,
            },
            schema_version: 1,
            lifecycle: dictamesh_types::EntityLifecycle::Active,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_source_identity() {
        let catalog = InMemoryCatalog::new();
        catalog.create(&entity("1", "abc")).await.unwrap();
        let err = catalog.create(&entity("2", "abc")).await.unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists(..)));
    }

    #[tokio::test]
    async fn update_with_empty_diff_is_a_no_op() {
        let catalog = InMemoryCatalog::new();
        let e = entity("1", "abc");
        catalog.create(&e).await.unwrap();
        let result = catalog.update(&e).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn update_with_changed_attributes_returns_diff() {
        let catalog = InMemoryCatalog::new();
        let mut e = entity("1", "abc");
        catalog.create(&e).await.unwrap();
        e.attributes.insert("price".into(), dictamesh_types::Value::Float(9.99));
        let (_, diff) = catalog.update(&e).await.unwrap().unwrap();
        assert_eq!(diff, vec!["price"]);
    }

    #[tokio::test]
    async fn delete_then_get_reports_not_found() {
        let catalog = InMemoryCatalog::new();
        let e = entity("1", "abc");
        catalog.create(&e).await.unwrap();
        catalog.delete(&e.id).await.unwrap();
        let err = catalog.get(&e.id, GetOptions::default()).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn relationship_to_missing_endpoint_requires_dangling_flag() {
        let catalog = InMemoryCatalog::new();
        let e = entity("1", "abc");
        catalog.create(&e).await.unwrap();
        let rel = Relationship {
            subject_id: e.id.clone(),
            subject_type: "product".into(),
            relationship_type: "belongs_to".into(),
            object_id: EntityId::new("category", "missing"),
            object_type: "category".into(),
            cardinality: dictamesh_types::Cardinality::One,
            valid_from: None,
            valid_to: None,
            attributes: Default::default(),
            dangling: false,
        };
        let err = catalog.create_relationship(&rel).await.unwrap_err();
        assert!(matches!(err, CatalogError::DanglingEndpoint(_)));

        let rel = Relationship { dangling: true, ..rel };
        catalog.create_relationship(&rel).await.unwrap();
    }

    #[tokio::test]
    async fn schema_registration_rejects_incompatible_diff() {
        let catalog = InMemoryCatalog::new();
        let v1 = Schema {
            entity_type: "product".into(),
            version: 1,
            format: dictamesh_types::SchemaFormat::JsonSchema,
            definition: serde_json::json!({"properties": {"id": {}}, "required": ["id"]}),
            registered_at: Utc::now(),
            compatibility: dictamesh_types::Compatibility::Backward,
        };
        catalog.register_schema(&v1).await.unwrap();
        let v2 = Schema {
            version: 2,
            definition: serde_json::json!({"properties": {"id": {}, "sku": {}}, "required": ["id", "sku"]}),
            ..v1.clone()
        };
        let err = catalog.register_schema(&v2).await.unwrap_err();
        assert!(matches!(err, CatalogError::IncompatibleSchema { .. }));
    }

    #[tokio::test]
    async fn search_paginates_and_filters() {
        let catalog = InMemoryCatalog::new();
        for i in 0..5 {
            catalog.create(&entity(&i.to_string(), &format!("src-{i}"))).await.unwrap();
        }
        let query = SearchQuery { entity_type: Some("product".into()), page: 0, page_size: 2, ..Default::default() };
        let results = catalog.search(&query).await.unwrap();
        assert_eq!(results.items.len(), 2);
        assert_eq!(results.total, 5);
        assert!(results.has_more());
    }
}
