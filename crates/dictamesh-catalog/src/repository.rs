//! The repository contract as a trait, so
//! `dictamesh-adapter` can be tested against an in-memory double without
//! a live Postgres instance.

use async_trait::async_trait;
use dictamesh_types::{CatalogRow, Entity, EntityId, Relationship, Schema};

use crate::error::CatalogError;
use crate::lineage::LineageEdge;
use crate::search::{SearchQuery, SearchResults};

#[derive(Clone, Copy, Debug, Default)]
pub struct GetOptions {
    /// Bypass L2/L1 caching and read the row of record directly.
    pub consistent_read: bool,
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn create(&self, entity: &Entity) -> Result<CatalogRow, CatalogError>;
    async fn get(&self, id: &EntityId, opts: GetOptions) -> Result<Entity, CatalogError>;
    /// Returns `Ok(None)` when the stored and incoming attributes are
    /// identical; otherwise the
    /// updated entity and the list of attribute keys that changed.
    async fn update(&self, entity: &Entity) -> Result<Option<(Entity, Vec<String>)>, CatalogError>;
    async fn delete(&self, id: &EntityId) -> Result<(), CatalogError>;

    async fn create_relationship(&self, rel: &Relationship) -> Result<(), CatalogError>;
    async fn get_relationships(
        &self,
        id: &EntityId,
        relationship_type: Option<&str>,
    ) -> Result<Vec<Relationship>, CatalogError>;

    async fn track_lineage(&self, edge: &LineageEdge) -> Result<(), CatalogError>;

    async fn register_schema(&self, schema: &Schema) -> Result<(), CatalogError>;
    async fn latest_schema(&self, entity_type: &str) -> Result<Option<Schema>, CatalogError>;

    async fn search(&self, query: &SearchQuery) -> Result<SearchResults<Entity>, CatalogError>;
}
