//! The adapter runtime: the process-local instance that owns
//! a connector, transformer, validator, catalog handle, event producer,
//! multi-level cache, resilience policy, and metadata descriptor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dictamesh_cache::key::{entity_key, list_key, list_prefix};
use dictamesh_cache::MultiLevelCache;
use dictamesh_catalog::{CatalogRepository, GetOptions};
use dictamesh_connector::{Connector, FetchRequest, Pagination, Record};
use dictamesh_events::Producer;
use dictamesh_resilience::Policy;
use dictamesh_types::{
    AdapterAction, AdapterState, Entity, EntityId, EventBuilder, EventType, MeshError, Schema,
};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::AdapterConfig;
use crate::singleflight::{SharedSingleFlight, SingleFlight};
use crate::subgraph::{sdl_fragment, SubgraphRegistry};
use crate::transform::{assemble_entity, Transform};
use crate::validator::Validator;
use dictamesh_events::IdempotencyStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub connector: bool,
    pub catalog: bool,
    /// The cache and event bus have no liveness probe exposed through
    /// their current trait surfaces; they are reported healthy unless the
    /// adapter has independently observed a failure talking to them.
    pub cache: bool,
    pub event_bus: bool,
}

impl HealthReport {
    fn aggregate(connector: bool, catalog: bool, cache: bool, event_bus: bool) -> Self {
        let healthy_count = [connector, catalog, cache, event_bus].iter().filter(|&&b| b).count();
        let status = match healthy_count {
            4 => HealthStatus::Healthy,
            0 => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };
        Self { status, connector, catalog, cache, event_bus }
    }
}

/// The result of `GetEntity`/`ListEntities`/`SearchEntities`: the entity
/// plus whether it was served from a stale cache entry during an open
/// circuit.
#[derive(Debug, Clone)]
pub struct EntityLookup {
    pub entity: Entity,
    pub stale: bool,
}

struct RunningWorker {
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

/// The process-local adapter instance.
pub struct Adapter {
    config: AdapterConfig,
    connector: Arc<dyn Connector>,
    transforms: HashMap<String, Arc<dyn Transform>>,
    validator: Validator,
    catalog: Arc<dyn CatalogRepository>,
    producer: Arc<dyn Producer>,
    cache: Arc<MultiLevelCache>,
    policy: Policy,
    subgraph: Arc<dyn SubgraphRegistry>,
    state: SyncMutex<AdapterState>,
    worker: AsyncMutex<Option<RunningWorker>>,
    inflight: SharedSingleFlight<Entity>,
    webhook_idempotency: IdempotencyStore,
    schema_versions: SyncMutex<HashMap<String, u32>>,
}

impl Adapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AdapterConfig,
        connector: Arc<dyn Connector>,
        transforms: HashMap<String, Arc<dyn Transform>>,
        catalog: Arc<dyn CatalogRepository>,
        producer: Arc<dyn Producer>,
        cache: Arc<MultiLevelCache>,
        policy: Policy,
        subgraph: Arc<dyn SubgraphRegistry>,
    ) -> Self {
        Self {
            config,
            connector,
            transforms,
            validator: Validator::new(),
            catalog,
            producer,
            cache,
            policy,
            subgraph,
            state: SyncMutex::new(AdapterState::Uninitialized),
            worker: AsyncMutex::new(None),
            inflight: Arc::new(SingleFlight::new()),
            webhook_idempotency: IdempotencyStore::new(Duration::from_secs(3600)),
            schema_versions: SyncMutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn state(&self) -> AdapterState {
        *self.state.lock()
    }

    fn apply_action(&self, action: AdapterAction) -> Result<AdapterState, MeshError> {
        let mut state = self.state.lock();
        let next = state
            .apply(action)
            .map_err(|e| MeshError::invalid_state(e.to_string()))?;
        *state = next;
        Ok(next)
    }

    /// Connects the connector, registers `schemas` with the catalog and
    /// the local validator, and registers each entity type's sub-schema
    /// with the (possibly no-op) subgraph collaborator. Idempotent: a
    /// second call re-registers the same schemas without error.
    #[instrument(skip(self, schemas), fields(adapter = %self.config.name))]
    pub async fn initialize(&self, schemas: Vec<Schema>) -> Result<(), MeshError> {
        if self.state() == AdapterState::Uninitialized {
            self.apply_action(AdapterAction::Initialize)?;
        }

        self.connector.connect().await.map_err(MeshError::from)?;

        for schema in &schemas {
            self.catalog.register_schema(schema).await.map_err(MeshError::from)?;
            self.validator.register(schema)?;
            self.schema_versions.lock().insert(schema.entity_type.clone(), schema.version);

            let sdl = sdl_fragment(&schema.entity_type, &["id"]);
            self.subgraph.register(&schema.entity_type, &sdl).await?;
        }

        info!(entity_types = ?self.config.entity_types, "adapter initialized");
        Ok(())
    }

    /// Starts a background sync worker matching the configured sync mode.
    /// Webhook-mode adapters have no background worker; the caller is
    /// expected to mount [`crate::webhook::handle`] on an HTTP server.
    pub async fn start(self: &Arc<Self>) -> Result<(), MeshError> {
        self.apply_action(AdapterAction::Start)?;

        use crate::config::SyncMode;
        if self.config.sync.mode == SyncMode::Webhook {
            info!("webhook-mode adapter started with no background worker");
            return Ok(());
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let adapter = self.clone();
        let resync_interval = self
            .config
            .slo
            .freshness
            .unwrap_or(Duration::from_secs(300));
        let resource = self
            .config
            .entity_types
            .first()
            .cloned()
            .unwrap_or_else(|| self.config.domain.clone());

        let handle = tokio::spawn(async move {
            loop {
                let outcome = match adapter.config.sync.mode {
                    SyncMode::Full => crate::sync::full_sync(&adapter, &resource).await,
                    SyncMode::Incremental => {
                        let since = adapter.config.sync.since.unwrap_or_else(chrono::Utc::now);
                        crate::sync::incremental_sync(&adapter, &resource, since).await
                    }
                    SyncMode::Webhook => unreachable!("handled above"),
                };
                if let Err(err) = outcome {
                    warn!(error = %err, "background sync iteration failed");
                }

                tokio::select! {
                    _ = tokio::time::sleep(resync_interval) => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
            }
        });

        *self.worker.lock().await = Some(RunningWorker { shutdown: shutdown_tx, handle });
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), MeshError> {
        self.apply_action(AdapterAction::Stop)?;
        if let Some(worker) = self.worker.lock().await.take() {
            let _ = worker.shutdown.send(true);
            let _ = worker.handle.await;
        }
        self.connector.disconnect().await.map_err(MeshError::from)?;
        self.apply_action(AdapterAction::Drained)?;
        Ok(())
    }

    pub async fn health(&self) -> HealthReport {
        let connector_ok = self.connector.health_check().await.is_ok();
        let catalog_ok = self
            .catalog
            .search(&dictamesh_catalog::SearchQuery { page: 0, page_size: 1, ..Default::default() })
            .await
            .is_ok();

        let report = HealthReport::aggregate(connector_ok, catalog_ok, true, true);
        if report.status == HealthStatus::Unhealthy {
            let _ = self.apply_action(AdapterAction::HealthCheckFailed);
        }
        report
    }

    fn schema_version(&self, entity_type: &str) -> u32 {
        self.schema_versions.lock().get(entity_type).copied().unwrap_or(1)
    }

    fn transform_for(&self, entity_type: &str) -> Result<Arc<dyn Transform>, MeshError> {
        self.transforms
            .get(entity_type)
            .cloned()
            .ok_or_else(|| MeshError::invalid_state(format!("no transform registered for entity type {entity_type}")))
    }

    /// `cache -> catalog (hint) -> connector (source fetch) -> transform
    /// -> validate -> register-if-new -> cache -> return`.
    /// Concurrent calls for the same `id` share one in-flight source
    /// fetch via [`SingleFlight`].
    #[instrument(skip(self), fields(entity_id = %id))]
    pub async fn get_entity(&self, entity_type: &str, id: &EntityId) -> Result<EntityLookup, MeshError> {
        let cache_key = entity_key(&self.config.name, id.as_str());

        if let (Some(entity), _) = self.cache.get::<Entity>(&cache_key).await? {
            return Ok(EntityLookup { entity, stale: false });
        }

        if let Ok(entity) = self.catalog.get(id, GetOptions::default()).await {
            self.cache.set(&cache_key, &entity, None).await?;
            return Ok(EntityLookup { entity, stale: false });
        }

        let id_str = id.as_str().to_string();
        let fetch_result = self
            .inflight
            .run(&cache_key, || self.fetch_and_register(entity_type, &id_str))
            .await;

        match fetch_result {
            Ok(entity) => Ok(EntityLookup { entity, stale: false }),
            Err(err) if err.kind == dictamesh_types::ErrorKind::Unavailable => {
                if let (Some(entity), _) = self.cache.get::<Entity>(&cache_key).await? {
                    warn!(entity_id = %id, "serving stale cache entry while circuit is open");
                    return Ok(EntityLookup { entity, stale: true });
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn fetch_and_register(&self, entity_type: &str, id: &str) -> Result<Entity, MeshError> {
        let connector = self.connector.clone();
        let resource = entity_type.to_string();
        let lookup_id = id.to_string();
        let record = self
            .policy
            .execute(move |_attempt| {
                let connector = connector.clone();
                let resource = resource.clone();
                let lookup_id = lookup_id.clone();
                async move {
                    let mut request = FetchRequest::new(resource, Pagination::first_page(1));
                    request.filter.insert("id".to_string(), serde_json::json!(lookup_id));
                    let page = connector.fetch(&request).await.map_err(MeshError::from)?;
                    page.records
                        .into_iter()
                        .next()
                        .ok_or_else(|| MeshError::not_found(format!("no record for id {lookup_id}")))
                }
            })
            .await?;

        self.upsert_from_record(entity_type, &record).await
    }

    /// `fetch existing -> if absent Create; if present and diff non-empty
    /// Update; if diff empty no-op`.
    pub async fn idempotent_upsert(&self, entity_type: &str, record: &Record) -> Result<Entity, MeshError> {
        self.upsert_from_record(entity_type, record).await
    }

    async fn upsert_from_record(&self, entity_type: &str, record: &Record) -> Result<Entity, MeshError> {
        let transform = self.transform_for(entity_type)?;
        let transformed = transform.transform(record, &self.config.domain, &self.config.connector_name)?;
        let schema_version = self.schema_version(entity_type);
        self.validator.validate(entity_type, schema_version, &transformed.attributes)?;

        let entity = assemble_entity(
            entity_type,
            &self.config.domain,
            &self.config.connector_name,
            &record.id,
            record,
            transformed,
            schema_version,
        );

        let stored = match self.catalog.get(&entity.id, GetOptions { consistent_read: true }).await {
            Ok(_) => match self.catalog.update(&entity).await.map_err(MeshError::from)? {
                Some((updated, changed_fields)) => {
                    self.emit_entity_event(EventType::EntityUpdated, &updated, Some(changed_fields)).await?;
                    updated
                }
                None => entity,
            },
            Err(_) => {
                self.catalog.create(&entity).await.map_err(MeshError::from)?;
                self.emit_entity_event(EventType::EntityCreated, &entity, None).await?;
                entity
            }
        };

        let cache_key = entity_key(&self.config.name, stored.id.as_str());
        self.cache.delete(&cache_key).await?;
        self.cache.set(&cache_key, &stored, None).await?;
        self.cache.delete_pattern(&list_prefix(entity_type)).await?;

        Ok(stored)
    }

    pub async fn delete_by_source_id(&self, entity_type: &str, source_id: &str) -> Result<(), MeshError> {
        let id = EntityId::new(entity_type, source_id);
        self.catalog.delete(&id).await.map_err(MeshError::from)?;
        let cache_key = entity_key(&self.config.name, id.as_str());
        self.cache.delete(&cache_key).await?;
        self.cache.delete_pattern(&list_prefix(entity_type)).await?;

        let event = EventBuilder::new(self.config.name.clone())
            .entity(id)
            .payload(serde_json::json!({}))
            .build(EventType::EntityDeleted, Uuid::new_v4(), chrono::Utc::now())
            .map_err(|e| MeshError::validation(e.to_string()))?;
        self.producer.publish(event).await.map_err(MeshError::from)?;
        Ok(())
    }

    /// Delegates to the connector's list, then transforms and validates
    /// each record; a record that fails either step is logged and
    /// skipped rather than failing the whole batch.
    pub async fn list_entities(&self, entity_type: &str, request: &FetchRequest) -> Result<Vec<Entity>, MeshError> {
        let list_cache_key = list_key(entity_type, &format!("{:?}", request.pagination));
        if let (Some(cached), _) = self.cache.get::<Vec<Entity>>(&list_cache_key).await? {
            return Ok(cached);
        }

        let page = self.connector.fetch(request).await.map_err(MeshError::from)?;
        let mut entities = Vec::with_capacity(page.records.len());
        for record in &page.records {
            match self.upsert_from_record(entity_type, record).await {
                Ok(entity) => entities.push(entity),
                Err(err) => warn!(record_id = %record.id, error = %err, "list_entities: record failed, skipping"),
            }
        }

        self.cache.set(&list_cache_key, &entities, None).await?;
        Ok(entities)
    }

    pub async fn search_entities(
        &self,
        query: &dictamesh_catalog::SearchQuery,
    ) -> Result<dictamesh_catalog::SearchResults<Entity>, MeshError> {
        self.catalog.search(query).await.map_err(MeshError::from)
    }

    pub fn webhook_secret(&self) -> Option<String> {
        self.config.webhook.secret.clone()
    }

    pub fn webhook_already_processed(&self, event_id: Uuid) -> bool {
        self.webhook_idempotency.already_processed(event_id)
    }

    pub fn webhook_mark_processed(&self, event_id: Uuid) {
        self.webhook_idempotency.mark_processed(event_id);
    }

    pub async fn emit_sync_event(&self, event_type: EventType, payload: serde_json::Value) {
        let event = EventBuilder::new(self.config.name.clone())
            .entity(EntityId::new(&self.config.domain, &self.config.name))
            .payload(payload)
            .build(event_type, Uuid::new_v4(), chrono::Utc::now());
        match event {
            Ok(event) => {
                if let Err(err) = self.producer.publish(event).await {
                    warn!(error = %err, "failed to publish sync lifecycle event");
                }
            }
            Err(err) => warn!(error = %err, "failed to build sync lifecycle event"),
        }
    }

    async fn emit_entity_event(
        &self,
        event_type: EventType,
        entity: &Entity,
        changed_fields: Option<Vec<String>>,
    ) -> Result<(), MeshError> {
        let mut payload = serde_json::to_value(entity).unwrap_or(serde_json::Value::Null);
        if let (Some(fields), serde_json::Value::Object(ref mut map)) = (changed_fields, &mut payload) {
            map.insert("changed_fields".to_string(), serde_json::json!(fields));
        }
        let event = EventBuilder::new(self.config.name.clone())
            .entity(entity.id.clone())
            .payload(payload)
            .build(event_type, Uuid::new_v4(), chrono::Utc::now())
            .map_err(|e| MeshError::validation(e.to_string()))?;
        self.producer.publish(event).await.map_err(MeshError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SloConfig, SyncConfig, SyncMode, WebhookConfig};
    use crate::subgraph::NoopSubgraphRegistry;
    use crate::transform::PassthroughTransform;
    use async_trait::async_trait;
    use dictamesh_cache::CacheConfig;
    use dictamesh_catalog::InMemoryCatalog;
    use dictamesh_connector::{Capabilities, ConnectorError, FetchPage};
    use dictamesh_resilience::PolicyConfig;
    use std::collections::HashMap as StdHashMap;

    struct FakeConnector {
        records: Vec<Record>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self) -> Result<(), ConnectorError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), ConnectorError> {
            Ok(())
        }
        async fn health_check(&self) -> Result<(), ConnectorError> {
            Ok(())
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
        async fn fetch(&self, req: &FetchRequest) -> Result<FetchPage, ConnectorError> {
            let records = if let Some(id) = req.filter.get("id").and_then(|v| v.as_str()) {
                self.records.iter().filter(|r| r.id == id).cloned().collect()
            } else {
                self.records.clone()
            };
            Ok(FetchPage { records, total: None, next_cursor: None })
        }
    }

    struct FakeProducer;

    #[async_trait]
    impl Producer for FakeProducer {
        async fn publish(&self, _event: dictamesh_types::Event) -> Result<(), dictamesh_events::EventError> {
            Ok(())
        }
        async fn publish_batch(&self, _events: Vec<dictamesh_types::Event>) -> Result<(), dictamesh_events::EventError> {
            Ok(())
        }
    }

    fn product_schema() -> Schema {
        Schema {
            entity_type: "product".into(),
            version: 1,
            format: dictamesh_types::SchemaFormat::JsonSchema,
            definition: serde_json::json!({"type": "object"}),
            registered_at: chrono::Utc::now(),
            compatibility: Default::default(),
        }
    }

    fn test_adapter(records: Vec<Record>) -> Arc<Adapter> {
        let mut transforms: HashMap<String, Arc<dyn Transform>> = HashMap::new();
        transforms.insert("product".to_string(), Arc::new(PassthroughTransform::new("product")));

        Arc::new(Adapter::new(
            AdapterConfig {
                name: "test-adapter".into(),
                version: "1.0.0".into(),
                domain: "catalog".into(),
                entity_types: vec!["product".into()],
                slo: SloConfig::default(),
                sync: SyncConfig { mode: SyncMode::Full, ..Default::default() },
                webhook: WebhookConfig::default(),
                connector_name: "rest-catalog".into(),
            },
            Arc::new(FakeConnector { records }),
            transforms,
            Arc::new(InMemoryCatalog::new()),
            Arc::new(FakeProducer),
            Arc::new(MultiLevelCache::l1_only(CacheConfig::default())),
            Policy::new(PolicyConfig::default()),
            Arc::new(NoopSubgraphRegistry),
        ))
    }

    fn record(id: &str) -> Record {
        let mut data = StdHashMap::new();
        data.insert("name".to_string(), serde_json::json!("Widget"));
        Record { id: id.to_string(), data, metadata: StdHashMap::new(), observed_at: chrono::Utc::now() }
    }

    #[tokio::test]
    async fn get_entity_creates_on_first_fetch_and_caches() {
        let adapter = test_adapter(vec![record("123")]);
        adapter.initialize(vec![product_schema()]).await.unwrap();

        let lookup = adapter.get_entity("product", &EntityId::new("product", "123")).await.unwrap();
        assert_eq!(lookup.entity.id.as_str(), "product:123");
        assert!(!lookup.stale);

        let (cached, _) = adapter
            .cache
            .get::<Entity>(&entity_key("test-adapter", "product:123"))
            .await
            .unwrap();
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn idempotent_upsert_is_a_no_op_on_unchanged_record() {
        let adapter = test_adapter(vec![]);
        adapter.initialize(vec![product_schema()]).await.unwrap();

        let r = record("123");
        let first = adapter.idempotent_upsert("product", &r).await.unwrap();
        let second = adapter.idempotent_upsert("product", &r).await.unwrap();
        assert_eq!(first.attributes, second.attributes);
    }

    #[tokio::test]
    async fn health_reports_healthy_when_all_dependencies_ok() {
        let adapter = test_adapter(vec![]);
        adapter.initialize(vec![product_schema()]).await.unwrap();
        let report = adapter.health().await;
        assert_eq!(report.status, HealthStatus::Healthy);
    }
}
