//! The Kubernetes multi-cluster adapter: ties the cluster registry,
//! resource managers, and relationship discovery into the same
//! Initialize/Start/Stop/Health surface every other adapter exposes.

use std::sync::Arc;

use dictamesh_catalog::CatalogRepository;
use dictamesh_events::Producer;
use dictamesh_types::{Entity, EntityId, EventBuilder, EventType, Relationship};
use parking_lot::RwLock as SyncRwLock;
use tokio::sync::watch;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::client_pool::{ClusterClient, ClusterRegistry};
use crate::config::{ClusterConfig, K8sAdapterConfig};
use crate::error::K8sError;
use crate::relationships;
use crate::resource::{managers_for, ResourceManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// `healthy_clusters / total_clusters` and the derived status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClusterHealth {
    pub status: HealthStatus,
    pub healthy_clusters: usize,
    pub total_clusters: usize,
}

impl ClusterHealth {
    fn from_counts(healthy: usize, total: usize) -> Self {
        let status = if total == 0 || healthy == 0 {
            HealthStatus::Unhealthy
        } else if healthy == total {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        Self { status, healthy_clusters: healthy, total_clusters: total }
    }
}

struct RunningResync {
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

/// The process-local Kubernetes adapter instance: a pool of connected
/// clusters plus the managers and relationship rules used to mirror their
/// resources into the catalog.
pub struct K8sAdapter {
    config: K8sAdapterConfig,
    registry: Arc<ClusterRegistry>,
    managers: Vec<Box<dyn ResourceManager>>,
    catalog: Arc<dyn CatalogRepository>,
    producer: Arc<dyn Producer>,
    resync: tokio::sync::Mutex<Option<RunningResync>>,
    name: SyncRwLock<String>,
}

impl K8sAdapter {
    pub fn new(config: K8sAdapterConfig, catalog: Arc<dyn CatalogRepository>, producer: Arc<dyn Producer>) -> Self {
        let managers = managers_for(&config.watch_resources);
        Self {
            config,
            registry: Arc::new(ClusterRegistry::new()),
            managers,
            catalog,
            producer,
            resync: tokio::sync::Mutex::new(None),
            name: SyncRwLock::new("dictamesh-k8s".to_string()),
        }
    }

    pub fn registry(&self) -> &Arc<ClusterRegistry> {
        &self.registry
    }

    /// Connects to every configured cluster. A single cluster failing to
    /// connect does not fail the call; the adapter only errors out when
    /// every cluster is unreachable.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<(), K8sError> {
        if self.config.clusters.is_empty() {
            return Ok(());
        }

        let mut connected = 0usize;
        for cluster_cfg in &self.config.clusters {
            match self.add_cluster(cluster_cfg.clone()).await {
                Ok(()) => connected += 1,
                Err(err) => warn!(cluster = %cluster_cfg.id, error = %err, "cluster connect failed during initialize"),
            }
        }

        if connected == 0 {
            return Err(K8sError::ClusterUnreachable("no configured cluster was reachable".to_string()));
        }
        info!(connected, total = self.config.clusters.len(), "kubernetes adapter initialized");
        Ok(())
    }

    /// Connects to `cluster_cfg` and adds it to the registry. Safe to call
    /// after `initialize` to grow the fleet without a restart.
    pub async fn add_cluster(&self, cluster_cfg: ClusterConfig) -> Result<(), K8sError> {
        let client = ClusterClient::connect(cluster_cfg).await?;
        self.registry.insert(client);
        Ok(())
    }

    pub fn remove_cluster(&self, cluster_id: &str) -> Option<Arc<ClusterClient>> {
        self.registry.remove(cluster_id)
    }

    pub fn list_clusters(&self) -> Vec<String> {
        self.registry.ids()
    }

    pub async fn health(&self) -> ClusterHealth {
        let clusters = self.registry.all();
        let total = clusters.len();
        let mut healthy = 0usize;
        for cluster in &clusters {
            if cluster.client.apiserver_version().await.is_ok() {
                healthy += 1;
            }
        }
        ClusterHealth::from_counts(healthy, total)
    }

    /// Lists every watched resource kind across `cluster_id`, converts each
    /// item to its canonical `Entity`, upserts it into the catalog, and (if
    /// `enable_relationships`) discovers and records its relationships.
    #[instrument(skip(self), fields(cluster = %cluster_id))]
    pub async fn sync_cluster(&self, cluster_id: &str) -> Result<usize, K8sError> {
        let cluster = self.registry.get(cluster_id).ok_or_else(|| K8sError::UnknownCluster(cluster_id.to_string()))?;
        let mut synced = 0usize;

        for manager in &self.managers {
            let namespace = if manager.namespaced() { Some(self.config.default_namespace.as_str()) } else { None };
            let entities = match manager.list(&cluster, namespace).await {
                Ok(entities) => entities,
                Err(err) => {
                    warn!(kind = manager.resource_kind(), error = %err, "resource manager list failed");
                    continue;
                }
            };

            for entity in entities {
                self.upsert_entity(&entity).await?;
                synced += 1;
            }
        }

        Ok(synced)
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<(), K8sError> {
        match self.catalog.get(&entity.id, dictamesh_catalog::GetOptions { consistent_read: true }).await {
            Ok(_) => {
                if let Some((updated, changed_fields)) =
                    self.catalog.update(entity).await.map_err(|e| K8sError::Internal(e.into()))?
                {
                    self.emit_entity_event(EventType::EntityUpdated, &updated, Some(changed_fields)).await;
                }
            }
            Err(_) => {
                self.catalog.create(entity).await.map_err(|e| K8sError::Internal(e.into()))?;
                self.emit_entity_event(EventType::EntityCreated, entity, None).await;
            }
        }
        Ok(())
    }

    /// Whether relationship discovery is enabled for this adapter; consulted
    /// by [`crate::resync`] before deriving edges off typed pod/replicaset
    /// objects (the `ResourceManager` trait only hands back the canonical
    /// `Entity`, which has already lost the owner-reference/volume detail
    /// relationship discovery needs).
    pub fn relationships_enabled(&self) -> bool {
        self.config.enable_relationships
    }

    pub fn default_namespace(&self) -> &str {
        &self.config.default_namespace
    }

    async fn record_relationship(&self, rel: Relationship) -> Result<(), K8sError> {
        match self.catalog.create_relationship(&rel).await {
            Ok(()) => {
                let event = EventBuilder::new(self.name.read().clone())
                    .entity(rel.subject_id.clone())
                    .payload(serde_json::to_value(&rel).unwrap_or(serde_json::Value::Null))
                    .build(EventType::RelationshipCreated, Uuid::new_v4(), chrono::Utc::now())
                    .map_err(|e| K8sError::Internal(anyhow::anyhow!(e.to_string())))?;
                self.producer.publish(event).await.map_err(|e| K8sError::Internal(e.into()))?;
                Ok(())
            }
            Err(err) => Err(K8sError::Internal(err.into())),
        }
    }

    /// Discovers and records every relationship `relationships` derives for
    /// `entity`, used by the typed-object sync paths that have a concrete
    /// `Pod`/`ReplicaSet` in hand rather than just its canonical form.
    pub async fn record_discovered(&self, rels: Vec<Relationship>) {
        for rel in rels {
            if let Err(err) = self.record_relationship(rel).await {
                warn!(error = %err, "failed to record discovered relationship");
            }
        }
    }

    async fn emit_entity_event(&self, event_type: EventType, entity: &Entity, changed_fields: Option<Vec<String>>) {
        let mut payload = serde_json::to_value(entity).unwrap_or(serde_json::Value::Null);
        if let (Some(fields), serde_json::Value::Object(ref mut map)) = (changed_fields, &mut payload) {
            map.insert("changed_fields".to_string(), serde_json::json!(fields));
        }
        let built = EventBuilder::new(self.name.read().clone())
            .entity(entity.id.clone())
            .payload(payload)
            .build(event_type, Uuid::new_v4(), chrono::Utc::now());
        match built {
            Ok(event) => {
                if let Err(err) = self.producer.publish(event).await {
                    warn!(error = %err, "failed to publish kubernetes entity event");
                }
            }
            Err(err) => warn!(error = %err, "failed to build kubernetes entity event"),
        }
    }

    /// Starts the periodic re-list resync loop: every `resync_period`,
    /// every cluster's watched resources are
    /// re-listed so catalog state converges with the observed cluster state
    /// even if an in-between watch event was missed.
    pub async fn start_resync(self: &Arc<Self>) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let adapter = self.clone();
        let period = self.config.resync_period;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
                for cluster_id in adapter.list_clusters() {
                    if let Err(err) = adapter.sync_cluster(&cluster_id).await {
                        warn!(cluster = %cluster_id, error = %err, "resync failed");
                        continue;
                    }
                    if let Some(cluster) = adapter.registry().get(&cluster_id) {
                        let namespace = adapter.default_namespace().to_string();
                        if let Err(err) = crate::resync::resync_relationships(&adapter, &cluster, &namespace).await {
                            warn!(cluster = %cluster_id, error = %err, "relationship resync failed");
                        }
                    }
                }
            }
        });

        *self.resync.lock().await = Some(RunningResync { shutdown: shutdown_tx, handle });
    }

    pub async fn stop_resync(&self) {
        if let Some(resync) = self.resync.lock().await.take() {
            let _ = resync.shutdown.send(true);
            let _ = resync.handle.await;
        }
    }
}

/// Resolves a composite `{cluster}:{namespace}:{name}` id for use outside
/// the resource-manager macros (e.g. when wiring relationship discovery
/// against a typed object fetched through a `kube::Api` directly).
pub fn composite_entity_id(entity_type: &str, cluster: &str, namespace: Option<&str>, name: &str) -> EntityId {
    match namespace {
        Some(ns) => EntityId::new(entity_type, &format!("{cluster}:{ns}:{name}")),
        None => EntityId::new(entity_type, &format!("{cluster}:{name}")),
    }
}

pub use relationships::{pod_relationships, replicaset_relationships};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_health_is_healthy_with_zero_unreachable() {
        let health = ClusterHealth::from_counts(2, 2);
        assert_eq!(health.status, HealthStatus::Healthy);
    }

    #[test]
    fn cluster_health_is_degraded_when_some_but_not_all_unreachable() {
        let health = ClusterHealth::from_counts(1, 2);
        assert_eq!(health.status, HealthStatus::Degraded);
    }

    #[test]
    fn cluster_health_is_unhealthy_when_all_unreachable() {
        let health = ClusterHealth::from_counts(0, 2);
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn composite_entity_id_matches_namespaced_convention() {
        let id = composite_entity_id("kubernetes.pod", "prod", Some("default"), "web-1");
        assert_eq!(id.as_str(), "kubernetes.pod:prod:default:web-1");
    }
}
