//! Typed-object relationship re-derivation, run alongside the canonical
//! per-kind resync in [`crate::adapter::K8sAdapter::sync_cluster`].
//!
//! `ResourceManager::list` hands back the canonical `Entity`, which has
//! already dropped the owner-reference/volume/env detail relationship
//! discovery needs; this module re-lists the same kinds through a typed
//! `kube::Api` so [`crate::relationships`] has the raw object to inspect.

use std::sync::Arc;

use dictamesh_types::Relationship;
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::Api;
use tracing::warn;

use crate::adapter::{composite_entity_id, K8sAdapter};
use crate::client_pool::ClusterClient;
use crate::error::K8sError;
use crate::relationships::{pod_relationships, replicaset_relationships};

/// Lists every `Pod` and `ReplicaSet` in `namespace` on `cluster`, derives
/// their relationships, and records each discovered edge through `adapter`.
/// A no-op when the adapter was configured with `enable_relationships =
/// false`.
pub async fn resync_relationships(
    adapter: &Arc<K8sAdapter>,
    cluster: &ClusterClient,
    namespace: &str,
) -> Result<usize, K8sError> {
    if !adapter.relationships_enabled() {
        return Ok(0);
    }

    let mut discovered = Vec::new();

    let pods: Api<Pod> = Api::namespaced(cluster.client.clone(), namespace);
    match pods.list(&ListParams::default()).await {
        Ok(list) => {
            for pod in &list.items {
                let Some(name) = pod.metadata.name.as_deref() else { continue };
                let pod_id = composite_entity_id("kubernetes.pod", &cluster.config.id, Some(namespace), name);
                discovered.extend(pod_relationships(&cluster.config.id, namespace, &pod_id, pod));
            }
        }
        Err(err) => warn!(cluster = %cluster.config.id, error = %err, "pod relationship resync: list failed"),
    }

    let replicasets: Api<ReplicaSet> = Api::namespaced(cluster.client.clone(), namespace);
    match replicasets.list(&ListParams::default()).await {
        Ok(list) => {
            for rs in &list.items {
                let Some(name) = rs.metadata.name.as_deref() else { continue };
                let rs_id = composite_entity_id("kubernetes.replicaset", &cluster.config.id, Some(namespace), name);
                discovered.extend(replicaset_relationships(&cluster.config.id, namespace, &rs_id, rs));
            }
        }
        Err(err) => warn!(cluster = %cluster.config.id, error = %err, "replicaset relationship resync: list failed"),
    }

    let count = discovered.len();
    record_all(adapter, discovered).await;
    Ok(count)
}

async fn record_all(adapter: &Arc<K8sAdapter>, rels: Vec<Relationship>) {
    adapter.record_discovered(rels).await;
}
