//! One manager per Kubernetes resource kind. Each converts typed `k8s-openapi` objects into the
//! canonical `Entity`, with composite id `{cluster}:{namespace}:{name}`
//! and `type = kubernetes.{kind}`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use dictamesh_types::{Entity, EntityId, EntityLifecycle, EntityMetadata, Value};
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::ListParams;
use kube::{Api, Resource as KubeResource};

use crate::client_pool::ClusterClient;
use crate::error::K8sError;
use crate::relationships;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupVersionKind {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
}

#[async_trait]
pub trait ResourceManager: Send + Sync {
    fn resource_kind(&self) -> &'static str;
    fn group_version_kind(&self) -> GroupVersionKind;
    fn namespaced(&self) -> bool;

    async fn get(&self, cluster: &ClusterClient, namespace: Option<&str>, name: &str) -> Result<Entity, K8sError>;
    async fn list(&self, cluster: &ClusterClient, namespace: Option<&str>) -> Result<Vec<Entity>, K8sError>;
    async fn delete(&self, cluster: &ClusterClient, namespace: Option<&str>, name: &str) -> Result<(), K8sError>;
}

fn composite_id(entity_type: &str, cluster: &str, namespace: Option<&str>, name: &str) -> EntityId {
    let local = match namespace {
        Some(ns) => format!("{cluster}:{ns}:{name}"),
        None => format!("{cluster}:{name}"),
    };
    EntityId::new(entity_type, &local)
}

fn labels_and_annotations(meta: &ObjectMeta) -> (Value, Value) {
    let labels: BTreeMap<String, Value> = meta
        .labels
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let annotations: BTreeMap<String, Value> = meta
        .annotations
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    (Value::Object(labels), Value::Object(annotations))
}

fn base_metadata(cluster_id: &str, meta: &ObjectMeta) -> EntityMetadata {
    let now = Utc::now();
    EntityMetadata {
        source_system: format!("kubernetes:{cluster_id}"),
        source_id: meta.uid.clone().unwrap_or_default(),
        created_at: now,
        updated_at: now,
        cache_control: Default::default(),
        slo: Default::default(),
        contains_pii: false,
    }
}

fn not_found(kind: &str, name: &str) -> K8sError {
    K8sError::NotFound(format!("{kind} {name}"))
}

macro_rules! resource_manager {
    ($manager:ident, $kind_str:literal, $k8s_ty:ty, $group:literal, $version:literal, $namespaced:expr, $to_entity:expr) => {
        pub struct $manager;

        #[async_trait]
        impl ResourceManager for $manager {
            fn resource_kind(&self) -> &'static str {
                $kind_str
            }

            fn group_version_kind(&self) -> GroupVersionKind {
                GroupVersionKind { group: $group, version: $version, kind: <$k8s_ty as KubeResource>::KIND }
            }

            fn namespaced(&self) -> bool {
                $namespaced
            }

            async fn get(&self, cluster: &ClusterClient, namespace: Option<&str>, name: &str) -> Result<Entity, K8sError> {
                let api: Api<$k8s_ty> = scoped_api(cluster, namespace);
                let obj = api.get(name).await.map_err(|e| map_get_err(e, $kind_str, name))?;
                Ok(($to_entity)(&cluster.config.id, namespace, &obj))
            }

            async fn list(&self, cluster: &ClusterClient, namespace: Option<&str>) -> Result<Vec<Entity>, K8sError> {
                let api: Api<$k8s_ty> = scoped_api(cluster, namespace);
                let list = api.list(&ListParams::default()).await.map_err(K8sError::Kube)?;
                Ok(list.items.iter().map(|obj| ($to_entity)(&cluster.config.id, namespace, obj)).collect())
            }

            async fn delete(&self, cluster: &ClusterClient, namespace: Option<&str>, name: &str) -> Result<(), K8sError> {
                let api: Api<$k8s_ty> = scoped_api(cluster, namespace);
                api.delete(name, &Default::default()).await.map_err(|e| map_get_err(e, $kind_str, name))?;
                Ok(())
            }
        }
    };
}

/// `namespace = None` lists/watches across all namespaces; a `get`/`delete`
/// call with no namespace against a namespaced kind is a caller error, same
/// as calling the bare Kubernetes API without one.
fn scoped_api<K>(cluster: &ClusterClient, namespace: Option<&str>) -> Api<K>
where
    K: KubeResource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + std::fmt::Debug,
    <K as kube::Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(cluster.client.clone(), ns),
        None => Api::all(cluster.client.clone()),
    }
}

fn map_get_err(err: kube::Error, kind: &str, name: &str) -> K8sError {
    match &err {
        kube::Error::Api(resp) if resp.code == 404 => not_found(kind, name),
        kube::Error::Api(resp) if resp.code == 403 => K8sError::Forbidden(format!("{kind} {name}: {}", resp.message)),
        _ => K8sError::Kube(err),
    }
}

fn pod_to_entity(cluster_id: &str, namespace: Option<&str>, pod: &Pod) -> Entity {
    let ns = namespace.or(pod.metadata.namespace.as_deref()).unwrap_or("default");
    let name = pod.metadata.name.clone().unwrap_or_default();
    let id = composite_id("kubernetes.pod", cluster_id, Some(ns), &name);

    let (labels, annotations) = labels_and_annotations(&pod.metadata);
    let mut attrs = BTreeMap::new();
    attrs.insert("labels".to_string(), labels);
    attrs.insert("annotations".to_string(), annotations);
    attrs.insert("namespace".to_string(), Value::String(ns.to_string()));
    if let Some(status) = pod.status.as_ref() {
        if let Some(phase) = status.phase.as_ref() {
            attrs.insert("phase".to_string(), Value::String(phase.clone()));
        }
    }
    if let Some(spec) = pod.spec.as_ref() {
        if let Some(node_name) = spec.node_name.as_ref() {
            attrs.insert("node_name".to_string(), Value::String(node_name.clone()));
        }
    }

    let relationships = relationships::pod_relationships(cluster_id, ns, &id, pod);

    Entity {
        id,
        entity_type: "kubernetes.pod".to_string(),
        domain: "kubernetes".to_string(),
        attributes: attrs,
        relationships,
        metadata: base_metadata(cluster_id, &pod.metadata),
        schema_version: 1,
        lifecycle: EntityLifecycle::Active,
    }
}

fn deployment_to_entity(cluster_id: &str, namespace: Option<&str>, dep: &Deployment) -> Entity {
    let ns = namespace.or(dep.metadata.namespace.as_deref()).unwrap_or("default");
    let name = dep.metadata.name.clone().unwrap_or_default();
    let id = composite_id("kubernetes.deployment", cluster_id, Some(ns), &name);

    let (labels, annotations) = labels_and_annotations(&dep.metadata);
    let mut attrs = BTreeMap::new();
    attrs.insert("labels".to_string(), labels);
    attrs.insert("annotations".to_string(), annotations);
    attrs.insert("namespace".to_string(), Value::String(ns.to_string()));
    if let Some(spec) = dep.spec.as_ref() {
        if let Some(replicas) = spec.replicas {
            attrs.insert("replicas".to_string(), Value::Int(replicas as i64));
        }
        if let Some(strategy) = spec.strategy.as_ref() {
            if let Some(kind) = strategy.type_.as_ref() {
                attrs.insert("strategy".to_string(), Value::String(kind.clone()));
            }
        }
    }
    if let Some(status) = dep.status.as_ref() {
        if let Some(available) = status.available_replicas {
            attrs.insert("available_replicas".to_string(), Value::Int(available as i64));
        }
        if let Some(ready) = status.ready_replicas {
            attrs.insert("ready_replicas".to_string(), Value::Int(ready as i64));
        }
    }

    Entity {
        id,
        entity_type: "kubernetes.deployment".to_string(),
        domain: "kubernetes".to_string(),
        attributes: attrs,
        relationships: Vec::new(),
        metadata: base_metadata(cluster_id, &dep.metadata),
        schema_version: 1,
        lifecycle: EntityLifecycle::Active,
    }
}

fn replicaset_to_entity(cluster_id: &str, namespace: Option<&str>, rs: &ReplicaSet) -> Entity {
    let ns = namespace.or(rs.metadata.namespace.as_deref()).unwrap_or("default");
    let name = rs.metadata.name.clone().unwrap_or_default();
    let id = composite_id("kubernetes.replicaset", cluster_id, Some(ns), &name);

    let (labels, annotations) = labels_and_annotations(&rs.metadata);
    let mut attrs = BTreeMap::new();
    attrs.insert("labels".to_string(), labels);
    attrs.insert("annotations".to_string(), annotations);
    attrs.insert("namespace".to_string(), Value::String(ns.to_string()));
    if let Some(spec) = rs.spec.as_ref() {
        if let Some(replicas) = spec.replicas {
            attrs.insert("replicas".to_string(), Value::Int(replicas as i64));
        }
    }
    if let Some(status) = rs.status.as_ref() {
        attrs.insert("ready_replicas".to_string(), Value::Int(status.ready_replicas.unwrap_or(0) as i64));
    }

    let relationships = relationships::replicaset_relationships(cluster_id, ns, &id, rs);

    Entity {
        id,
        entity_type: "kubernetes.replicaset".to_string(),
        domain: "kubernetes".to_string(),
        attributes: attrs,
        relationships,
        metadata: base_metadata(cluster_id, &rs.metadata),
        schema_version: 1,
        lifecycle: EntityLifecycle::Active,
    }
}

fn service_to_entity(cluster_id: &str, namespace: Option<&str>, svc: &Service) -> Entity {
    let ns = namespace.or(svc.metadata.namespace.as_deref()).unwrap_or("default");
    let name = svc.metadata.name.clone().unwrap_or_default();
    let id = composite_id("kubernetes.service", cluster_id, Some(ns), &name);

    let (labels, annotations) = labels_and_annotations(&svc.metadata);
    let mut attrs = BTreeMap::new();
    attrs.insert("labels".to_string(), labels);
    attrs.insert("annotations".to_string(), annotations);
    attrs.insert("namespace".to_string(), Value::String(ns.to_string()));
    if let Some(spec) = svc.spec.as_ref() {
        if let Some(kind) = spec.type_.as_ref() {
            attrs.insert("type".to_string(), Value::String(kind.clone()));
        }
        if let Some(cluster_ip) = spec.cluster_ip.as_ref() {
            attrs.insert("cluster_ip".to_string(), Value::String(cluster_ip.clone()));
        }
    }

    Entity {
        id,
        entity_type: "kubernetes.service".to_string(),
        domain: "kubernetes".to_string(),
        attributes: attrs,
        relationships: Vec::new(),
        metadata: base_metadata(cluster_id, &svc.metadata),
        schema_version: 1,
        lifecycle: EntityLifecycle::Active,
    }
}

fn node_to_entity(cluster_id: &str, _namespace: Option<&str>, node: &Node) -> Entity {
    let name = node.metadata.name.clone().unwrap_or_default();
    let id = composite_id("kubernetes.node", cluster_id, None, &name);

    let (labels, annotations) = labels_and_annotations(&node.metadata);
    let mut attrs = BTreeMap::new();
    attrs.insert("labels".to_string(), labels);
    attrs.insert("annotations".to_string(), annotations);
    if let Some(status) = node.status.as_ref() {
        if let Some(node_info) = status.node_info.as_ref() {
            attrs.insert("kubelet_version".to_string(), Value::String(node_info.kubelet_version.clone()));
        }
        let ready = status
            .conditions
            .iter()
            .flatten()
            .find(|c| c.type_ == "Ready")
            .map(|c| c.status == "True")
            .unwrap_or(false);
        attrs.insert("ready".to_string(), Value::Bool(ready));
    }

    Entity {
        id,
        entity_type: "kubernetes.node".to_string(),
        domain: "kubernetes".to_string(),
        attributes: attrs,
        relationships: Vec::new(),
        metadata: base_metadata(cluster_id, &node.metadata),
        schema_version: 1,
        lifecycle: EntityLifecycle::Active,
    }
}

fn namespace_to_entity(cluster_id: &str, _namespace: Option<&str>, ns: &Namespace) -> Entity {
    let name = ns.metadata.name.clone().unwrap_or_default();
    let id = composite_id("kubernetes.namespace", cluster_id, None, &name);

    let (labels, annotations) = labels_and_annotations(&ns.metadata);
    let mut attrs = BTreeMap::new();
    attrs.insert("labels".to_string(), labels);
    attrs.insert("annotations".to_string(), annotations);
    if let Some(status) = ns.status.as_ref() {
        if let Some(phase) = status.phase.as_ref() {
            attrs.insert("phase".to_string(), Value::String(phase.clone()));
        }
    }

    Entity {
        id,
        entity_type: "kubernetes.namespace".to_string(),
        domain: "kubernetes".to_string(),
        attributes: attrs,
        relationships: Vec::new(),
        metadata: base_metadata(cluster_id, &ns.metadata),
        schema_version: 1,
        lifecycle: EntityLifecycle::Active,
    }
}

resource_manager!(PodManager, "pods", Pod, "", "v1", true, pod_to_entity);
resource_manager!(DeploymentManager, "deployments", Deployment, "apps", "v1", true, deployment_to_entity);
resource_manager!(ReplicaSetManager, "replicasets", ReplicaSet, "apps", "v1", true, replicaset_to_entity);
resource_manager!(ServiceManager, "services", Service, "", "v1", true, service_to_entity);

/// Node and Namespace are cluster-scoped; `Api::namespaced` would be wrong
/// for them, so they get a dedicated (non-macro) implementation below.
pub struct NodeManager;

#[async_trait]
impl ResourceManager for NodeManager {
    fn resource_kind(&self) -> &'static str {
        "nodes"
    }
    fn group_version_kind(&self) -> GroupVersionKind {
        GroupVersionKind { group: "", version: "v1", kind: "Node" }
    }
    fn namespaced(&self) -> bool {
        false
    }

    async fn get(&self, cluster: &ClusterClient, _namespace: Option<&str>, name: &str) -> Result<Entity, K8sError> {
        let api: Api<Node> = Api::all(cluster.client.clone());
        let obj = api.get(name).await.map_err(|e| map_get_err(e, "nodes", name))?;
        Ok(node_to_entity(&cluster.config.id, None, &obj))
    }

    async fn list(&self, cluster: &ClusterClient, _namespace: Option<&str>) -> Result<Vec<Entity>, K8sError> {
        let api: Api<Node> = Api::all(cluster.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(K8sError::Kube)?;
        Ok(list.items.iter().map(|obj| node_to_entity(&cluster.config.id, None, obj)).collect())
    }

    async fn delete(&self, cluster: &ClusterClient, _namespace: Option<&str>, name: &str) -> Result<(), K8sError> {
        let api: Api<Node> = Api::all(cluster.client.clone());
        api.delete(name, &Default::default()).await.map_err(|e| map_get_err(e, "nodes", name))?;
        Ok(())
    }
}

pub struct NamespaceManager;

#[async_trait]
impl ResourceManager for NamespaceManager {
    fn resource_kind(&self) -> &'static str {
        "namespaces"
    }
    fn group_version_kind(&self) -> GroupVersionKind {
        GroupVersionKind { group: "", version: "v1", kind: "Namespace" }
    }
    fn namespaced(&self) -> bool {
        false
    }

    async fn get(&self, cluster: &ClusterClient, _namespace: Option<&str>, name: &str) -> Result<Entity, K8sError> {
        let api: Api<Namespace> = Api::all(cluster.client.clone());
        let obj = api.get(name).await.map_err(|e| map_get_err(e, "namespaces", name))?;
        Ok(namespace_to_entity(&cluster.config.id, None, &obj))
    }

    async fn list(&self, cluster: &ClusterClient, _namespace: Option<&str>) -> Result<Vec<Entity>, K8sError> {
        let api: Api<Namespace> = Api::all(cluster.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(K8sError::Kube)?;
        Ok(list.items.iter().map(|obj| namespace_to_entity(&cluster.config.id, None, obj)).collect())
    }

    async fn delete(&self, cluster: &ClusterClient, _namespace: Option<&str>, name: &str) -> Result<(), K8sError> {
        let api: Api<Namespace> = Api::all(cluster.client.clone());
        api.delete(name, &Default::default()).await.map_err(|e| map_get_err(e, "namespaces", name))?;
        Ok(())
    }
}

/// One manager per entry in `watch_resources`; unrecognized names are
/// skipped (custom resources are handled separately,
/// `enable_custom_resources`/`custom_resource_definitions`).
pub fn managers_for(watch_resources: &[String]) -> Vec<Box<dyn ResourceManager>> {
    watch_resources
        .iter()
        .filter_map(|name| -> Option<Box<dyn ResourceManager>> {
            match name.as_str() {
                "pods" => Some(Box::new(PodManager)),
                "deployments" => Some(Box::new(DeploymentManager)),
                "replicasets" => Some(Box::new(ReplicaSetManager)),
                "services" => Some(Box::new(ServiceManager)),
                "nodes" => Some(Box::new(NodeManager)),
                "namespaces" => Some(Box::new(NamespaceManager)),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_id_includes_namespace_for_namespaced_kinds() {
        let id = composite_id("kubernetes.pod", "prod", Some("default"), "web-1");
        assert_eq!(id.as_str(), "kubernetes.pod:prod:default:web-1");
    }

    #[test]
    fn composite_id_omits_namespace_for_cluster_scoped_kinds() {
        let id = composite_id("kubernetes.node", "prod", None, "node-7");
        assert_eq!(id.as_str(), "kubernetes.node:prod:node-7");
    }

    #[test]
    fn managers_for_skips_unknown_resource_names() {
        let managers = managers_for(&["pods".to_string(), "not-a-real-kind".to_string()]);
        assert_eq!(managers.len(), 1);
        assert_eq!(managers[0].resource_kind(), "pods");
    }
}
