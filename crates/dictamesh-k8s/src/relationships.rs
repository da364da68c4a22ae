//! Deterministic relationship discovery.

use dictamesh_types::{Cardinality, EntityId, Relationship};
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::{EnvFromSource, Pod, Volume};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

fn owner_entity_id(cluster: &str, namespace: &str, owner: &OwnerReference) -> EntityId {
    EntityId::new(
        &format!("kubernetes.{}", owner.kind.to_lowercase()),
        &format!("{cluster}:{namespace}:{}", owner.name),
    )
}

fn bare_relationship(
    subject_id: EntityId,
    subject_type: String,
    relationship_type: &str,
    object_id: EntityId,
    object_type: String,
    cardinality: Cardinality,
) -> Relationship {
    Relationship {
        subject_id,
        subject_type,
        relationship_type: relationship_type.to_string(),
        object_id,
        object_type,
        cardinality,
        valid_from: None,
        valid_to: None,
        attributes: Default::default(),
        dangling: false,
    }
}

/// `owned_by` (ReplicaSet/StatefulSet/DaemonSet/Job), `runs_on` (Node),
/// `uses` (ConfigMap/Secret/PersistentVolumeClaim) —
pub fn pod_relationships(cluster: &str, namespace: &str, pod_id: &EntityId, pod: &Pod) -> Vec<Relationship> {
    let mut out = Vec::new();

    if let Some(owners) = pod.metadata.owner_references.as_ref() {
        for owner in owners {
            if matches!(owner.kind.as_str(), "ReplicaSet" | "StatefulSet" | "DaemonSet" | "Job") {
                out.push(bare_relationship(
                    pod_id.clone(),
                    "kubernetes.pod".to_string(),
                    "owned_by",
                    owner_entity_id(cluster, namespace, owner),
                    format!("kubernetes.{}", owner.kind.to_lowercase()),
                    Cardinality::One,
                ));
            }
        }
    }

    if let Some(spec) = pod.spec.as_ref() {
        if let Some(node_name) = spec.node_name.as_ref() {
            out.push(bare_relationship(
                pod_id.clone(),
                "kubernetes.pod".to_string(),
                "runs_on",
                EntityId::new("kubernetes.node", &format!("{cluster}:{node_name}")),
                "kubernetes.node".to_string(),
                Cardinality::One,
            ));
        }

        for volume in spec.volumes.iter().flatten() {
            if let Some(rel) = volume_reference(cluster, namespace, pod_id, volume) {
                out.push(rel);
            }
        }

        for container in spec.containers.iter() {
            for env_from in container.env_from.iter().flatten() {
                if let Some(rel) = env_from_reference(cluster, namespace, pod_id, env_from) {
                    out.push(rel);
                }
            }
            for env in container.env.iter().flatten() {
                if let Some(source) = env.value_from.as_ref() {
                    if let Some(name) = source.config_map_key_ref.as_ref().and_then(|cm| cm.name.as_ref()) {
                        out.push(uses_relationship(cluster, namespace, pod_id, "kubernetes.configmap", name));
                    }
                    if let Some(name) = source.secret_key_ref.as_ref().and_then(|secret| secret.name.as_ref()) {
                        out.push(uses_relationship(cluster, namespace, pod_id, "kubernetes.secret", name));
                    }
                }
            }
        }
    }

    out
}

fn uses_relationship(cluster: &str, namespace: &str, pod_id: &EntityId, object_type: &str, name: &str) -> Relationship {
    bare_relationship(
        pod_id.clone(),
        "kubernetes.pod".to_string(),
        "uses",
        EntityId::new(object_type, &format!("{cluster}:{namespace}:{name}")),
        object_type.to_string(),
        Cardinality::Many,
    )
}

fn volume_reference(cluster: &str, namespace: &str, pod_id: &EntityId, volume: &Volume) -> Option<Relationship> {
    if let Some(cm) = volume.config_map.as_ref() {
        let name = cm.name.as_ref()?;
        return Some(uses_relationship(cluster, namespace, pod_id, "kubernetes.configmap", name));
    }
    if let Some(secret) = volume.secret.as_ref() {
        let name = secret.secret_name.as_ref()?;
        return Some(uses_relationship(cluster, namespace, pod_id, "kubernetes.secret", name));
    }
    if let Some(pvc) = volume.persistent_volume_claim.as_ref() {
        return Some(uses_relationship(
            cluster,
            namespace,
            pod_id,
            "kubernetes.persistentvolumeclaim",
            &pvc.claim_name,
        ));
    }
    None
}

fn env_from_reference(cluster: &str, namespace: &str, pod_id: &EntityId, env_from: &EnvFromSource) -> Option<Relationship> {
    if let Some(name) = env_from.config_map_ref.as_ref().and_then(|cm| cm.name.as_ref()) {
        return Some(uses_relationship(cluster, namespace, pod_id, "kubernetes.configmap", name));
    }
    if let Some(name) = env_from.secret_ref.as_ref().and_then(|secret| secret.name.as_ref()) {
        return Some(uses_relationship(cluster, namespace, pod_id, "kubernetes.secret", name));
    }
    None
}

/// `owns` (Deployment -> ReplicaSet) — Derived from the
/// ReplicaSet's own owner reference, emitted with the Deployment as subject.
pub fn replicaset_relationships(
    cluster: &str,
    namespace: &str,
    replicaset_id: &EntityId,
    rs: &ReplicaSet,
) -> Vec<Relationship> {
    rs.metadata
        .owner_references
        .iter()
        .flatten()
        .filter(|owner| owner.kind == "Deployment")
        .map(|owner| {
            bare_relationship(
                owner_entity_id(cluster, namespace, owner),
                "kubernetes.deployment".to_string(),
                "owns",
                replicaset_id.clone(),
                "kubernetes.replicaset".to_string(),
                Cardinality::Many,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod_with_owner_and_node() -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("web-1".into()),
                owner_references: Some(vec![OwnerReference {
                    api_version: "apps/v1".into(),
                    kind: "ReplicaSet".into(),
                    name: "web".into(),
                    uid: "rs-uid".into(),
                    controller: Some(true),
                    block_owner_deletion: Some(true),
                }]),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("node-7".into()),
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn pod_emits_only_owned_by_and_runs_on() {
        let pod = pod_with_owner_and_node();
        let pod_id = EntityId::new("kubernetes.pod", "prod:default:web-1");
        let rels = pod_relationships("prod", "default", &pod_id, &pod);

        assert_eq!(rels.len(), 2);
        assert!(rels.iter().any(|r| r.relationship_type == "owned_by" && r.object_type == "kubernetes.replicaset"));
        assert!(rels.iter().any(|r| r.relationship_type == "runs_on" && r.object_type == "kubernetes.node"));
    }

    #[test]
    fn pod_with_no_owner_or_node_emits_nothing() {
        let pod = Pod {
            metadata: ObjectMeta { name: Some("orphan".into()), ..Default::default() },
            spec: Some(PodSpec::default()),
            status: None,
        };
        let pod_id = EntityId::new("kubernetes.pod", "prod:default:orphan");
        assert!(pod_relationships("prod", "default", &pod_id, &pod).is_empty());
    }

    #[test]
    fn replicaset_owned_by_deployment_emits_owns_from_deployment() {
        let rs = ReplicaSet {
            metadata: ObjectMeta {
                name: Some("web-abc123".into()),
                owner_references: Some(vec![OwnerReference {
                    api_version: "apps/v1".into(),
                    kind: "Deployment".into(),
                    name: "web".into(),
                    uid: "dep-uid".into(),
                    controller: Some(true),
                    block_owner_deletion: Some(true),
                }]),
                ..Default::default()
            },
            spec: None,
            status: None,
        };
        let rs_id = EntityId::new("kubernetes.replicaset", "prod:default:web-abc123");
        let rels = replicaset_relationships("prod", "default", &rs_id, &rs);
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].relationship_type, "owns");
        assert_eq!(rels[0].subject_type, "kubernetes.deployment");
    }
}
