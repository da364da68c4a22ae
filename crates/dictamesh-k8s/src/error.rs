//! Cluster/resource failure taxonomy, mapped onto the shared error kinds
//! the same way `dictamesh-connector` maps `ConnectorError`.

use dictamesh_types::{ErrorKind, MeshError};

#[derive(Debug, thiserror::Error)]
pub enum K8sError {
    #[error("unknown cluster: {0}")]
    UnknownCluster(String),
    #[error("cluster {0} is unreachable")]
    ClusterUnreachable(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("invalid cluster configuration: {0}")]
    BadConfig(String),
    #[error("kube client error: {0}")]
    Kube(#[from] kube::Error),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<K8sError> for MeshError {
    fn from(err: K8sError) -> Self {
        match err {
            K8sError::UnknownCluster(msg) => MeshError::not_found(msg),
            K8sError::ClusterUnreachable(msg) => MeshError::unavailable(msg),
            K8sError::Forbidden(msg) => MeshError::new(ErrorKind::AuthFailed, msg),
            K8sError::NotFound(msg) => MeshError::not_found(msg),
            K8sError::BadConfig(msg) => MeshError::validation(msg),
            K8sError::Kube(err) => MeshError::unavailable(err.to_string()),
            K8sError::Internal(err) => MeshError::internal("k8s adapter internal error").with_source(err),
        }
    }
}
