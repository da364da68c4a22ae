//! Per-cluster client construction and the cluster registry.

use std::collections::HashMap;
use std::sync::Arc;

use dictamesh_resilience::RateLimiter;
use kube::config::{AuthInfo, Kubeconfig, KubeConfigOptions};
use kube::{Client, Config};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::{AuthMethod, ClusterConfig};
use crate::error::K8sError;

/// Version/scale facts recorded at connect time.
#[derive(Clone, Debug, Default)]
pub struct ClusterInfo {
    pub version: String,
    pub node_count: usize,
    pub namespace_count: usize,
}

/// A connected cluster: its typed client and the QPS/burst limiter derived
/// from its configuration. One long-lived `kube::Client` is held per
/// cluster rather than one per call.
pub struct ClusterClient {
    pub config: ClusterConfig,
    pub client: Client,
    pub info: ClusterInfo,
    pub limiter: RateLimiter,
}

impl ClusterClient {
    /// Resolves `auth_method` into a `kube::Config`, connects, and fetches
    /// version/node/namespace counts. Connecting to one cluster never
    /// aborts the caller's attempt to connect to the others.
    pub async fn connect(cfg: ClusterConfig) -> Result<Self, K8sError> {
        let kube_config = build_kube_config(&cfg).await?;
        let client = Client::try_from(kube_config).map_err(K8sError::Kube)?;

        let info = fetch_cluster_info(&client).await.unwrap_or_else(|err| {
            warn!(cluster = %cfg.id, error = %err, "cluster connected but info probe failed");
            ClusterInfo::default()
        });

        let limiter = RateLimiter::new(cfg.qps.max(1.0) as u32, cfg.burst.max(1) as u32);

        info!(cluster = %cfg.id, version = %info.version, "connected to cluster");
        Ok(Self {
            config: cfg,
            client,
            info,
            limiter,
        })
    }
}

async fn build_kube_config(cfg: &ClusterConfig) -> Result<Config, K8sError> {
    let mut config = match cfg.auth_method {
        AuthMethod::InCluster => Config::incluster().map_err(|e| K8sError::BadConfig(e.to_string()))?,
        AuthMethod::Kubeconfig => {
            let options = KubeConfigOptions::default();
            match &cfg.kubeconfig_path {
                Some(path) => {
                    let kubeconfig = Kubeconfig::read_from(path)
                        .map_err(|e| K8sError::BadConfig(format!("reading {path}: {e}")))?;
                    Config::from_custom_kubeconfig(kubeconfig, &options)
                        .await
                        .map_err(|e| K8sError::BadConfig(e.to_string()))?
                }
                None => Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| K8sError::BadConfig(e.to_string()))?,
            }
        }
        AuthMethod::Token | AuthMethod::ServiceAccount | AuthMethod::Oidc => {
            let api_server = cfg
                .api_server
                .as_ref()
                .ok_or_else(|| K8sError::BadConfig("api_server is required for this auth_method".into()))?;
            let uri: http::Uri = api_server
                .parse()
                .map_err(|e| K8sError::BadConfig(format!("invalid api_server: {e}")))?;
            let mut config = Config::new(uri);
            config.auth_info = AuthInfo {
                token: cfg.token.clone().map(Into::into),
                token_file: cfg.token_file.clone(),
                ..Default::default()
            };
            config
        }
    };

    config.default_namespace = cfg
        .kubeconfig_path
        .is_some()
        .then(|| config.default_namespace.clone())
        .unwrap_or_else(|| "default".to_string());
    config.read_timeout = Some(cfg.timeout);
    config.write_timeout = Some(cfg.timeout);
    config.accept_invalid_certs = cfg.tls_config.insecure;
    Ok(config)
}

async fn fetch_cluster_info(client: &Client) -> Result<ClusterInfo, K8sError> {
    let version = client.apiserver_version().await.map_err(K8sError::Kube)?;
    let nodes: kube::Api<k8s_openapi::api::core::v1::Node> = kube::Api::all(client.clone());
    let namespaces: kube::Api<k8s_openapi::api::core::v1::Namespace> = kube::Api::all(client.clone());
    let node_count = nodes.list(&Default::default()).await.map(|l| l.items.len()).unwrap_or(0);
    let namespace_count = namespaces.list(&Default::default()).await.map(|l| l.items.len()).unwrap_or(0);
    Ok(ClusterInfo {
        version: format!("{}.{}", version.major, version.minor),
        node_count,
        namespace_count,
    })
}

/// Read/write-locked, read-mostly registry of connected clusters.
#[derive(Default)]
pub struct ClusterRegistry {
    clusters: RwLock<HashMap<String, Arc<ClusterClient>>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, client: ClusterClient) {
        self.clusters.write().insert(client.config.id.clone(), Arc::new(client));
    }

    pub fn remove(&self, cluster_id: &str) -> Option<Arc<ClusterClient>> {
        self.clusters.write().remove(cluster_id)
    }

    pub fn get(&self, cluster_id: &str) -> Option<Arc<ClusterClient>> {
        self.clusters.read().get(cluster_id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.clusters.read().keys().cloned().collect()
    }

    pub fn all(&self) -> Vec<Arc<ClusterClient>> {
        self.clusters.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clusters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.read().is_empty()
    }
}
