//! Cluster registry and global adapter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Kubeconfig,
    ServiceAccount,
    Token,
    Oidc,
    InCluster,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub insecure: bool,
    pub ca_file: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub ca_data: Option<String>,
    pub cert_data: Option<String>,
    pub key_data: Option<String>,
}

/// One configured cluster entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub id: String,
    pub name: String,
    pub environment: Option<String>,
    pub region: Option<String>,
    pub auth_method: AuthMethod,
    /// Kubeconfig path, when `auth_method = kubeconfig`.
    pub kubeconfig_path: Option<String>,
    /// API server URL, required for `service_account`/`token`/`oidc`.
    pub api_server: Option<String>,
    /// Bearer token, for `auth_method = token`, or a service-account token
    /// file's contents when that's resolved eagerly rather than re-read.
    pub token: Option<String>,
    /// Token file path, for `auth_method = service_account`.
    pub token_file: Option<String>,
    /// OIDC issuer, for `auth_method = oidc`.
    pub oidc_issuer: Option<String>,
    #[serde(default)]
    pub tls_config: TlsConfig,
    #[serde(default = "default_qps")]
    pub qps: f32,
    #[serde(default = "default_burst")]
    pub burst: i32,
    #[serde(default = "default_cluster_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_qps() -> f32 {
    50.0
}

fn default_burst() -> i32 {
    100
}

fn default_cluster_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Global settings shared across all configured clusters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct K8sAdapterConfig {
    pub clusters: Vec<ClusterConfig>,
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
    #[serde(default = "default_watch_resources")]
    pub watch_resources: Vec<String>,
    #[serde(default = "default_true")]
    pub enable_cache: bool,
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub cache_ttl: Duration,
    #[serde(default = "default_true")]
    pub enable_relationships: bool,
    #[serde(default = "default_resync_period", with = "humantime_serde")]
    pub resync_period: Duration,
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: u32,
    #[serde(default)]
    pub enable_mutations: bool,
    #[serde(default)]
    pub enable_custom_resources: bool,
    #[serde(default)]
    pub custom_resource_definitions: Vec<String>,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_watch_resources() -> Vec<String> {
    vec![
        "pods".to_string(),
        "deployments".to_string(),
        "services".to_string(),
        "nodes".to_string(),
        "namespaces".to_string(),
        "replicasets".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(60)
}

fn default_resync_period() -> Duration {
    Duration::from_secs(300)
}

fn default_worker_pool_size() -> u32 {
    8
}

impl Default for K8sAdapterConfig {
    fn default() -> Self {
        Self {
            clusters: Vec::new(),
            default_namespace: default_namespace(),
            watch_resources: default_watch_resources(),
            enable_cache: true,
            cache_ttl: default_cache_ttl(),
            enable_relationships: true,
            resync_period: default_resync_period(),
            worker_pool_size: default_worker_pool_size(),
            enable_mutations: false,
            enable_custom_resources: false,
            custom_resource_definitions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_cluster_entry() {
        let json = serde_json::json!({
            "id": "prod",
            "name": "prod-us-east",
            "auth_method": "in_cluster",
        });
        let cfg: ClusterConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.id, "prod");
        assert_eq!(cfg.auth_method, AuthMethod::InCluster);
        assert_eq!(cfg.qps, 50.0);
        assert_eq!(cfg.burst, 100);
    }

    #[test]
    fn global_config_defaults_watch_resources() {
        let cfg = K8sAdapterConfig::default();
        assert!(cfg.watch_resources.contains(&"pods".to_string()));
        assert_eq!(cfg.resync_period, Duration::from_secs(300));
    }
}
