//! The Kubernetes multi-cluster adapter: a pool of cluster clients, one
//! resource manager per watched kind, deterministic relationship
//! discovery, and a periodic re-list resync loop that keeps the catalog
//! converged with observed cluster state.

pub mod adapter;
pub mod client_pool;
pub mod config;
pub mod error;
pub mod relationships;
pub mod resource;
pub mod resync;

pub use adapter::{ClusterHealth, HealthStatus, K8sAdapter};
pub use client_pool::{ClusterClient, ClusterInfo, ClusterRegistry};
pub use config::{AuthMethod, ClusterConfig, K8sAdapterConfig, TlsConfig};
pub use error::K8sError;
pub use resource::{GroupVersionKind, ResourceManager};
