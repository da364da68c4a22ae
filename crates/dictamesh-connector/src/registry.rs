//! Process-wide connector factory registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::rest::{RestConfig, RestConnector};

/// Builds a [`Connector`] from an opaque JSON configuration blob. Kept
/// object-safe so the registry can hold heterogeneous factories.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    async fn build(&self, config: serde_json::Value) -> Result<Arc<dyn Connector>, ConnectorError>;
}

struct RestFactory;

#[async_trait]
impl ConnectorFactory for RestFactory {
    async fn build(&self, config: serde_json::Value) -> Result<Arc<dyn Connector>, ConnectorError> {
        let base_url = config
            .get("base_url")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ConnectorError::BadRequest("rest connector requires `base_url`".into()))?;
        let url = url::Url::parse(base_url).map_err(|e| ConnectorError::BadRequest(e.to_string()))?;
        let connector = RestConnector::new(RestConfig::new(url), None)?;
        Ok(Arc::new(connector))
    }
}

/// A factory for a protocol whose driver isn't wired into this crate.
/// Registered under its documented name so callers get a consistent
/// `Unavailable` instead of a missing-factory error.
struct StubFactory {
    protocol: &'static str,
}

#[async_trait]
impl ConnectorFactory for StubFactory {
    async fn build(&self, _config: serde_json::Value) -> Result<Arc<dyn Connector>, ConnectorError> {
        Err(ConnectorError::Unavailable(format!(
            "the '{}' connector driver is not wired into this build",
            self.protocol
        )))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("connector factory '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("no connector factory registered under '{0}'")]
    NotRegistered(String),
}

/// A process-wide lookup from connector name to factory.
#[derive(Clone)]
pub struct ConnectorRegistry {
    factories: Arc<RwLock<HashMap<String, Arc<dyn ConnectorFactory>>>>,
}

const STUB_PROTOCOLS: &[&str] = &["postgres", "mysql", "mongodb", "s3", "local-fs", "kafka", "amqp"];

impl ConnectorRegistry {
    /// A registry pre-populated with the `rest` reference implementation
    /// and stub factories for every other built-in name.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register("rest", Arc::new(RestFactory)).expect("builtin registration cannot collide");
        for protocol in STUB_PROTOCOLS {
            registry
                .register(protocol, Arc::new(StubFactory { protocol }))
                .expect("builtin registration cannot collide");
        }
        registry
    }

    pub fn empty() -> Self {
        Self { factories: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn register(&self, name: impl Into<String>, factory: Arc<dyn ConnectorFactory>) -> Result<(), RegistryError> {
        let name = name.into();
        let mut factories = self.factories.write().expect("registry lock poisoned");
        if factories.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        factories.insert(name, factory);
        Ok(())
    }

    pub async fn build(&self, name: &str, config: serde_json::Value) -> Result<Arc<dyn Connector>, ConnectorError> {
        let factory = {
            let factories = self.factories.read().expect("registry lock poisoned");
            factories.get(name).cloned()
        }
        .ok_or_else(|| ConnectorError::BadRequest(format!("no connector factory registered under '{name}'")))?;
        factory.build(config).await
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.read().expect("registry lock poisoned").keys().cloned().collect()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rest_factory_builds_from_base_url() {
        let registry = ConnectorRegistry::with_builtins();
        let connector = registry
            .build("rest", serde_json::json!({ "base_url": "https://api.example.com" }))
            .await
            .unwrap();
        let caps = connector.capabilities();
        assert!(caps.pagination);
        assert!(!caps.streaming);
    }

    #[tokio::test]
    async fn stub_factories_report_unavailable() {
        let registry = ConnectorRegistry::with_builtins();
        let err = registry.build("postgres", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Unavailable(_)));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = ConnectorRegistry::empty();
        registry.register("rest", Arc::new(RestFactory)).unwrap();
        let err = registry.register("rest", Arc::new(RestFactory)).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn unknown_name_is_a_bad_request() {
        let registry = ConnectorRegistry::empty();
        let err = registry.build("does-not-exist", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ConnectorError::BadRequest(_)));
    }
}
