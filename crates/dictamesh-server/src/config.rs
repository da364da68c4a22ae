//! Top-level configuration: one `Config` struct aggregating every
//! subsystem's recognized keys, loaded by layering a base file, an
//! environment-specific file, and `DICTAMESH_`-prefixed environment
//! variables (in that order of increasing precedence).

use serde::{Deserialize, Serialize};
use validator::Validate;

use dictamesh_cache::CacheConfig;
use dictamesh_k8s::K8sAdapterConfig;
use dictamesh_resilience::PolicyConfig;

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    /// Maximum concurrent in-flight requests admitted to the router.
    pub concurrency_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080, concurrency_limit: 256 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CatalogConfig {
    /// `postgres://...`; left empty to run against the in-memory catalog
    /// test double instead (used by the `dev` environment file).
    pub database_url: String,
    #[validate(range(min = 1))]
    pub max_connections: u32,
    pub shard: u16,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { database_url: String::new(), max_connections: 10, shard: 0 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EventsConfig {
    /// Left empty to run against the in-memory bus test double instead.
    pub bootstrap_servers: String,
    pub consumer_group: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { bootstrap_servers: String::new(), consumer_group: "dictamesh".to_string() }
    }
}

/// Aggregates every subsystem's config under its own key: `server`,
/// `catalog`, `events`, `cache`, `resilience`, `kubernetes`, plus the
/// service name used for both tracing (`dictamesh_observability::init`)
/// and the `requests_total{component=...}` label.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(length(min = 1))]
    pub service_name: String,
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub catalog: CatalogConfig,
    pub events: EventsConfig,
    pub cache: CacheConfig,
    pub default_policy: PolicyConfig,
    pub kubernetes: K8sAdapterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "dictamesh".to_string(),
            server: ServerConfig::default(),
            catalog: CatalogConfig::default(),
            events: EventsConfig::default(),
            cache: CacheConfig::default(),
            default_policy: PolicyConfig::default(),
            kubernetes: K8sAdapterConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("loading configuration: {0}")]
    Source(#[from] config::ConfigError),
    #[error("validating configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Loads `config/base.{toml,yaml,json,...}`, layers
/// `config/{DICTAMESH_ENV}.*` over it (`DICTAMESH_ENV` defaults to `dev`),
/// then layers `DICTAMESH_`-prefixed environment variables (`__` as the
/// nesting separator, e.g. `DICTAMESH_SERVER__PORT=9000`), and validates
/// the result.
pub fn load() -> Result<Config, ConfigLoadError> {
    let env = std::env::var("DICTAMESH_ENV").unwrap_or_else(|_| "dev".to_string());

    let builder = config::Config::builder()
        .add_source(config::File::with_name("config/base").required(false))
        .add_source(config::File::with_name(&format!("config/{env}")).required(false))
        .add_source(config::Environment::with_prefix("DICTAMESH").separator("__"));

    let config: Config = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }
}
