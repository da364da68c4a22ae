//! Adapter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SloConfig {
    pub availability: Option<f64>,
    #[serde(with = "humantime_serde::option")]
    pub latency_p99: Option<Duration>,
    #[serde(with = "humantime_serde::option")]
    pub freshness: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    Incremental,
    Webhook,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    pub mode: SyncMode,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    /// Starting point for incremental sync's `fetchModifiedSince`, if the
    /// operator wants to seed a backfill window rather than "since boot".
    pub since: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_page_size() -> u32 {
    100
}

fn default_rate_limit() -> u32 {
    50
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Full,
            page_size: default_page_size(),
            rate_limit: default_rate_limit(),
            since: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub secret: Option<String>,
    #[serde(default = "default_webhook_path")]
    pub path: String,
}

fn default_webhook_path() -> String {
    "/webhooks/adapter".to_string()
}

/// Recognized configuration keys for one adapter instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub name: String,
    pub version: String,
    pub domain: String,
    pub entity_types: Vec<String>,
    #[serde(default)]
    pub slo: SloConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// Connector factory name this adapter's connector was built from
    /// (e.g. `"rest"`), carried for observability/tracing spans only.
    #[serde(default)]
    pub connector_name: String,
}
