//! The persisted form of an entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityLifecycle;
use crate::id::{EntityId, RowId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Get,
    Post,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    None,
    ApiKey,
    Basic,
    Bearer,
    OAuth2,
    Jwt,
}

/// Discovery hints describing how the source can be re-read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryHint {
    pub endpoint_template: String,
    pub method: DiscoveryMethod,
    pub auth_kind: AuthKind,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub completeness: Option<f64>,
    pub freshness_seconds: Option<u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    #[default]
    Public,
    Internal,
    Confidential,
    Restricted,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GovernanceFlags {
    #[serde(default)]
    pub contains_pii: bool,
    #[serde(default)]
    pub classification: Classification,
    pub retention_days: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub row_id: RowId,
    pub entity_id: EntityId,
    pub entity_type: String,
    pub domain: String,
    pub source_system: String,
    pub source_entity_id: String,
    pub discovery: DiscoveryHint,
    pub quality: QualityMetrics,
    pub governance: GovernanceFlags,
    pub schema_version: u32,
    pub lifecycle: EntityLifecycle,
    pub last_seen_at: DateTime<Utc>,
}
