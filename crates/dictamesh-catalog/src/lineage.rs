//! Lineage edges: upstream -> downstream with an operation label.

use chrono::{DateTime, Utc};
use dictamesh_types::EntityId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub upstream_id: EntityId,
    pub downstream_id: EntityId,
    pub operation: String,
    pub recorded_at: DateTime<Utc>,
}

impl LineageEdge {
    pub fn new(upstream_id: EntityId, downstream_id: EntityId, operation: impl Into<String>) -> Self {
        Self {
            upstream_id,
            downstream_id,
            operation: operation.into(),
            recorded_at: Utc::now(),
        }
    }
}
