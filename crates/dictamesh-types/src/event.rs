//! Events published to the partitioned bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::EntityId;

/// The fixed event vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    EntityCreated,
    EntityUpdated,
    EntityDeleted,
    RelationshipCreated,
    RelationshipDeleted,
    SchemaRegistered,
    SchemaDeprecated,
    SyncStarted,
    SyncCompleted,
    SyncFailed,
}

impl EventType {
    /// The `dictamesh.events.{event_type}` topic this event type publishes
    /// to by default.
    pub fn default_topic(self) -> String {
        format!("dictamesh.events.{}", self.wire_name())
    }

    /// The stable wire name used as the schema registry subject and in
    /// topic names, e.g. `EntityCreated` -> `"entity.created"`.
    pub fn wire_name(self) -> &'static str {
        match self {
            EventType::EntityCreated => "entity.created",
            EventType::EntityUpdated => "entity.updated",
            EventType::EntityDeleted => "entity.deleted",
            EventType::RelationshipCreated => "relationship.created",
            EventType::RelationshipDeleted => "relationship.deleted",
            EventType::SchemaRegistered => "schema.registered",
            EventType::SchemaDeprecated => "schema.deprecated",
            EventType::SyncStarted => "sync.started",
            EventType::SyncCompleted => "sync.completed",
            EventType::SyncFailed => "sync.failed",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    pub correlation_id: Option<Uuid>,
    pub causation_id: Option<Uuid>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub source_adapter: String,
    pub source_entity_id: EntityId,
    pub payload: serde_json::Value,
    pub meta: EventMeta,
}

impl Event {
    /// Partition key `{source_entity_id}`, or
    /// `{subject_type}:{subject_id}` for relationship events (the caller
    /// supplies the latter by constructing `source_entity_id` accordingly).
    pub fn partition_key(&self) -> &str {
        self.source_entity_id.as_str()
    }

    pub fn topic(&self) -> String {
        self.event_type.default_topic()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBuilder {
    pub version: u32,
    pub source_adapter: String,
    pub source_entity_id: Option<EntityId>,
    pub payload: Option<serde_json::Value>,
    pub meta: EventMeta,
}

impl EventBuilder {
    pub fn new(source_adapter: impl Into<String>) -> Self {
        Self {
            version: 1,
            source_adapter: source_adapter.into(),
            ..Default::default()
        }
    }

    pub fn entity(mut self, id: EntityId) -> Self {
        self.source_entity_id = Some(id);
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn causation(mut self, causation_id: Uuid) -> Self {
        self.meta.causation_id = Some(causation_id);
        self
    }

    pub fn correlation(mut self, correlation_id: Uuid) -> Self {
        self.meta.correlation_id = Some(correlation_id);
        self
    }

    /// Builds the event, stamping `event_id` and `timestamp`. Fails if
    /// mandatory fields are missing.
    pub fn build(self, event_type: EventType, event_id: Uuid, now: DateTime<Utc>) -> Result<Event, MissingField> {
        let source_entity_id = self.source_entity_id.ok_or(MissingField("source_entity_id"))?;
        let payload = self.payload.ok_or(MissingField("payload"))?;
        if self.source_adapter.is_empty() {
            return Err(MissingField("source_adapter"));
        }
        Ok(Event {
            event_id,
            event_type,
            version: self.version,
            timestamp: now,
            source_adapter: self.source_adapter,
            source_entity_id,
            payload,
            meta: self.meta,
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("event is missing mandatory field {0:?}")]
pub struct MissingField(pub &'static str);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_naming_follows_event_vocabulary() {
        assert_eq!(
            EventType::EntityCreated.default_topic(),
            "dictamesh.events.entity.created"
        );
        assert_eq!(
            EventType::SyncFailed.default_topic(),
            "dictamesh.events.sync.failed"
        );
    }

    #[test]
    fn builder_requires_mandatory_fields() {
        let err = EventBuilder::new("rest-catalog")
            .build(EventType::EntityCreated, Uuid::new_v4(), Utc::now())
            .unwrap_err();
        assert_eq!(err.0, "source_entity_id");
    }

    #[test]
    fn builder_succeeds_with_mandatory_fields_present() {
        let event = EventBuilder::new("rest-catalog")
            .entity(EntityId::new("product", "123"))
            .payload(serde_json::json!({"entity_type": "product"}))
            .build(EventType::EntityCreated, Uuid::new_v4(), Utc::now())
            .unwrap();
        assert_eq!(event.partition_key(), "product:123");
    }
}
