//! Producer contract and the `rdkafka`-backed implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use dictamesh_types::Event;

use crate::codec;
use crate::error::EventError;
use crate::schema_registry::SchemaRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    Snappy,
    Zstd,
}

impl Compression {
    fn as_str(self) -> &'static str {
        match self {
            Compression::Snappy => "snappy",
            Compression::Zstd => "zstd",
        }
    }
}

#[async_trait]
pub trait Producer: Send + Sync {
    /// Publishes a single event: validates mandatory fields, resolves the
    /// current schema, encodes, and emits.
    async fn publish(&self, event: Event) -> Result<(), EventError>;

    /// Groups events sharing a topic into a single commit.
    async fn publish_batch(&self, events: Vec<Event>) -> Result<(), EventError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaProducerConfig {
    pub bootstrap_servers: String,
    pub compression: Compression,
    pub max_in_flight_per_connection: u32,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for KafkaProducerConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            compression: Compression::Snappy,
            max_in_flight_per_connection: 5,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// An `acks=all`, idempotent-producer-id `FutureProducer`, compressing
/// with `snappy` by default (`zstd` is appropriate for cold topics —
/// callers select per-topic by constructing a second producer).
pub struct KafkaProducer {
    producer: FutureProducer,
    registry: Arc<SchemaRegistry>,
    timeout: Duration,
}

impl KafkaProducer {
    pub fn new(config: KafkaProducerConfig, registry: Arc<SchemaRegistry>) -> Result<Self, EventError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("compression.type", config.compression.as_str())
            .set(
                "max.in.flight.requests.per.connection",
                config.max_in_flight_per_connection.to_string(),
            )
            .create()
            .map_err(|e| EventError::Broker(e.to_string()))?;
        Ok(Self { producer, registry, timeout: config.request_timeout })
    }

    async fn send_one(&self, event: &Event) -> Result<(), EventError> {
        let schema_id = self
            .registry
            .current_schema_id(event.event_type.wire_name())
            .ok_or_else(|| EventError::SchemaNotFound {
                event_type: format!("{:?}", event.event_type),
                version: event.version,
            })?;

        let payload = codec::encode(&self.registry, schema_id, event)?;
        let topic = event.topic();
        let key = event.partition_key().to_string();

        let record = FutureRecord::to(&topic).key(&key).payload(&payload);
        self.producer
            .send(record, self.timeout)
            .await
            .map_err(|(err, _)| EventError::Broker(err.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    #[instrument(skip(self, event), fields(event_type = ?event.event_type, event_id = %event.event_id))]
    async fn publish(&self, event: Event) -> Result<(), EventError> {
        self.send_one(&event).await
    }

    async fn publish_batch(&self, events: Vec<Event>) -> Result<(), EventError> {
        let mut by_topic: HashMap<String, Vec<Event>> = HashMap::new();
        for event in events {
            by_topic.entry(event.topic()).or_default().push(event);
        }
        for (topic, events) in by_topic {
            for event in events {
                if let Err(err) = self.send_one(&event).await {
                    warn!(topic, error = %err, "batch publish failed for one event");
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}
