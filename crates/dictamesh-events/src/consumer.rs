//! Consumer contract: subscribe, decode, dispatch to handlers, commit or
//! route to DLQ.

use std::sync::Arc;

use async_trait::async_trait;
use dictamesh_types::Event;
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer as _, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use tracing::{error, info, warn};

use crate::codec;
use crate::error::EventError;
use crate::idempotency::IdempotencyStore;
use crate::schema_registry::SchemaRegistry;
use crate::topics::dlq_topic;

/// A registered handler for one or more event types.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// The envelope routed to a DLQ topic: the original bytes plus failure
/// context.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeadLetter {
    pub original_topic: String,
    pub original_payload: Vec<u8>,
    pub failure_reason: String,
    pub attempts: u32,
    pub first_failed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct KafkaConsumerConfig {
    pub bootstrap_servers: String,
    pub group_id: String,
    #[serde(default = "default_max_handler_retries")]
    pub max_handler_retries: u32,
}

fn default_max_handler_retries() -> u32 {
    3
}

/// Fetches messages, decodes via the schema registry, dispatches to
/// handlers in declaration order, commits on success, and routes to the
/// per-topic DLQ after exhausting retries.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    dlq_producer: FutureProducer,
    registry: Arc<SchemaRegistry>,
    idempotency: Arc<IdempotencyStore>,
    handlers: Vec<Arc<dyn Handler>>,
    max_handler_retries: u32,
}

impl KafkaConsumer {
    pub fn new(
        config: KafkaConsumerConfig,
        registry: Arc<SchemaRegistry>,
        idempotency: Arc<IdempotencyStore>,
    ) -> Result<Self, EventError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| EventError::Broker(e.to_string()))?;
        let dlq_producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| EventError::Broker(e.to_string()))?;
        Ok(Self {
            consumer,
            dlq_producer,
            registry,
            idempotency,
            handlers: Vec::new(),
            max_handler_retries: config.max_handler_retries,
        })
    }

    pub fn subscribe(&self, topics: &[&str]) -> Result<(), EventError> {
        self.consumer.subscribe(topics).map_err(|e| EventError::Broker(e.to_string()))
    }

    pub fn register_handler(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.push(handler);
    }

    /// Drains the subscription, running every registered handler against
    /// each decoded event. Returns when the stream ends (for tests); in
    /// production this future is spawned and runs indefinitely.
    pub async fn run(&self) -> Result<(), EventError> {
        let mut stream = self.consumer.stream();
        while let Some(message) = stream.next().await {
            let message = match message {
                Ok(m) => m,
                Err(err) => {
                    warn!(error = %err, "kafka consumer poll error");
                    continue;
                }
            };
            let topic = message.topic().to_string();
            let payload = message.payload().unwrap_or_default().to_vec();

            match self.process(&topic, &payload).await {
                Ok(()) => {
                    if let Err(err) = self.consumer.commit_message(&message, rdkafka::consumer::CommitMode::Async) {
                        warn!(error = %err, "failed to commit offset after successful processing");
                    }
                }
                Err(err) => {
                    error!(topic, error = %err, "event processing exhausted retries, routing to dlq");
                    if let Err(dlq_err) = self.send_to_dlq(&topic, &payload, &err.to_string()).await {
                        error!(topic, error = %dlq_err, "failed to route message to dlq");
                    }
                    if let Err(err) = self.consumer.commit_message(&message, rdkafka::consumer::CommitMode::Async) {
                        warn!(error = %err, "failed to commit offset after dlq routing");
                    }
                }
            }
        }
        Ok(())
    }

    async fn process(&self, _topic: &str, payload: &[u8]) -> Result<(), EventError> {
        let (_, event) = codec::decode(&self.registry, payload)?;

        if self.idempotency.already_processed(event.event_id) {
            info!(event_id = %event.event_id, "skipping already-processed event");
            return Ok(());
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut failed = None;
            for handler in &self.handlers {
                if let Err(err) = handler.handle(&event).await {
                    failed = Some(err);
                    break;
                }
            }
            match failed {
                None => {
                    self.idempotency.mark_processed(event.event_id);
                    return Ok(());
                }
                Some(err) if attempt < self.max_handler_retries => {
                    warn!(event_id = %event.event_id, attempt, error = %err, "handler failed, retrying");
                    continue;
                }
                Some(err) => return Err(EventError::HandlerFailed(err)),
            }
        }
    }

    async fn send_to_dlq(&self, original_topic: &str, payload: &[u8], reason: &str) -> Result<(), EventError> {
        let dead_letter = DeadLetter {
            original_topic: original_topic.to_string(),
            original_payload: payload.to_vec(),
            failure_reason: reason.to_string(),
            attempts: self.max_handler_retries,
            first_failed_at: chrono::Utc::now(),
        };
        let body = serde_json::to_vec(&dead_letter).map_err(|e| EventError::Broker(e.to_string()))?;
        let topic = dlq_topic(original_topic);
        let record: FutureRecord<'_, (), Vec<u8>> = FutureRecord::to(&topic).payload(&body);
        self.dlq_producer
            .send(record, std::time::Duration::from_secs(10))
            .await
            .map_err(|(err, _)| EventError::Broker(err.to_string()))?;
        Ok(())
    }
}
