//! An in-memory ordered/partitioned bus, standing in for a broker in
//! tests and small deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use dictamesh_types::Event;

use crate::consumer::Handler;
use crate::error::EventError;
use crate::producer::Producer;

#[derive(Default)]
struct TopicLog {
    /// partition key -> ordered events, preserving the single-entity
    /// ordering the partition-key rule guarantees.
    partitions: HashMap<String, Vec<Event>>,
}

/// A topic -> partitioned, ordered event log plus registered handlers,
/// entirely in-process. `publish` dispatches synchronously to every
/// handler subscribed to the event's topic, so tests can assert on
/// delivery without spinning up a broker.
pub struct InMemoryBus {
    topics: Mutex<HashMap<String, TopicLog>>,
    handlers: Mutex<HashMap<String, Vec<Arc<dyn Handler>>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self { topics: Mutex::new(HashMap::new()), handlers: Mutex::new(HashMap::new()) }
    }

    pub fn subscribe(&self, topic: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.lock().entry(topic.into()).or_default().push(handler);
    }

    pub fn topic_events(&self, topic: &str) -> Vec<Event> {
        self.topics
            .lock()
            .get(topic)
            .map(|log| log.partitions.values().flatten().cloned().collect())
            .unwrap_or_default()
    }

    pub fn partition_events(&self, topic: &str, partition_key: &str) -> Vec<Event> {
        self.topics
            .lock()
            .get(topic)
            .and_then(|log| log.partitions.get(partition_key).cloned())
            .unwrap_or_default()
    }

    async fn dispatch_one(&self, event: Event) -> Result<(), EventError> {
        let topic = event.topic();
        {
            let mut topics = self.topics.lock();
            let log = topics.entry(topic.clone()).or_default();
            log.partitions.entry(event.partition_key().to_string()).or_default().push(event.clone());
        }
        let handlers = { self.handlers.lock().get(&topic).cloned().unwrap_or_default() };
        for handler in handlers {
            handler.handle(&event).await.map_err(EventError::HandlerFailed)?;
        }
        Ok(())
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for InMemoryBus {
    async fn publish(&self, event: Event) -> Result<(), EventError> {
        self.dispatch_one(event).await
    }

    async fn publish_batch(&self, events: Vec<Event>) -> Result<(), EventError> {
        for event in events {
            self.dispatch_one(event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dictamesh_types::{EntityId, EventBuilder, EventType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl Handler for CountingHandler {
        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event(entity: &str) -> Event {
        EventBuilder::new("rest-catalog")
            .entity(EntityId::new("product", entity))
            .payload(serde_json::json!({"id": entity}))
            .build(EventType::EntityCreated, Uuid::new_v4(), chrono::Utc::now())
            .unwrap()
    }

    #[tokio::test]
    async fn publish_preserves_per_partition_order() {
        let bus = InMemoryBus::new();
        bus.publish(event("1")).await.unwrap();
        bus.publish(event("2")).await.unwrap();
        bus.publish(event("1")).await.unwrap();

        let events = bus.partition_events("dictamesh.events.entity.created", "product:1");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload["id"], "1");
        assert_eq!(events[1].payload["id"], "1");
    }

    #[tokio::test]
    async fn subscribed_handler_receives_every_publish() {
        let bus = InMemoryBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe("dictamesh.events.entity.created", Arc::new(CountingHandler(count.clone())));

        bus.publish(event("1")).await.unwrap();
        bus.publish(event("2")).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
