//! Read-only replay of source topics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dictamesh_types::Event;
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::{Message, Offset, TopicPartitionList};

use crate::codec;
use crate::consumer::Handler;
use crate::error::EventError;
use crate::schema_registry::SchemaRegistry;

pub enum ReplayFrom {
    Timestamp(DateTime<Utc>),
    Offset(i64),
}

pub struct Replayer {
    consumer: StreamConsumer,
    registry: Arc<SchemaRegistry>,
}

impl Replayer {
    pub fn new(bootstrap_servers: &str, registry: Arc<SchemaRegistry>) -> Result<Self, EventError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("group.id", "dictamesh-replay")
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| EventError::Broker(e.to_string()))?;
        Ok(Self { consumer, registry })
    }

    fn seek(&self, topic: &str, partition: i32, from: &ReplayFrom) -> Result<(), EventError> {
        let mut assignment = TopicPartitionList::new();
        match from {
            ReplayFrom::Offset(offset) => {
                assignment
                    .add_partition_offset(topic, partition, Offset::Offset(*offset))
                    .map_err(|e| EventError::Broker(e.to_string()))?;
                self.consumer.assign(&assignment).map_err(|e| EventError::Broker(e.to_string()))?;
            }
            ReplayFrom::Timestamp(ts) => {
                let mut list = TopicPartitionList::new();
                list.add_partition_offset(topic, partition, Offset::Offset(ts.timestamp_millis()))
                    .map_err(|e| EventError::Broker(e.to_string()))?;
                let resolved = self
                    .consumer
                    .offsets_for_times(list, std::time::Duration::from_secs(10))
                    .map_err(|e| EventError::Broker(e.to_string()))?;
                self.consumer.assign(&resolved).map_err(|e| EventError::Broker(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Replays events from `topic`/`partition` starting at `from`,
    /// forwarding every event matching `predicate` to `handlers`.
    /// Handlers that want to emit use a separate producer instance — the
    /// replayer itself never writes to the source topic's offsets.
    pub async fn replay<P>(
        &self,
        topic: &str,
        partition: i32,
        from: ReplayFrom,
        predicate: P,
        handlers: &[Arc<dyn Handler>],
        limit: usize,
    ) -> Result<usize, EventError>
    where
        P: Fn(&Event) -> bool,
    {
        self.seek(topic, partition, &from)?;

        let mut replayed = 0;
        let stream = self.consumer.stream();
        tokio::pin!(stream);
        while replayed < limit {
            let Some(message) = stream.next().await else { break };
            let message = message.map_err(|e| EventError::Broker(e.to_string()))?;
            let payload = message.payload().unwrap_or_default();
            let (_, event) = codec::decode(&self.registry, payload)?;
            if !predicate(&event) {
                continue;
            }
            for handler in handlers {
                handler.handle(&event).await.map_err(EventError::HandlerFailed)?;
            }
            replayed += 1;
        }
        Ok(replayed)
    }
}
