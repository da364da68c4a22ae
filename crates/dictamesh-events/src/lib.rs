//! The partitioned event pipeline: Avro-over-a-schema-registry encoding,
//! producer/consumer with DLQ routing, replay, and saga causality.

pub mod bus;
pub mod codec;
pub mod consumer;
pub mod error;
pub mod idempotency;
pub mod producer;
pub mod replay;
pub mod schema_registry;
pub mod topics;

pub use bus::InMemoryBus;
pub use consumer::{DeadLetter, Handler, KafkaConsumer, KafkaConsumerConfig};
pub use error::EventError;
pub use idempotency::IdempotencyStore;
pub use producer::{Compression, KafkaProducer, KafkaProducerConfig, Producer};
pub use replay::{ReplayFrom, Replayer};
pub use schema_registry::SchemaRegistry;
