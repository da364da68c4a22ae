//! Adapter runtime: the lifecycle state machine, transform/validate
//! pipeline, full/incremental/webhook sync drivers, and webhook ingestion
//! wired over a connector/catalog/cache/event stack.

pub mod config;
pub mod runtime;
pub mod singleflight;
pub mod subgraph;
pub mod sync;
pub mod transform;
pub mod validator;
pub mod webhook;

pub use config::{AdapterConfig, SloConfig, SyncConfig, SyncMode, WebhookConfig};
pub use runtime::{Adapter, EntityLookup, HealthReport, HealthStatus};
pub use singleflight::{SharedSingleFlight, SingleFlight};
pub use subgraph::{EntityReference, NoopSubgraphRegistry, ResolveReference, SubgraphRegistry};
pub use transform::{assemble_entity, PassthroughTransform, Transform, TransformedEntity};
pub use validator::Validator;
