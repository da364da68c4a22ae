//! Canonical data model for the dictamesh core.
//!
//! Shared by every other crate in the workspace: the catalog, event
//! pipeline, adapter runtime, and Kubernetes adapter all speak in terms of
//! [`entity::Entity`], [`relationship::Relationship`], [`schema::Schema`],
//! and [`event::Event`].

pub mod catalog_row;
pub mod entity;
pub mod error;
pub mod event;
pub mod id;
pub mod lifecycle;
pub mod relationship;
pub mod schema;
pub mod value;

pub use catalog_row::CatalogRow;
pub use entity::{Entity, EntityLifecycle, EntityMetadata};
pub use error::{ErrorKind, MeshError};
pub use event::{Event, EventBuilder, EventType};
pub use id::{EntityId, RowId};
pub use lifecycle::{AdapterAction, AdapterState};
pub use relationship::{Cardinality, Relationship};
pub use schema::{Compatibility, Schema, SchemaFormat};
pub use value::{changed_fields, AttributeMap, Value};
