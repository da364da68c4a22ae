//! Event pipeline failure taxonomy.

use dictamesh_types::{ErrorKind, MeshError};

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("no schema registered for {event_type:?} version {version}")]
    SchemaNotFound { event_type: String, version: u32 },
    #[error("schema registration rejected: {0}")]
    IncompatibleSchema(#[from] dictamesh_types::schema::CompatibilityViolation),
    #[error("avro codec error: {0}")]
    Codec(#[from] apache_avro::Error),
    #[error("broker error: {0}")]
    Broker(String),
    #[error("handler failed: {0}")]
    HandlerFailed(#[source] anyhow::Error),
    #[error("event is missing mandatory field {0:?}")]
    MissingField(&'static str),
}

impl From<EventError> for MeshError {
    fn from(err: EventError) -> Self {
        match &err {
            EventError::SchemaNotFound { .. } => MeshError::not_found(err.to_string()),
            EventError::IncompatibleSchema(_) => {
                MeshError::new(ErrorKind::SchemaIncompatible, err.to_string())
            }
            EventError::Codec(_) => MeshError::internal(err.to_string()),
            EventError::Broker(_) => MeshError::unavailable(err.to_string()),
            EventError::HandlerFailed(_) => MeshError::internal(err.to_string()),
            EventError::MissingField(_) => MeshError::validation(err.to_string()),
        }
    }
}
