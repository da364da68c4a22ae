//! Catalog-specific failures, mapped onto the shared taxonomy.

use dictamesh_types::{ErrorKind, MeshError};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("entity {0} not found")]
    NotFound(String),

    #[error("entity from source ({0}, {1}) already exists")]
    AlreadyExists(String, String),

    #[error("relationship endpoint {0} does not exist and dangling=false")]
    DanglingEndpoint(String),

    #[error("schema for {entity_type} v{version} is incompatible with the latest registered version")]
    IncompatibleSchema { entity_type: String, version: u32 },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("outbox dispatch error: {0}")]
    Outbox(String),
}

impl From<CatalogError> for MeshError {
    fn from(err: CatalogError) -> Self {
        match &err {
            CatalogError::NotFound(_) => MeshError::new(ErrorKind::NotFound, err.to_string()),
            CatalogError::AlreadyExists(..) => MeshError::new(ErrorKind::AlreadyExists, err.to_string()),
            CatalogError::DanglingEndpoint(_) => MeshError::new(ErrorKind::Validation, err.to_string()),
            CatalogError::IncompatibleSchema { .. } => {
                MeshError::new(ErrorKind::SchemaIncompatible, err.to_string())
            }
            CatalogError::Storage(sqlx::Error::PoolTimedOut) => {
                MeshError::new(ErrorKind::Timeout, err.to_string())
            }
            CatalogError::Storage(_) => MeshError::new(ErrorKind::Unavailable, err.to_string()).with_source(err.into()),
            CatalogError::Outbox(_) => MeshError::new(ErrorKind::Internal, err.to_string()),
        }
    }
}
