//! Connector failure taxonomy.

use std::time::Duration;

use dictamesh_types::{ErrorKind, MeshError};

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("connector unavailable: {0}")]
    Unavailable(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal connector error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ConnectorError> for MeshError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::AuthFailed(msg) => MeshError::new(ErrorKind::AuthFailed, msg),
            ConnectorError::NotFound(msg) => MeshError::not_found(msg),
            ConnectorError::RateLimited { retry_after } => {
                MeshError::new(ErrorKind::RateLimited, "rate limited by source system")
                    .with_retry_after(retry_after)
            }
            ConnectorError::Unavailable(msg) => MeshError::unavailable(msg),
            ConnectorError::BadRequest(msg) => MeshError::validation(msg),
            ConnectorError::Internal(err) => {
                MeshError::internal("connector internal error").with_source(err)
            }
        }
    }
}
