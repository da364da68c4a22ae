//! The connector contract every source implements.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ConnectorError;
use crate::types::{Capabilities, ExecuteResult, FetchPage, FetchRequest, Record};

/// A record pulled from a streaming source, or an error observed
/// mid-stream. Streaming connectors push onto a combined channel rather
/// than failing the whole stream on one bad record.
pub type StreamItem = Result<Record, ConnectorError>;

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<(), ConnectorError>;
    async fn disconnect(&self) -> Result<(), ConnectorError>;
    async fn health_check(&self) -> Result<(), ConnectorError>;
    fn capabilities(&self) -> Capabilities;

    /// Pull-based fetch. Connectors that only support streaming should
    /// return `Unavailable`.
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchPage, ConnectorError> {
        let _ = req;
        Err(ConnectorError::Unavailable("connector does not support Fetch".into()))
    }

    /// Push-based fetch for sources best consumed as a stream (e.g. CDC
    /// feeds, long-poll APIs). Connectors that only support `Fetch`
    /// should return `Unavailable`.
    async fn stream(&self, req: &FetchRequest) -> Result<BoxStream<'static, StreamItem>, ConnectorError> {
        let _ = req;
        Err(ConnectorError::Unavailable("connector does not support Stream".into()))
    }

    /// Mutating operation against the source, for connectors whose
    /// capabilities advertise `transactions`.
    async fn execute(&self, resource: &str, payload: serde_json::Value) -> Result<ExecuteResult, ConnectorError> {
        let _ = (resource, payload);
        Err(ConnectorError::Unavailable("connector does not support Execute".into()))
    }
}
