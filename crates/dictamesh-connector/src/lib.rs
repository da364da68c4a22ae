//! Connector abstraction: the trait every source implements, pluggable
//! auth and pagination, and the process-wide connector registry.

pub mod auth;
pub mod connector;
pub mod error;
pub mod pagination;
pub mod registry;
pub mod rest;
pub mod types;

pub use auth::{ApiKeyAuth, AuthProvider, BasicAuth, BearerTokenAuth, OAuth2Auth, SharedAuth, SignedJwtAuth};
pub use connector::{Connector, StreamItem};
pub use error::ConnectorError;
pub use registry::{ConnectorFactory, ConnectorRegistry, RegistryError};
pub use rest::{RestConfig, RestConnector};
pub use types::{Capabilities, ExecuteResult, FetchPage, FetchRequest, Pagination, Record, SortDirection, SortField};
