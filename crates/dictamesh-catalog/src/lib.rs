//! ACID metadata catalog: the repository contract, its Postgres
//! implementation with a transactional outbox, a retention sweeper for
//! tombstoned entities, and an in-memory test double.

pub mod catalog_row;
pub mod error;
pub mod lineage;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod repository;
pub mod search;
pub mod sweeper;

pub use error::CatalogError;
pub use lineage::LineageEdge;
pub use memory::InMemoryCatalog;
pub use outbox::OutboxDispatcher;
pub use postgres::PostgresCatalog;
pub use repository::{CatalogRepository, GetOptions};
pub use search::{SearchQuery, SearchResults};
pub use sweeper::RetentionSweeper;
