//! Request/response shapes shared by every connector.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// How a `FetchRequest` should paginate through results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pagination {
    OffsetLimit { offset: u64, limit: u32 },
    Cursor { token: Option<String>, limit: u32 },
    PageNumber { page: u32, page_size: u32 },
}

impl Pagination {
    pub fn offset_limit(offset: u64, limit: u32) -> Self {
        Pagination::OffsetLimit { offset, limit }
    }

    pub fn first_page(limit: u32) -> Self {
        Pagination::Cursor { token: None, limit }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

/// A request to fetch a page of records from a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub resource: String,
    #[serde(default)]
    pub filter: HashMap<String, Json>,
    pub pagination: Pagination,
    #[serde(default)]
    pub sort: Vec<SortField>,
    #[serde(default)]
    pub projection: Vec<String>,
    #[serde(default)]
    pub options: HashMap<String, Json>,
}

impl FetchRequest {
    pub fn new(resource: impl Into<String>, pagination: Pagination) -> Self {
        Self {
            resource: resource.into(),
            filter: HashMap::new(),
            pagination,
            sort: Vec::new(),
            projection: Vec::new(),
            options: HashMap::new(),
        }
    }
}

/// A single row returned by a connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub data: HashMap<String, Json>,
    #[serde(default)]
    pub metadata: HashMap<String, Json>,
    pub observed_at: DateTime<Utc>,
}

/// What a `Fetch` call returns: the page of records, an optional known
/// total, and an opaque cursor for the next page if one exists.
#[derive(Debug, Clone)]
pub struct FetchPage {
    pub records: Vec<Record>,
    pub total: Option<u64>,
    pub next_cursor: Option<String>,
}

impl FetchPage {
    pub fn is_last_page(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Capability flags a connector advertises.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub streaming: bool,
    pub pagination: bool,
    pub filtering: bool,
    pub sorting: bool,
    pub aggregation: bool,
    pub transactions: bool,
    pub max_page_size: Option<u32>,
    pub advertised_rate_limit: Option<u32>,
}

/// The outcome of a mutating `Execute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub affected: u64,
    pub returning: Vec<Record>,
}
