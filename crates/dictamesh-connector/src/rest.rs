//! The `rest` built-in connector factory: a generic JSON/HTTP source.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, warn};
use url::Url;

use crate::auth::SharedAuth;
use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::types::{Capabilities, ExecuteResult, FetchPage, FetchRequest, Pagination, Record};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    pub base_url: Url,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub max_page_size: u32,
    /// Path under `base_url` for a resource name, e.g. `"{resource}"`.
    pub resource_path_template: String,
    /// JSON-pointer-style key inside the response body holding the
    /// record array, `None` when the body itself is the array.
    pub records_pointer: Option<String>,
    /// Key holding a declared total count, if the API reports one.
    pub total_pointer: Option<String>,
    /// Key holding a next-page cursor token, if the API uses one.
    pub next_cursor_pointer: Option<String>,
}

impl RestConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout: Duration::from_secs(30),
            max_page_size: 500,
            resource_path_template: "{resource}".to_string(),
            records_pointer: None,
            total_pointer: None,
            next_cursor_pointer: None,
        }
    }
}

pub struct RestConnector {
    http: reqwest::Client,
    config: RestConfig,
    auth: Option<SharedAuth>,
}

impl RestConnector {
    pub fn new(config: RestConfig, auth: Option<SharedAuth>) -> Result<Self, ConnectorError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConnectorError::Internal(e.into()))?;
        Ok(Self { http, config, auth })
    }

    fn resource_url(&self, resource: &str) -> Result<Url, ConnectorError> {
        let path = self.config.resource_path_template.replace("{resource}", resource);
        self.config
            .base_url
            .join(&path)
            .map_err(|e| ConnectorError::BadRequest(e.to_string()))
    }

    fn apply_pagination(builder: reqwest::RequestBuilder, pagination: &Pagination) -> reqwest::RequestBuilder {
        match pagination {
            Pagination::OffsetLimit { offset, limit } => {
                builder.query(&[("offset", offset.to_string()), ("limit", limit.to_string())])
            }
            Pagination::Cursor { token, limit } => {
                let mut builder = builder.query(&[("limit", limit.to_string())]);
                if let Some(token) = token {
                    builder = builder.query(&[("cursor", token.clone())]);
                }
                builder
            }
            Pagination::PageNumber { page, page_size } => {
                builder.query(&[("page", page.to_string()), ("page_size", page_size.to_string())])
            }
        }
    }

    fn extract_pointer<'a>(body: &'a Json, pointer: &str) -> Option<&'a Json> {
        body.pointer(&format!("/{}", pointer.replace('.', "/")))
    }

    fn parse_records(&self, body: &Json) -> Vec<Record> {
        let array = match &self.config.records_pointer {
            Some(pointer) => Self::extract_pointer(body, pointer),
            None => Some(body),
        };
        let Some(Json::Array(items)) = array else {
            warn!("rest connector response did not contain the expected record array");
            return Vec::new();
        };
        items
            .iter()
            .map(|item| {
                let id = item
                    .get("id")
                    .and_then(Json::as_str)
                    .map(str::to_string)
                    .unwrap_or_default();
                let data = match item {
                    Json::Object(map) => map.clone().into_iter().collect::<HashMap<_, _>>(),
                    other => HashMap::from([("value".to_string(), other.clone())]),
                };
                Record {
                    id,
                    data,
                    metadata: HashMap::new(),
                    observed_at: Utc::now(),
                }
            })
            .collect()
    }
}

#[async_trait]
impl Connector for RestConnector {
    async fn connect(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ConnectorError> {
        let response = self
            .http
            .get(self.config.base_url.clone())
            .send()
            .await
            .map_err(|e| ConnectorError::Unavailable(e.to_string()))?;
        if response.status().is_server_error() {
            return Err(ConnectorError::Unavailable(format!("health check returned {}", response.status())));
        }
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            streaming: false,
            pagination: true,
            filtering: true,
            sorting: true,
            aggregation: false,
            transactions: false,
            max_page_size: Some(self.config.max_page_size),
            advertised_rate_limit: None,
        }
    }

    async fn fetch(&self, req: &FetchRequest) -> Result<FetchPage, ConnectorError> {
        let url = self.resource_url(&req.resource)?;
        let mut builder = self.http.get(url);
        builder = Self::apply_pagination(builder, &req.pagination);
        for (key, value) in &req.filter {
            if let Some(s) = value.as_str() {
                builder = builder.query(&[(key.as_str(), s)]);
            } else {
                builder = builder.query(&[(key.as_str(), value.to_string())]);
            }
        }
        if let Some(auth) = &self.auth {
            builder = auth.authenticate(builder).await?;
        }

        let response = builder.send().await.map_err(|e| ConnectorError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ConnectorError::AuthFailed(format!("source returned {status}")));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(1));
            return Err(ConnectorError::RateLimited { retry_after });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ConnectorError::NotFound(req.resource.clone()));
        }
        if !status.is_success() {
            return Err(ConnectorError::Unavailable(format!("unexpected status {status}")));
        }

        let body: Json = response.json().await.map_err(|e| ConnectorError::BadRequest(e.to_string()))?;
        let records = self.parse_records(&body);
        let total = self
            .config
            .total_pointer
            .as_deref()
            .and_then(|p| Self::extract_pointer(&body, p))
            .and_then(Json::as_u64);
        let next_cursor = self
            .config
            .next_cursor_pointer
            .as_deref()
            .and_then(|p| Self::extract_pointer(&body, p))
            .and_then(Json::as_str)
            .map(str::to_string);

        debug!(resource = %req.resource, count = records.len(), "rest connector fetched page");
        Ok(FetchPage { records, total, next_cursor })
    }

    async fn execute(&self, resource: &str, payload: Json) -> Result<ExecuteResult, ConnectorError> {
        let url = self.resource_url(resource)?;
        let mut builder = self.http.post(url).json(&payload);
        if let Some(auth) = &self.auth {
            builder = auth.authenticate(builder).await?;
        }
        let response = builder.send().await.map_err(|e| ConnectorError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ConnectorError::Unavailable(format!("execute returned {}", response.status())));
        }
        let body: Json = response.json().await.unwrap_or(Json::Null);
        let records = self.parse_records(&body);
        Ok(ExecuteResult { affected: records.len() as u64, returning: records })
    }
}
