//! Full and incremental sync drivers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dictamesh_connector::{FetchRequest, Pagination};
use dictamesh_types::{EventType, MeshError};
use tracing::{error, info, warn};

use crate::runtime::Adapter;

/// Runs a full sync: pages through the connector's list in pages of
/// `page_size`, upserting each record, sleeping between pages so the
/// sustained rate never exceeds `rate_limit` pages/sec. Emits
/// `sync.started`/`sync.completed`/`sync.failed`.
///
/// `resource` names both the connector resource to list and the entity
/// type its records are transformed into — this runtime only supports
/// adapters where the two coincide.
pub async fn full_sync(adapter: &Arc<Adapter>, resource: &str) -> Result<u64, MeshError> {
    adapter.emit_sync_event(EventType::SyncStarted, serde_json::json!({"resource": resource})).await;

    let result = run_full_sync(adapter, resource).await;

    match &result {
        Ok(count) => {
            adapter
                .emit_sync_event(EventType::SyncCompleted, serde_json::json!({"resource": resource, "count": count}))
                .await;
        }
        Err(err) => {
            error!(resource, error = %err, "full sync failed");
            adapter
                .emit_sync_event(EventType::SyncFailed, serde_json::json!({"resource": resource, "error": err.message}))
                .await;
        }
    }
    result
}

async fn run_full_sync(adapter: &Arc<Adapter>, resource: &str) -> Result<u64, MeshError> {
    let page_size = adapter.config().sync.page_size;
    let rate = adapter.config().sync.rate_limit.max(1) as f64;
    let min_page_interval = Duration::from_secs_f64(1.0 / rate);

    let mut cursor: Option<String> = None;
    let mut total = 0u64;
    loop {
        let iter_start = Instant::now();
        let request = FetchRequest::new(resource, Pagination::Cursor { token: cursor.clone(), limit: page_size });
        let page = adapter.connector().fetch(&request).await.map_err(MeshError::from)?;

        for record in &page.records {
            match adapter.idempotent_upsert(resource, record).await {
                Ok(_) => total += 1,
                Err(err) => warn!(record_id = %record.id, error = %err, "full sync: record upsert failed, continuing"),
            }
        }

        if page.is_last_page() {
            break;
        }
        cursor = page.next_cursor;

        let elapsed = iter_start.elapsed();
        let sleep_for = min_page_interval.saturating_sub(elapsed);
        if !sleep_for.is_zero() {
            tokio::time::sleep(sleep_for).await;
        }
    }

    info!(resource, total, "full sync completed");
    Ok(total)
}

/// Runs an incremental sync against records modified since `since`,
/// processing tombstones (records whose `metadata.deleted` is `true`)
/// separately from upserts.
pub async fn incremental_sync(
    adapter: &Arc<Adapter>,
    resource: &str,
    since: DateTime<Utc>,
) -> Result<u64, MeshError> {
    adapter
        .emit_sync_event(EventType::SyncStarted, serde_json::json!({"resource": resource, "since": since}))
        .await;

    let result = run_incremental_sync(adapter, resource, since).await;

    match &result {
        Ok(count) => {
            adapter
                .emit_sync_event(EventType::SyncCompleted, serde_json::json!({"resource": resource, "count": count}))
                .await;
        }
        Err(err) => {
            error!(resource, error = %err, "incremental sync failed");
            adapter
                .emit_sync_event(EventType::SyncFailed, serde_json::json!({"resource": resource, "error": err.message}))
                .await;
        }
    }
    result
}

async fn run_incremental_sync(
    adapter: &Arc<Adapter>,
    resource: &str,
    since: DateTime<Utc>,
) -> Result<u64, MeshError> {
    let page_size = adapter.config().sync.page_size;
    let mut request = FetchRequest::new(resource, Pagination::Cursor { token: None, limit: page_size });
    request
        .filter
        .insert("modified_since".to_string(), serde_json::json!(since.to_rfc3339()));

    let mut cursor: Option<String> = None;
    let mut total = 0u64;
    loop {
        request.pagination = Pagination::Cursor { token: cursor.clone(), limit: page_size };
        let page = adapter.connector().fetch(&request).await.map_err(MeshError::from)?;

        for record in &page.records {
            let is_tombstone = record
                .metadata
                .get("deleted")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            let outcome = if is_tombstone {
                adapter.delete_by_source_id(resource, &record.id).await
            } else {
                adapter.idempotent_upsert(resource, record).await.map(|_| ())
            };

            match outcome {
                Ok(()) => total += 1,
                Err(err) => warn!(record_id = %record.id, error = %err, "incremental sync: record failed, continuing"),
            }
        }

        if page.is_last_page() {
            break;
        }
        cursor = page.next_cursor;
    }

    info!(resource, total, "incremental sync completed");
    Ok(total)
}
