//! The `dictamesh_event_outbox` table and the background dispatcher that drains it.

use std::sync::Arc;
use std::time::Duration;

use dictamesh_events::Producer;
use dictamesh_types::Event;
use sqlx::PgPool;
use sqlx::Row;
use tracing::{error, info, warn};

use crate::error::CatalogError;

/// Inserts an outbox row bound to `tx`'s transaction; the caller commits
/// alongside the row mutation that produced `event`.
pub async fn enqueue(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id_gen: &dictamesh_types::id::IdGenerator,
    event: &Event,
) -> Result<(), CatalogError> {
    let row_id = id_gen.next();
    let payload = serde_json::to_value(event).map_err(|e| CatalogError::Outbox(e.to_string()))?;
    sqlx::query(
        "insert into dictamesh_event_outbox (id, topic, partition_key, payload, created_at, sent_at) \
         values ($1, $2, $3, $4, now(), null)",
    )
    .bind(row_id.to_string())
    .bind(event.topic())
    .bind(event.partition_key())
    .bind(payload)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Polls `dictamesh_event_outbox` for unsent rows, publishes each via `producer`, and
/// marks it sent. Rows are claimed with `for update skip locked` so
/// multiple dispatcher instances (one per catalog replica) don't double-send.
pub struct OutboxDispatcher {
    pool: PgPool,
    producer: Arc<dyn Producer>,
    poll_interval: Duration,
    batch_size: i64,
}

impl OutboxDispatcher {
    pub fn new(pool: PgPool, producer: Arc<dyn Producer>, poll_interval: Duration, batch_size: i64) -> Self {
        Self { pool, producer, poll_interval, batch_size }
    }

    /// Runs the drain loop until `shutdown` resolves. Each iteration claims
    /// up to `batch_size` unsent rows, publishes them, and marks success;
    /// a publish failure leaves the row unsent for the next tick.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if let Err(err) = self.drain_once().await {
                error!(error = %err, "outbox drain iteration failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("outbox dispatcher shutting down");
                        return;
                    }
                }
            }
        }
    }

    pub async fn drain_once(&self) -> Result<usize, CatalogError> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            "select id, payload from dictamesh_event_outbox where sent_at is null \
             order by created_at for update skip locked limit $1",
        )
        .bind(self.batch_size)
        .fetch_all(&mut *tx)
        .await?;

        let mut sent_ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id")?;
            let payload: serde_json::Value = row.try_get("payload")?;
            let event: Event = match serde_json::from_value(payload) {
                Ok(event) => event,
                Err(err) => {
                    warn!(id, error = %err, "dropping unparseable outbox row");
                    sent_ids.push(id);
                    continue;
                }
            };
            if let Err(err) = self.producer.publish(event).await {
                warn!(id, error = %err, "outbox publish failed, leaving row unsent");
                continue;
            }
            sent_ids.push(id);
        }

        if !sent_ids.is_empty() {
            sqlx::query("update dictamesh_event_outbox set sent_at = now() where id = any($1)")
                .bind(&sent_ids)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(sent_ids.len())
    }
}
