//! Physical purge of tombstoned entities once their retention window has
//! elapsed.

use std::time::Duration;

use sqlx::PgPool;
use tracing::{error, info};

use crate::error::CatalogError;

pub struct RetentionSweeper {
    pool: PgPool,
    interval: Duration,
    default_retention_days: u32,
}

impl RetentionSweeper {
    pub fn new(pool: PgPool, interval: Duration, default_retention_days: u32) -> Self {
        Self { pool, interval, default_retention_days }
    }

    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            match self.sweep_once().await {
                Ok(purged) if purged > 0 => info!(purged, "retention sweep purged tombstoned entities"),
                Ok(_) => {}
                Err(err) => error!(error = %err, "retention sweep failed"),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("retention sweeper shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Deletes tombstoned rows whose `governance.retention_days` (or the
    /// sweeper's default) has elapsed since `updated_at`.
    pub async fn sweep_once(&self) -> Result<u64, CatalogError> {
        let result = sqlx::query(
            "delete from dictamesh_entity_catalog where lifecycle = 'deleted' \
             and updated_at < now() - make_interval(days => coalesce((governance->>'retention_days')::int, $1))",
        )
        .bind(self.default_retention_days as i32)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
