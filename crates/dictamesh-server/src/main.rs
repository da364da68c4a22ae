//! The process entrypoint: loads configuration, wires the catalog,
//! event bus, cache, and (if configured) the Kubernetes adapter together,
//! and serves `/healthz` and `/metrics` until a shutdown signal arrives.
//!
//! REST/database adapters are assembled per-deployment from
//! `AdapterConfig` + a connector built through `dictamesh_connector`'s
//! registry; wiring a specific fleet of them is left to the deployment's
//! own composition (a thin binary or config file listing adapter specs),
//! matching the gateway/dashboards/CLI split §1 puts outside the core.
//! This binary always brings up the catalog, event bus, cache, and the
//! Kubernetes adapter, since those are always part of the core process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dictamesh_catalog::{CatalogRepository, InMemoryCatalog, OutboxDispatcher, PostgresCatalog, RetentionSweeper};
use dictamesh_events::{InMemoryBus, KafkaProducer, KafkaProducerConfig, Producer, SchemaRegistry};
use dictamesh_k8s::K8sAdapter;
use dictamesh_server::health::{router, AppState};
use dictamesh_server::Config;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = dictamesh_server::config::load().context("loading configuration")?;
    dictamesh_observability::init(config.service_name.clone()).context("initializing tracing")?;
    let metrics = dictamesh_observability::MetricRegistry::shared();

    info!(service = %config.service_name, "starting dictamesh core");

    let (catalog, outbox_shutdown): (Arc<dyn CatalogRepository>, Option<tokio::sync::watch::Sender<bool>>) =
        if config.catalog.database_url.is_empty() {
            warn!("catalog.database_url is empty; running against the in-memory catalog test double");
            (Arc::new(InMemoryCatalog::new()), None)
        } else {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.catalog.max_connections)
                .connect(&config.catalog.database_url)
                .await
                .context("connecting to the catalog database")?;
            sqlx::migrate!("../dictamesh-catalog/migrations").run(&pool).await.context("running catalog migrations")?;

            let producer = build_producer(&config)?;
            let dispatcher = OutboxDispatcher::new(pool.clone(), producer, Duration::from_millis(250), 100);
            let sweeper = RetentionSweeper::new(pool.clone(), Duration::from_secs(3600), 90);
            let (tx, rx) = tokio::sync::watch::channel(false);
            let sweeper_rx = rx.clone();
            tokio::spawn(async move { dispatcher.run(rx).await });
            tokio::spawn(async move { sweeper.run(sweeper_rx).await });

            (Arc::new(PostgresCatalog::new(pool, config.catalog.shard)), Some(tx))
        };

    let k8s = if config.kubernetes.clusters.is_empty() {
        None
    } else {
        let producer = build_producer(&config)?;
        let adapter = Arc::new(K8sAdapter::new(config.kubernetes.clone(), catalog.clone(), producer));
        adapter.initialize().await.context("initializing kubernetes adapter")?;
        adapter.start_resync().await;
        Some(adapter)
    };

    let state = AppState { metrics, adapters: Vec::new(), k8s: k8s.clone() };
    let app = router(state).layer(tower::limit::ConcurrencyLimitLayer::new(config.server.concurrency_limit)).layer(
        tower_http::trace::TraceLayer::new_for_http(),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.context("binding listener")?;
    info!(%addr, "serving /healthz and /metrics");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.context("serving http")?;

    if let Some(tx) = outbox_shutdown {
        let _ = tx.send(true);
    }
    if let Some(adapter) = k8s {
        adapter.stop_resync().await;
    }

    info!("dictamesh core stopped cleanly");
    Ok(())
}

fn build_producer(config: &Config) -> anyhow::Result<Arc<dyn Producer>> {
    if config.events.bootstrap_servers.is_empty() {
        warn!("events.bootstrap_servers is empty; running against the in-memory event bus test double");
        return Ok(Arc::new(InMemoryBus::new()));
    }
    let kafka_config = KafkaProducerConfig {
        bootstrap_servers: config.events.bootstrap_servers.clone(),
        ..Default::default()
    };
    let registry = Arc::new(SchemaRegistry::new());
    Ok(Arc::new(KafkaProducer::new(kafka_config, registry).context("constructing kafka producer")?))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("installing SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining in-flight requests");
}
