//! `/healthz` and `/metrics`: the only two endpoints §6 says the core
//! itself must expose. `/healthz` aggregates every registered adapter's
//! `Health()` (per-adapter connector/catalog/cache/event-bus detail) and
//! the Kubernetes adapter's `healthy_clusters / total_clusters` ratio into
//! one overall status; `/metrics` renders the shared Prometheus registry.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use dictamesh_adapter::{Adapter, HealthStatus as AdapterHealthStatus};
use dictamesh_k8s::K8sAdapter;
use dictamesh_observability::MetricRegistry;

/// One adapter's reported health, named so the aggregate JSON body reads
/// like `{"adapters": {"products": {...}}, "kubernetes": {...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallHealth {
    pub status: &'static str,
    pub components: std::collections::BTreeMap<String, ComponentHealth>,
}

/// Everything the health/metrics routes need a handle to. Cloned per
/// request (cheap: every field is an `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricRegistry>,
    pub adapters: Vec<Arc<Adapter>>,
    pub k8s: Option<Arc<K8sAdapter>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Response {
    let mut components = std::collections::BTreeMap::new();
    let mut healthy = 0usize;
    let mut total = 0usize;

    for adapter in &state.adapters {
        let report = adapter.health().await;
        total += 1;
        let status = match report.status {
            AdapterHealthStatus::Healthy => {
                healthy += 1;
                "healthy"
            }
            AdapterHealthStatus::Degraded => "degraded",
            AdapterHealthStatus::Unhealthy => "unhealthy",
        };
        components.insert(
            adapter.config().name.clone(),
            ComponentHealth { status, detail: serde_json::to_value(&report).unwrap_or_default() },
        );
    }

    if let Some(k8s) = &state.k8s {
        let report = k8s.health().await;
        total += 1;
        let status = match report.status {
            dictamesh_k8s::HealthStatus::Healthy => {
                healthy += 1;
                "healthy"
            }
            dictamesh_k8s::HealthStatus::Degraded => "degraded",
            dictamesh_k8s::HealthStatus::Unhealthy => "unhealthy",
        };
        components.insert(
            "kubernetes".to_string(),
            ComponentHealth { status, detail: serde_json::to_value(&report).unwrap_or_default() },
        );
    }

    let overall_status = if total == 0 || healthy == total {
        "healthy"
    } else if healthy == 0 {
        "unhealthy"
    } else {
        "degraded"
    };

    let code = match overall_status {
        "healthy" => StatusCode::OK,
        "degraded" => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };

    (code, Json(OverallHealth { status: overall_status, components })).into_response()
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    #[tokio::test]
    async fn healthz_with_no_adapters_reports_healthy() {
        let state = AppState { metrics: MetricRegistry::shared(), adapters: Vec::new(), k8s: None };
        let app = router(state);
        let response = app
            .oneshot(axum::http::Request::builder().uri("/healthz").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_prometheus_text() {
        let metrics = MetricRegistry::shared();
        metrics.cache_hits_total.with_label_values(&["l1"]).inc();
        let state = AppState { metrics, adapters: Vec::new(), k8s: None };
        let app = router(state);
        let response = app
            .oneshot(axum::http::Request::builder().uri("/metrics").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("cache_hits_total"));
    }
}
