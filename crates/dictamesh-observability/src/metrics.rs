//! The process-wide metric registry: one `prometheus::Registry` with the
//! standard families pre-registered, handed out as a single `Arc` so every
//! subsystem records into the same registry rather than each owning its own.

use std::sync::Arc;

use prometheus::{CounterVec, Encoder, GaugeVec, HistogramVec, Opts, Registry, TextEncoder};

/// Every family is labeled by `component` (`cache`, `catalog`, `connector`,
/// `adapter`, `k8s`, ...) rather than minted per-crate, so a single process
/// exposes one `/metrics` surface instead of namespacing by crate prefix.
#[derive(Clone)]
pub struct MetricRegistry {
    registry: Registry,
    pub requests_total: CounterVec,
    pub request_duration_seconds: HistogramVec,
    pub errors_total: CounterVec,
    pub cache_hits_total: CounterVec,
    pub cache_misses_total: CounterVec,
    pub events_published_total: CounterVec,
    pub events_consumed_total: CounterVec,
    pub consumer_lag_messages: GaugeVec,
    pub breaker_state: GaugeVec,
    pub connector_pool_in_use: GaugeVec,
}

impl MetricRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("requests_total", "Total requests handled, by component/operation/status."),
            &["component", "op", "status"],
        )
        .expect("static metric definition");

        let request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("request_duration_seconds", "Request latency in seconds, by component/operation.")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["component", "op"],
        )
        .expect("static metric definition");

        let errors_total = CounterVec::new(
            Opts::new("errors_total", "Total errors, by component/operation/error kind."),
            &["component", "op", "kind"],
        )
        .expect("static metric definition");

        let cache_hits_total =
            CounterVec::new(Opts::new("cache_hits_total", "Cache hits, by level (l1/l2)."), &["level"])
                .expect("static metric definition");

        let cache_misses_total =
            CounterVec::new(Opts::new("cache_misses_total", "Cache misses."), &["level"]).expect("static metric definition");

        let events_published_total =
            CounterVec::new(Opts::new("events_published_total", "Events published, by topic."), &["topic"])
                .expect("static metric definition");

        let events_consumed_total =
            CounterVec::new(Opts::new("events_consumed_total", "Events consumed, by topic."), &["topic"])
                .expect("static metric definition");

        let consumer_lag_messages = GaugeVec::new(
            Opts::new("consumer_lag_messages", "Estimated consumer lag in messages, by topic/group."),
            &["topic", "group"],
        )
        .expect("static metric definition");

        let breaker_state = GaugeVec::new(
            Opts::new("breaker_state", "Circuit breaker state by name: 0=closed, 1=half_open, 2=open."),
            &["name"],
        )
        .expect("static metric definition");

        let connector_pool_in_use = GaugeVec::new(
            Opts::new("connector_pool_in_use", "In-flight connector calls currently holding a pool slot."),
            &["connector"],
        )
        .expect("static metric definition");

        for collector in [
            Box::new(requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(request_duration_seconds.clone()),
            Box::new(errors_total.clone()),
            Box::new(cache_hits_total.clone()),
            Box::new(cache_misses_total.clone()),
            Box::new(events_published_total.clone()),
            Box::new(events_consumed_total.clone()),
            Box::new(consumer_lag_messages.clone()),
            Box::new(breaker_state.clone()),
            Box::new(connector_pool_in_use.clone()),
        ] {
            registry.register(collector).expect("metric names are unique and static");
        }

        Self {
            registry,
            requests_total,
            request_duration_seconds,
            errors_total,
            cache_hits_total,
            cache_misses_total,
            events_published_total,
            events_consumed_total,
            consumer_lag_messages,
            breaker_state,
            connector_pool_in_use,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Records a completed call: bumps `requests_total`, observes
    /// `request_duration_seconds`, and (on a non-`"ok"` status) bumps
    /// `errors_total` with `kind`.
    pub fn observe_call(&self, component: &str, op: &str, status: &str, duration_seconds: f64, error_kind: Option<&str>) {
        self.requests_total.with_label_values(&[component, op, status]).inc();
        self.request_duration_seconds.with_label_values(&[component, op]).observe(duration_seconds);
        if let Some(kind) = error_kind {
            self.errors_total.with_label_values(&[component, op, kind]).inc();
        }
    }

    /// Renders the registry in the Prometheus text exposition format, for
    /// serving behind a `/metrics` endpoint.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_call_increments_requests_and_records_duration() {
        let registry = MetricRegistry::new();
        registry.observe_call("catalog", "get", "ok", 0.012, None);
        assert_eq!(registry.requests_total.with_label_values(&["catalog", "get", "ok"]).get(), 1.0);
    }

    #[test]
    fn observe_call_with_error_kind_bumps_errors_total() {
        let registry = MetricRegistry::new();
        registry.observe_call("catalog", "get", "error", 0.001, Some("not_found"));
        assert_eq!(registry.errors_total.with_label_values(&["catalog", "get", "not_found"]).get(), 1.0);
    }

    #[test]
    fn encode_produces_prometheus_text_format() {
        let registry = MetricRegistry::new();
        registry.cache_hits_total.with_label_values(&["l1"]).inc();
        let text = registry.encode().expect("encodes cleanly");
        assert!(text.contains("cache_hits_total"));
    }
}
