//! A `tracing_subscriber::Layer` that serializes spans and events to a single
//! JSON line per record, carrying the fields every adapter's instrumented
//! operation is expected to emit: `ts, level, service, trace_id, span_id,
//! request_id, operation, duration_ms, status`.
//!
//! Modeled on a visitor-based layer that stashes a partially-built line as a
//! span extension and fills it in across `on_new_span`/`on_record`/
//! `on_event`, rather than reaching for `tracing_subscriber::fmt`'s built-in
//! JSON formatter, so field-level PII redaction can be applied uniformly.

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

use crate::redact::{is_pii_field, REDACTED};

#[derive(Debug, Clone, Serialize, Default)]
pub struct LogLine {
    pub level: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

impl LogLine {
    fn from_metadata(service: &str, metadata: &tracing::Metadata) -> Self {
        Self {
            level: metadata.level().to_string(),
            service: service.to_string(),
            message: metadata.name().to_string(),
            ..Default::default()
        }
    }
}

struct FieldVisitor<'a>(&'a mut LogLine);

impl<'a> FieldVisitor<'a> {
    fn record(&mut self, field: &tracing::field::Field, value: Value) {
        let name = field.name();
        let value = if is_pii_field(name) { Value::String(REDACTED.to_string()) } else { value };
        match name {
            "message" => {
                if let Value::String(s) = &value {
                    self.0.message = s.clone();
                }
            }
            "trace_id" => self.0.trace_id = value.as_str().map(str::to_string),
            "span_id" => self.0.span_id = value.as_str().map(str::to_string),
            "request_id" => self.0.request_id = value.as_str().map(str::to_string),
            "operation" => self.0.operation = value.as_str().map(str::to_string),
            "status" => self.0.status = value.as_str().map(str::to_string),
            "duration_ms" => self.0.duration_ms = value.as_u64(),
            _ => {
                self.0.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl<'a> tracing::field::Visit for FieldVisitor<'a> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.record(field, serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.record(field, serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.record(field, serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.record(field, serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record(field, serde_json::json!(value));
    }

    fn record_error(&mut self, field: &tracing::field::Field, value: &(dyn std::error::Error + 'static)) {
        self.record(field, serde_json::json!(value.to_string()));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.record(field, serde_json::json!(format!("{value:?}")));
    }
}

/// Emits one JSON line per span/event to the given writer. Construct with
/// [`JsonLayer::new`] and compose into a `tracing_subscriber::registry()`.
pub struct JsonLayer<W> {
    service: String,
    writer: W,
}

impl<W> JsonLayer<W>
where
    W: for<'w> Fn() -> Box<dyn Write + 'w> + Send + Sync,
{
    pub fn new(service: impl Into<String>, writer: W) -> Self {
        Self { service: service.into(), writer }
    }
}

impl<S, W> tracing_subscriber::Layer<S> for JsonLayer<W>
where
    S: tracing::Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'w> Fn() -> Box<dyn Write + 'w> + Send + Sync + 'static,
{
    fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, id: &tracing::span::Id, ctx: Context<'_, S>) {
        let mut line = LogLine::from_metadata(&self.service, attrs.metadata());
        attrs.record(&mut FieldVisitor(&mut line));
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(line);
        }
    }

    fn on_record(&self, id: &tracing::span::Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut extensions = span.extensions_mut();
            if let Some(line) = extensions.get_mut::<LogLine>() {
                values.record(&mut FieldVisitor(line));
            }
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let mut line = LogLine::from_metadata(&self.service, event.metadata());
        event.record(&mut FieldVisitor(&mut line));

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                let extensions = span.extensions();
                if let Some(parent) = extensions.get::<LogLine>() {
                    if line.operation.is_none() {
                        line.operation = parent.operation.clone();
                    }
                    if line.request_id.is_none() {
                        line.request_id = parent.request_id.clone();
                    }
                    if line.trace_id.is_none() {
                        line.trace_id = parent.trace_id.clone();
                    }
                    if line.span_id.is_none() {
                        line.span_id = Some(span.id().into_u64().to_string());
                    }
                }
            }
        }

        let mut writer = (self.writer)();
        if let Ok(mut json) = serde_json::to_string(&line) {
            json.push('\n');
            let _ = writer.write_all(json.as_bytes());
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
}

/// Installs a process-global subscriber: an `EnvFilter` (from `RUST_LOG`,
/// defaulting to `info`) feeding the JSON layer above, writing to stdout.
///
/// Safe to call at most once per process; a second call returns
/// [`InitError::AlreadyInitialized`] rather than panicking, so binaries and
/// `#[tokio::test]` harnesses that both call `init()` don't need to
/// coordinate.
pub fn init(service: impl Into<String>) -> Result<(), InitError> {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let layer = JsonLayer::new(service, || Box::new(std::io::stdout()) as Box<dyn Write>);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|_| InitError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::prelude::*;

    #[test]
    fn json_layer_redacts_pii_fields_in_events() {
        let buf = std::sync::Arc::new(std::sync::Mutex::new(Vec::<u8>::new()));
        let sink = buf.clone();

        struct VecWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
        impl Write for VecWriter {
            fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().write(data)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let layer = JsonLayer::new("test-service", move || Box::new(VecWriter(sink.clone())) as Box<dyn Write>);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(email = "alice@example.com", operation = "get_entity", "fetched entity");
        });

        let out = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(out.contains("\"[REDACTED]\""));
        assert!(!out.contains("alice@example.com"));
        assert!(out.contains("\"operation\":\"get_entity\""));
    }
}
