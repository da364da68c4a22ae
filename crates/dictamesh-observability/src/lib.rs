//! Structured logging and metrics shared across every subsystem: a JSON
//! tracing layer with field-level PII redaction, and a process-wide
//! Prometheus registry pre-registering the standard families every
//! component's instrumented operations report into.

pub mod logging;
pub mod metrics;
pub mod redact;

pub use logging::{init, InitError, JsonLayer, LogLine};
pub use metrics::MetricRegistry;
