//! The binary's library half: application state, the `/healthz` and
//! `/metrics` routes, and the config aggregation type.
//!
//! Kept separate from `main.rs` so the router can be exercised with
//! `tower::ServiceExt::oneshot` in tests without booting a real listener.

pub mod config;
pub mod health;

pub use config::{CatalogConfig, Config, ConfigLoadError, EventsConfig, ServerConfig};
pub use health::{router, AppState, ComponentHealth, OverallHealth};
