//! Metrics and Monitoring Adapters
//!
//! Prometheus registry plus the axum 0.7 server exposing /live, /ready
//! and /metrics on the configured health port.

pub mod health;
pub mod prometheus;

pub use health::{HealthServer, HealthState};
pub use prometheus::MetricsRegistry;
