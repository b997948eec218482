//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP, XML, file I/O). Each sub-module groups
//! adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `http`: shared reqwest client with concurrency cap and rate limit
//! - `providers`: Coinbase, Binance and CoinGecko price sources
//! - `feeds`: RSS download and parsing
//! - `metrics`: Prometheus registry and health server
//! - `persistence`: JSON preference store

pub mod feeds;
pub mod http;
pub mod metrics;
pub mod persistence;
pub mod providers;
