//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`. Every section
//! has defaults, so an empty file yields a working service polling BTC
//! against the public endpoints. Provider URLs, feed lists and timing
//! live here; nothing network-facing is hardcoded in the usecases.

pub mod loader;

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::adapters::providers::{binance, coinbase, coingecko};
use crate::domain::FeedSource;
use crate::usecases::heatmap::HeatMapSettings;

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  /// Service identity, logging and probes.
  pub service: ServiceConfig,
  /// Price provider endpoints and HTTP budget.
  pub providers: ProvidersConfig,
  /// Quote polling.
  pub polling: PollingConfig,
  /// News feeds to ingest.
  pub feeds: Vec<FeedSource>,
  /// News refresh and paging.
  pub news: NewsConfig,
  /// Heat map refresh and layout.
  pub heatmap: HeatMapConfig,
  /// Preference storage.
  pub persistence: PersistenceConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level used when `RUST_LOG` is unset.
  pub log_level: String,
  /// Health/metrics server port.
  pub health_port: u16,
}

/// Price provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
  pub coinbase_url: String,
  pub binance_url: String,
  pub coingecko_url: String,
  /// Budget for one provider call (milliseconds).
  pub timeout_ms: u64,
  /// Quote currency for Coinbase spot prices.
  pub currency: String,
  /// Quote asset appended to Binance pairs.
  pub quote_asset: String,
  /// Binance candle interval for price lookups.
  pub binance_interval: String,
  /// CoinGecko free-tier budget; 0 disables limiting.
  pub coingecko_requests_per_minute: u32,
  /// Extra symbol → CoinGecko id mappings.
  pub coingecko_ids: HashMap<String, String>,
  /// Maximum concurrent outbound requests.
  pub max_concurrent_requests: usize,
}

/// Quote polling configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
  /// Seconds between resolutions per symbol.
  pub interval_secs: u64,
  /// Symbols tracked at startup.
  pub symbols: Vec<String>,
}

/// News configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
  /// Seconds between background refreshes; 0 refreshes only on demand.
  pub refresh_secs: u64,
  /// Default page size.
  pub page_size: usize,
}

/// Heat map configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeatMapConfig {
  /// Seconds between market refreshes.
  pub refresh_secs: u64,
  /// Upper bound on individually shown tiles.
  pub max_tiles: usize,
  /// Container width granted to each shown tile.
  pub pixels_per_tile: f64,
  /// Gap between tiles.
  pub spacing: f64,
  /// Resize quiet period (milliseconds).
  pub debounce_ms: u64,
  /// Rows requested from the markets endpoint.
  pub markets_per_page: u32,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
  /// Directory holding preferences.json.
  pub data_dir: String,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      service: ServiceConfig::default(),
      providers: ProvidersConfig::default(),
      polling: PollingConfig::default(),
      feeds: default_feeds(),
      news: NewsConfig::default(),
      heatmap: HeatMapConfig::default(),
      persistence: PersistenceConfig::default(),
    }
  }
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      name: "market-aggregator".to_string(),
      log_level: "info".to_string(),
      health_port: 8080,
    }
  }
}

impl Default for ProvidersConfig {
  fn default() -> Self {
    Self {
      coinbase_url: coinbase::DEFAULT_BASE_URL.to_string(),
      binance_url: binance::DEFAULT_BASE_URL.to_string(),
      coingecko_url: coingecko::DEFAULT_BASE_URL.to_string(),
      timeout_ms: 5_000,
      currency: "USD".to_string(),
      quote_asset: "USDT".to_string(),
      binance_interval: "1m".to_string(),
      coingecko_requests_per_minute: 30,
      coingecko_ids: HashMap::new(),
      max_concurrent_requests: 16,
    }
  }
}

impl ProvidersConfig {
  pub const fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

impl Default for PollingConfig {
  fn default() -> Self {
    Self {
      interval_secs: 5,
      symbols: vec!["BTC".to_string()],
    }
  }
}

impl PollingConfig {
  pub const fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs)
  }
}

impl Default for NewsConfig {
  fn default() -> Self {
    Self {
      refresh_secs: 300,
      page_size: 25,
    }
  }
}

impl Default for HeatMapConfig {
  fn default() -> Self {
    Self {
      refresh_secs: 60,
      max_tiles: 30,
      pixels_per_tile: 80.0,
      spacing: 2.0,
      debounce_ms: 150,
      markets_per_page: 100,
    }
  }
}

impl HeatMapConfig {
  pub const fn refresh_interval(&self) -> Duration {
    Duration::from_secs(self.refresh_secs)
  }

  pub const fn settings(&self) -> HeatMapSettings {
    HeatMapSettings {
      max_tiles: self.max_tiles,
      pixels_per_tile: self.pixels_per_tile,
      spacing: self.spacing,
      debounce: Duration::from_millis(self.debounce_ms),
    }
  }
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: "data".to_string(),
    }
  }
}

fn default_feeds() -> Vec<FeedSource> {
  vec![
    FeedSource {
      url: "https://www.coindesk.com/arc/outboundfeeds/rss/".to_string(),
      source_name: "CoinDesk".to_string(),
    },
    FeedSource {
      url: "https://cryptoslate.com/feed/".to_string(),
      source_name: "CryptoSlate".to_string(),
    },
  ]
}
