//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use tracing::info;
use url::Url;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    symbols = ?config.polling.symbols,
    feeds = config.feeds.len(),
    interval_secs = config.polling.interval_secs,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

fn ensure_http_url(field: &str, value: &str) -> Result<()> {
  let url = Url::parse(value).with_context(|| format!("{field} is not a valid URL: {value:?}"))?;
  ensure!(
    matches!(url.scheme(), "http" | "https"),
    "{field} must be http(s), got {value:?}"
  );
  Ok(())
}

/// Validate all configuration parameters.
pub fn validate_config(config: &AppConfig) -> Result<()> {
  // Providers
  ensure_http_url("providers.coinbase_url", &config.providers.coinbase_url)?;
  ensure_http_url("providers.binance_url", &config.providers.binance_url)?;
  ensure_http_url("providers.coingecko_url", &config.providers.coingecko_url)?;
  ensure!(
    config.providers.timeout_ms > 0,
    "providers.timeout_ms must be positive"
  );
  ensure!(
    !config.providers.currency.trim().is_empty(),
    "providers.currency must not be empty"
  );
  ensure!(
    !config.providers.quote_asset.trim().is_empty(),
    "providers.quote_asset must not be empty"
  );
  ensure!(
    config.providers.max_concurrent_requests > 0,
    "providers.max_concurrent_requests must be positive"
  );

  // Polling
  ensure!(
    config.polling.interval_secs > 0,
    "polling.interval_secs must be positive"
  );
  for symbol in &config.polling.symbols {
    ensure!(!symbol.trim().is_empty(), "polling.symbols contains a blank symbol");
  }

  // Feeds
  let mut seen = HashSet::new();
  for (i, feed) in config.feeds.iter().enumerate() {
    ensure_http_url(&format!("feeds[{i}].url"), &feed.url)?;
    ensure!(
      !feed.source_name.trim().is_empty(),
      "feeds[{i}] has an empty source_name"
    );
    ensure!(seen.insert(feed.url.as_str()), "feeds[{i}].url is a duplicate: {}", feed.url);
  }

  // News
  ensure!(config.news.page_size > 0, "news.page_size must be positive");

  // Heat map
  ensure!(
    config.heatmap.refresh_secs > 0,
    "heatmap.refresh_secs must be positive"
  );
  ensure!(config.heatmap.max_tiles > 0, "heatmap.max_tiles must be positive");
  ensure!(
    config.heatmap.pixels_per_tile > 0.0,
    "heatmap.pixels_per_tile must be positive, got {}",
    config.heatmap.pixels_per_tile
  );
  ensure!(
    config.heatmap.spacing >= 0.0 && config.heatmap.spacing.is_finite(),
    "heatmap.spacing must be >= 0, got {}",
    config.heatmap.spacing
  );
  ensure!(
    (1..=250).contains(&config.heatmap.markets_per_page),
    "heatmap.markets_per_page must be in [1, 250], got {}",
    config.heatmap.markets_per_page
  );

  // Persistence
  ensure!(
    !config.persistence.data_dir.trim().is_empty(),
    "persistence.data_dir must not be empty"
  );

  Ok(())
}
