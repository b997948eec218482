//! Market Aggregator - Entry Point
//!
//! Wires configuration, logging, providers, feeds and the aggregator
//! facade, then runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create metrics registry and the shared HTTP client
//! 4. Build the provider cascade (Coinbase → Binance → CoinGecko)
//! 5. Open the JSON preference store
//! 6. Build the MarketAggregator and start its background loops
//! 7. Track the configured symbols
//! 8. Spawn health server (/live, /ready, /metrics)
//! 9. Wait for SIGINT → stop polling, signal loops, exit

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use market_aggregator::adapters::feeds::HttpFeedFetcher;
use market_aggregator::adapters::http::{HttpClient, HttpClientConfig};
use market_aggregator::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use market_aggregator::adapters::persistence::JsonPreferenceStore;
use market_aggregator::adapters::providers::{BinanceProvider, CoinGeckoProvider, CoinbaseProvider};
use market_aggregator::config::{self, AppConfig};
use market_aggregator::ports::PriceProvider;
use market_aggregator::usecases::{AggregatorDeps, AggregatorSettings, MarketAggregator, SourceCascade};

/// Config path: first CLI argument, then `MARKET_AGGREGATOR_CONFIG`.
fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MARKET_AGGREGATOR_CONFIG").ok())
        .unwrap_or_else(|| "config.toml".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let path = config_path();
    let config = config::loader::load_config(&path)
        .with_context(|| format!("Failed to load configuration from {path}"))?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        symbols = ?config.polling.symbols,
        feeds = config.feeds.len(),
        "Starting market aggregator"
    );

    // ── 3. Shutdown channel, metrics, HTTP client ───────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);
    let health = Arc::new(HealthState::new());

    let http = HttpClient::new(&HttpClientConfig {
        timeout: config.providers.timeout(),
        max_concurrent: config.providers.max_concurrent_requests,
        ..HttpClientConfig::default()
    })?;

    // ── 4. Provider cascade ─────────────────────────────────
    let deps = build_deps(&config, &http, Arc::clone(&metrics)).await?;

    // ── 5-6. Aggregator ─────────────────────────────────────
    let aggregator = Arc::new(
        MarketAggregator::new(deps, AggregatorSettings::from_config(&config))
            .await
            .context("Failed to build aggregator")?,
    );
    aggregator.start(&shutdown_tx);

    // ── 7. Track configured symbols ─────────────────────────
    for symbol in &config.polling.symbols {
        aggregator.track(symbol);
    }
    health.running.store(true, Ordering::Relaxed);

    // ── 8. Health server + readiness watcher ────────────────
    let health_server = HealthServer::new(
        Arc::clone(&health),
        Arc::clone(&metrics),
        config.service.health_port,
    );
    let health_shutdown = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    let watcher_handle = tokio::spawn(watch_quotes(
        aggregator.subscribe_quotes(),
        Arc::clone(&health),
        shutdown_tx.subscribe(),
    ));

    info!("All tasks spawned, aggregator is running");

    // ── 9. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");

    health.running.store(false, Ordering::Relaxed);
    aggregator.stop();
    let _ = shutdown_tx.send(());

    let _ = tokio::time::timeout(Duration::from_secs(5), watcher_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;

    info!("Shutdown complete");
    Ok(())
}

/// Build the port implementations from configuration.
async fn build_deps(
    config: &AppConfig,
    http: &HttpClient,
    metrics: Arc<MetricsRegistry>,
) -> Result<AggregatorDeps> {
    let providers_cfg = &config.providers;

    let coingecko = Arc::new(CoinGeckoProvider::new(
        http.with_rate_limit(providers_cfg.coingecko_requests_per_minute),
        &providers_cfg.coingecko_url,
        providers_cfg.coingecko_ids.clone(),
        config.heatmap.markets_per_page,
    ));

    let providers: Vec<Arc<dyn PriceProvider>> = vec![
        Arc::new(CoinbaseProvider::new(
            http.clone(),
            &providers_cfg.coinbase_url,
            &providers_cfg.currency,
        )),
        Arc::new(BinanceProvider::new(
            http.clone(),
            &providers_cfg.binance_url,
            &providers_cfg.quote_asset,
            &providers_cfg.binance_interval,
        )),
        Arc::clone(&coingecko) as Arc<dyn PriceProvider>,
    ];

    let cascade = SourceCascade::new(providers, providers_cfg.timeout()).with_metrics(Arc::clone(&metrics));
    info!(chain = ?cascade.provider_names(), "Provider cascade ready");

    let preferences = JsonPreferenceStore::open(&config.persistence.data_dir)
        .await
        .context("Failed to open preference store")?;
    info!(path = %preferences.path().display(), "Preference store opened");

    Ok(AggregatorDeps {
        resolver: Arc::new(cascade),
        feeds: Arc::new(HttpFeedFetcher::new(http.clone())),
        markets: coingecko,
        preferences: Arc::new(preferences),
        metrics: Some(metrics),
    })
}

/// Flip readiness on the first published quote and log every update.
async fn watch_quotes(
    mut quotes: broadcast::Receiver<market_aggregator::domain::Quote>,
    health: Arc<HealthState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            received = quotes.recv() => match received {
                Ok(quote) => {
                    health.quotes_available.store(true, Ordering::Relaxed);
                    info!(
                        symbol = %quote.symbol,
                        price = quote.price,
                        source = %quote.source,
                        "Quote update"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    info!(skipped, "Quote watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
