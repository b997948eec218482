//! Prometheus Metrics Registry - Aggregator Observability
//!
//! Provider cascade outcomes, the latest published price per symbol,
//! stale completion drops, feed fetch outcomes, article count and layout
//! recomputations. All names carry the `market_aggregator_` prefix.

use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Centralized Prometheus metrics for the aggregator.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Provider attempts by outcome (`success` or a `FetchError` kind).
    pub provider_attempts: IntCounterVec,
    /// Provider call latency in seconds.
    pub provider_latency: HistogramVec,
    /// Last published price per symbol.
    pub quote_price: GaugeVec,
    /// Completions dropped by the generation check.
    pub stale_completions: IntCounterVec,
    /// Feed fetches by source and outcome.
    pub feed_fetches: IntCounterVec,
    /// Articles in the current batch.
    pub articles_available: IntGauge,
    /// Treemap layouts actually computed (memo misses).
    pub layout_computations: IntCounter,
}

impl MetricsRegistry {
    /// Create and register all metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let provider_attempts = IntCounterVec::new(
            Opts::new(
                "market_aggregator_provider_attempts_total",
                "Price provider attempts by outcome",
            ),
            &["provider", "outcome"],
        )?;

        let provider_latency = HistogramVec::new(
            HistogramOpts::new(
                "market_aggregator_provider_latency_seconds",
                "Price provider call latency in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["provider"],
        )?;

        let quote_price = GaugeVec::new(
            Opts::new("market_aggregator_quote_price", "Last published price"),
            &["symbol"],
        )?;

        let stale_completions = IntCounterVec::new(
            Opts::new(
                "market_aggregator_stale_completions_total",
                "Price completions discarded as stale",
            ),
            &["symbol"],
        )?;

        let feed_fetches = IntCounterVec::new(
            Opts::new(
                "market_aggregator_feed_fetches_total",
                "News feed fetches by outcome",
            ),
            &["source", "outcome"],
        )?;

        let articles_available = IntGauge::new(
            "market_aggregator_articles_available",
            "Articles in the current merged batch",
        )?;

        let layout_computations = IntCounter::new(
            "market_aggregator_layout_computations_total",
            "Treemap layouts computed",
        )?;

        registry.register(Box::new(provider_attempts.clone()))?;
        registry.register(Box::new(provider_latency.clone()))?;
        registry.register(Box::new(quote_price.clone()))?;
        registry.register(Box::new(stale_completions.clone()))?;
        registry.register(Box::new(feed_fetches.clone()))?;
        registry.register(Box::new(articles_available.clone()))?;
        registry.register(Box::new(layout_computations.clone()))?;

        Ok(Self {
            registry,
            provider_attempts,
            provider_latency,
            quote_price,
            stale_completions,
            feed_fetches,
            articles_available,
            layout_computations,
        })
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
