//! Source Cascade - Ordered Price Provider Fallback
//!
//! Providers are tried strictly in order and the first valid price wins.
//! Any failure (network, timeout, status, decode, non-positive price)
//! moves on to the next provider immediately, with no retries. When the
//! whole chain fails the caller keeps whatever quote it already had.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::quote::normalize_symbol;
use crate::domain::{Quote, QuoteSource};
use crate::error::{CascadeError, FetchError};
use crate::ports::{PriceProvider, PriceResolver};

/// Run `attempt` over `candidates` in order and return the first success.
///
/// Stops at the first `Ok`; later candidates are never touched. On total
/// failure every error is returned in attempt order.
pub async fn first_success<I, F, Fut, T, E>(candidates: I, mut attempt: F) -> Result<T, Vec<E>>
where
  I: IntoIterator,
  F: FnMut(I::Item) -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let mut errors = Vec::new();
  for candidate in candidates {
    match attempt(candidate).await {
      Ok(value) => return Ok(value),
      Err(e) => errors.push(e),
    }
  }
  Err(errors)
}

/// Ordered provider chain with a per-attempt timeout.
pub struct SourceCascade {
  /// Providers in priority order (index 0 = primary).
  providers: Vec<Arc<dyn PriceProvider>>,
  /// Budget for a single provider call.
  attempt_timeout: Duration,
  /// Optional metrics sink.
  metrics: Option<Arc<MetricsRegistry>>,
}

impl SourceCascade {
  pub fn new(providers: Vec<Arc<dyn PriceProvider>>, attempt_timeout: Duration) -> Self {
    Self {
      providers,
      attempt_timeout,
      metrics: None,
    }
  }

  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  /// Provider names in priority order.
  pub fn provider_names(&self) -> Vec<&'static str> {
    self.providers.iter().map(|p| p.name()).collect()
  }

  /// Resolve `symbol` through the chain.
  #[instrument(skip(self), fields(providers = self.providers.len()))]
  pub async fn resolve_price(&self, symbol: &str) -> Result<Quote, CascadeError> {
    let symbol = normalize_symbol(symbol);
    if symbol.is_empty() {
      return Err(CascadeError::EmptySymbol);
    }
    if self.providers.is_empty() {
      return Err(CascadeError::NoProviders);
    }

    let outcome = first_success(self.providers.iter().enumerate(), |(rank, provider)| {
      self.attempt(rank, provider.as_ref(), &symbol)
    })
    .await;

    match outcome {
      Ok(quote) => {
        info!(
          symbol = %quote.symbol,
          price = quote.price,
          source = %quote.source,
          provider = %quote.provider,
          "Quote resolved"
        );
        Ok(quote)
      }
      Err(mut errors) => {
        let attempts = errors.len();
        let last = errors
          .pop()
          .unwrap_or_else(|| FetchError::Network("no attempt made".to_string()));
        warn!(symbol = %symbol, attempts, last = %last, "All price providers failed");
        Err(CascadeError::AllProvidersFailed {
          symbol,
          attempts,
          last,
        })
      }
    }
  }

  async fn attempt(
    &self,
    rank: usize,
    provider: &dyn PriceProvider,
    symbol: &str,
  ) -> Result<Quote, FetchError> {
    let name = provider.name();
    let started = Instant::now();

    let result = match tokio::time::timeout(self.attempt_timeout, provider.fetch_price(symbol)).await {
      Err(_) => Err(FetchError::Timeout(self.attempt_timeout)),
      Ok(Err(e)) => Err(e),
      Ok(Ok(price)) => Quote::new(symbol, price, QuoteSource::from_rank(rank), name)
        .ok_or_else(|| FetchError::InvalidInput(format!("rejected price {price}"))),
    };

    if let Some(metrics) = &self.metrics {
      let outcome = result.as_ref().map_or_else(FetchError::kind, |_| "success");
      metrics
        .provider_attempts
        .with_label_values(&[name, outcome])
        .inc();
      metrics
        .provider_latency
        .with_label_values(&[name])
        .observe(started.elapsed().as_secs_f64());
    }

    if let Err(e) = &result {
      debug!(provider = name, symbol, error = %e, "Provider attempt failed");
    }
    result
  }
}

#[async_trait]
impl PriceResolver for SourceCascade {
  async fn resolve(&self, symbol: &str) -> Result<Quote, CascadeError> {
    self.resolve_price(symbol).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ports::price_provider::MockPriceProvider;

  fn provider(name: &'static str, result: Result<f64, FetchError>) -> Arc<dyn PriceProvider> {
    let mut mock = MockPriceProvider::new();
    mock.expect_name().return_const(name);
    mock
      .expect_fetch_price()
      .times(1)
      .returning(move |_| result.clone());
    Arc::new(mock)
  }

  fn untouched(name: &'static str) -> Arc<dyn PriceProvider> {
    let mut mock = MockPriceProvider::new();
    mock.expect_name().return_const(name);
    mock.expect_fetch_price().never();
    Arc::new(mock)
  }

  struct SlowProvider;

  #[async_trait]
  impl PriceProvider for SlowProvider {
    fn name(&self) -> &'static str {
      "slow"
    }

    async fn fetch_price(&self, _symbol: &str) -> Result<f64, FetchError> {
      tokio::time::sleep(Duration::from_secs(60)).await;
      Ok(1.0)
    }
  }

  #[tokio::test]
  async fn test_primary_success_short_circuits() {
    let cascade = SourceCascade::new(
      vec![
        provider("coinbase", Ok(50_000.12)),
        untouched("binance"),
        untouched("coingecko"),
      ],
      Duration::from_secs(1),
    );
    let quote = cascade.resolve_price("btc").await.unwrap();
    assert_eq!(quote.symbol, "BTC");
    assert_eq!(quote.price, 50_000.12);
    assert_eq!(quote.source, QuoteSource::Primary);
    assert_eq!(quote.provider, "coinbase");
  }

  #[tokio::test]
  async fn test_tertiary_success_is_tagged_tertiary() {
    let cascade = SourceCascade::new(
      vec![
        provider("coinbase", Err(FetchError::Status(503))),
        provider("binance", Err(FetchError::Decode("bad".into()))),
        provider("coingecko", Ok(3_000.5)),
      ],
      Duration::from_secs(1),
    );
    let quote = cascade.resolve_price("ETH").await.unwrap();
    assert_eq!(quote.source, QuoteSource::Tertiary);
    assert_eq!(quote.provider, "coingecko");
  }

  #[tokio::test]
  async fn test_invalid_price_advances_chain() {
    let cascade = SourceCascade::new(
      vec![provider("coinbase", Ok(0.0)), provider("binance", Ok(42.0))],
      Duration::from_secs(1),
    );
    let quote = cascade.resolve_price("SOL").await.unwrap();
    assert_eq!(quote.source, QuoteSource::Secondary);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeout_advances_to_secondary() {
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let cascade = SourceCascade::new(
      vec![Arc::new(SlowProvider), provider("binance", Ok(50_000.12))],
      Duration::from_secs(2),
    )
    .with_metrics(Arc::clone(&metrics));

    let quote = cascade.resolve_price("BTC").await.unwrap();
    assert_eq!(quote.source, QuoteSource::Secondary);
    assert_eq!(quote.price, 50_000.12);
    assert_eq!(
      metrics
        .provider_attempts
        .with_label_values(&["slow", "timeout"])
        .get(),
      1
    );
  }

  #[tokio::test]
  async fn test_all_fail_reports_attempts_and_last_error() {
    let cascade = SourceCascade::new(
      vec![
        provider("coinbase", Err(FetchError::Network("refused".into()))),
        provider("binance", Err(FetchError::Status(451))),
      ],
      Duration::from_secs(1),
    );
    let err = cascade.resolve_price("BTC").await.unwrap_err();
    assert_eq!(
      err,
      CascadeError::AllProvidersFailed {
        symbol: "BTC".into(),
        attempts: 2,
        last: FetchError::Status(451),
      }
    );
  }

  #[tokio::test]
  async fn test_empty_chain_and_blank_symbol() {
    let empty = SourceCascade::new(Vec::new(), Duration::from_secs(1));
    assert_eq!(empty.resolve_price("BTC").await, Err(CascadeError::NoProviders));

    let cascade = SourceCascade::new(vec![untouched("coinbase")], Duration::from_secs(1));
    assert_eq!(cascade.resolve_price("   ").await, Err(CascadeError::EmptySymbol));
  }

  #[tokio::test]
  async fn test_first_success_stops_early() {
    let mut seen = Vec::new();
    let result: Result<u32, Vec<&str>> = first_success([1, 2, 3], |n| {
      seen.push(n);
      async move { if n == 2 { Ok(n * 10) } else { Err("no") } }
    })
    .await;
    assert_eq!(result, Ok(20));
    assert_eq!(seen, [1, 2]);
  }
}
