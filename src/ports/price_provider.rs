//! Price Provider Port - Single-source Spot Prices
//!
//! A `PriceProvider` answers one symbol from one upstream API. The
//! cascade chains several of them; the polling scheduler only sees the
//! resulting `PriceResolver`.

use async_trait::async_trait;

use crate::domain::Quote;
use crate::error::{CascadeError, FetchError};

/// One upstream price API.
///
/// Implementations do a single attempt: no retries, no fallback. Timeouts
/// are enforced by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceProvider: Send + Sync + 'static {
  /// Stable provider name for logs and metrics.
  fn name(&self) -> &'static str;

  /// Fetch the current price of `symbol` (normalized, uppercase).
  async fn fetch_price(&self, symbol: &str) -> Result<f64, FetchError>;
}

/// Anything that turns a symbol into a validated quote.
///
/// Implemented by `SourceCascade`; the scheduler depends on this seam so
/// it can be driven by test doubles with controlled latency.
#[async_trait]
pub trait PriceResolver: Send + Sync + 'static {
  /// Resolve a quote for `symbol`.
  async fn resolve(&self, symbol: &str) -> Result<Quote, CascadeError>;
}
