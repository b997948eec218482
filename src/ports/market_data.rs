//! Market Data Port - Listing Rows for the Heat Map

use async_trait::async_trait;

use crate::domain::MarketCoin;
use crate::error::FetchError;

/// Source of market listing rows, ordered by market cap descending.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync + 'static {
  /// Fetch the top coins by market cap.
  async fn fetch_markets(&self) -> Result<Vec<MarketCoin>, FetchError>;
}
