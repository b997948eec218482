//! Coinbase Spot Price - Primary Price Source
//!
//! `GET /v2/prices/{SYMBOL}-{CCY}/spot` answers
//! `{"data":{"base":"BTC","currency":"USD","amount":"50000.12"}}`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::price_from_value;
use crate::adapters::http::HttpClient;
use crate::error::FetchError;
use crate::ports::PriceProvider;

/// Public Coinbase API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.coinbase.com";

#[derive(Debug, Deserialize)]
struct SpotResponse {
    data: SpotData,
}

#[derive(Debug, Deserialize)]
struct SpotData {
    amount: Value,
}

/// Parse a spot-price response body.
pub fn parse_spot(body: &[u8]) -> Result<f64, FetchError> {
    let resp: SpotResponse = serde_json::from_slice(body)?;
    price_from_value(&resp.data.amount)
}

/// Coinbase spot price provider.
pub struct CoinbaseProvider {
    /// Shared HTTP client.
    client: HttpClient,
    /// API base URL (no trailing slash).
    base_url: String,
    /// Quote currency, e.g. "USD".
    currency: String,
}

impl CoinbaseProvider {
    pub fn new(client: HttpClient, base_url: &str, currency: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            currency: currency.to_uppercase(),
        }
    }

    fn spot_url(&self, symbol: &str) -> String {
        format!("{}/v2/prices/{}-{}/spot", self.base_url, symbol, self.currency)
    }
}

#[async_trait]
impl PriceProvider for CoinbaseProvider {
    fn name(&self) -> &'static str {
        "coinbase"
    }

    #[instrument(skip(self), fields(provider = "coinbase"))]
    async fn fetch_price(&self, symbol: &str) -> Result<f64, FetchError> {
        let body = self.client.get_bytes(&self.spot_url(symbol), &[]).await?;
        let price = parse_spot(&body)?;
        debug!(symbol, price, "Coinbase spot price");
        Ok(price)
    }
}
