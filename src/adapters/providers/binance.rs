//! Binance Klines - Secondary Price Source
//!
//! `GET /api/v3/klines?symbol=BTCUSDT&interval=1m&limit=1` answers an array
//! of candle arrays: `[openTime, open, high, low, close, volume, ...]` with
//! the numeric fields encoded as strings. The latest usable close is the
//! price.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::adapters::http::HttpClient;
use crate::domain::quote::is_valid_price;
use crate::error::FetchError;
use crate::ports::PriceProvider;

/// Public Binance API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Minimum fields a kline row must carry to be usable.
const MIN_KLINE_FIELDS: usize = 6;

/// One parsed candle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    /// Candle open time.
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

fn number_field(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn parse_row(row: &Value) -> Option<Candle> {
    let fields = row.as_array()?;
    if fields.len() < MIN_KLINE_FIELDS {
        return None;
    }
    let open_ms = fields[0].as_i64()?;
    Some(Candle {
        open_time: Utc.timestamp_millis_opt(open_ms).single()?,
        open: number_field(&fields[1])?,
        high: number_field(&fields[2])?,
        low: number_field(&fields[3])?,
        close: number_field(&fields[4])?,
        volume: number_field(&fields[5])?,
    })
}

/// Parse a klines body. Short or unparseable rows are skipped.
pub fn parse_klines(body: &[u8]) -> Result<Vec<Candle>, FetchError> {
    let value: Value = serde_json::from_slice(body)?;
    let rows = value
        .as_array()
        .ok_or_else(|| FetchError::Decode("klines response is not an array".to_string()))?;

    Ok(rows.iter().filter_map(parse_row).collect())
}

/// Binance klines price provider.
pub struct BinanceProvider {
    /// Shared HTTP client.
    client: HttpClient,
    /// API base URL (no trailing slash).
    base_url: String,
    /// Quote asset appended to the symbol, e.g. "USDT".
    quote_asset: String,
    /// Candle interval used for price lookups.
    interval: String,
}

impl BinanceProvider {
    pub fn new(client: HttpClient, base_url: &str, quote_asset: &str, interval: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            quote_asset: quote_asset.to_uppercase(),
            interval: interval.to_string(),
        }
    }

    /// Trading pair for a base symbol, e.g. "BTC" → "BTCUSDT".
    pub fn pair(&self, symbol: &str) -> String {
        format!("{}{}", symbol.to_uppercase(), self.quote_asset)
    }

    /// Fetch up to `limit` candles for `symbol`, oldest first.
    #[instrument(skip(self), fields(provider = "binance"))]
    pub async fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, FetchError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let query = [
            ("symbol", self.pair(symbol)),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let body = self.client.get_bytes(&url, &query).await?;
        let mut candles = parse_klines(&body)?;
        candles.sort_by_key(|c| c.open_time);
        Ok(candles)
    }
}

#[async_trait]
impl PriceProvider for BinanceProvider {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64, FetchError> {
        let candles = self.fetch_klines(symbol, &self.interval, 1).await?;
        let price = candles
            .last()
            .map(|c| c.close)
            .ok_or_else(|| FetchError::Decode("no usable klines".to_string()))?;

        if !is_valid_price(price) {
            return Err(FetchError::InvalidInput(format!("non-positive close {price}")));
        }
        debug!(symbol, price, "Binance close price");
        Ok(price)
    }
}
