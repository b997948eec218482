//! CoinGecko - Tertiary Price Source and Market Listing
//!
//! Two endpoints:
//! - `/api/v3/simple/price?ids=bitcoin&vs_currencies=usd` →
//!   `{"bitcoin":{"usd":50000.12}}`, the last link of the price cascade
//! - `/api/v3/coins/markets?...` → rows for the listing and heat map
//!
//! CoinGecko keys coins by its own ids, so symbols go through a static
//! lookup table; unmapped symbols fall back to their lowercase form.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::price_from_value;
use crate::adapters::http::HttpClient;
use crate::domain::MarketCoin;
use crate::error::FetchError;
use crate::ports::{MarketDataSource, PriceProvider};

/// Public CoinGecko API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com";

/// Built-in symbol → CoinGecko id table.
const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("USDT", "tether"),
    ("BNB", "binancecoin"),
    ("SOL", "solana"),
    ("USDC", "usd-coin"),
    ("XRP", "ripple"),
    ("DOGE", "dogecoin"),
    ("ADA", "cardano"),
    ("TRX", "tron"),
    ("TON", "the-open-network"),
    ("AVAX", "avalanche-2"),
    ("SHIB", "shiba-inu"),
    ("DOT", "polkadot"),
    ("LINK", "chainlink"),
    ("BCH", "bitcoin-cash"),
    ("LTC", "litecoin"),
    ("MATIC", "matic-network"),
    ("XLM", "stellar"),
    ("ATOM", "cosmos"),
];

/// Resolve the CoinGecko id for a symbol.
///
/// Config overrides win over the built-in table; anything unmapped is
/// lowercased.
pub fn coin_id_for(symbol: &str, overrides: &HashMap<String, String>) -> String {
    let upper = symbol.trim().to_uppercase();
    if let Some(id) = overrides.get(&upper) {
        return id.clone();
    }
    COIN_IDS
        .iter()
        .find(|(s, _)| *s == upper)
        .map_or_else(|| upper.to_lowercase(), |(_, id)| (*id).to_string())
}

/// Parse a simple-price body for `id`.
pub fn parse_simple_price(body: &[u8], id: &str) -> Result<f64, FetchError> {
    let value: Value = serde_json::from_slice(body)?;
    let usd = value
        .get(id)
        .and_then(|entry| entry.get("usd"))
        .ok_or_else(|| FetchError::Decode(format!("no usd price for {id}")))?;
    price_from_value(usd)
}

/// One row of `/coins/markets`; numeric fields are nullable upstream.
#[derive(Debug, Deserialize)]
struct MarketRow {
    id: String,
    symbol: String,
    name: String,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    total_volume: Option<f64>,
    price_change_percentage_24h: Option<f64>,
}

impl From<MarketRow> for MarketCoin {
    fn from(row: MarketRow) -> Self {
        Self {
            id: row.id,
            symbol: row.symbol.to_uppercase(),
            name: row.name,
            price: row.current_price.unwrap_or(0.0),
            daily_change_pct: row.price_change_percentage_24h.unwrap_or(0.0),
            volume: row.total_volume.unwrap_or(0.0),
            market_cap: row.market_cap.unwrap_or(0.0),
        }
    }
}

/// Parse a markets body; malformed rows are skipped individually.
pub fn parse_markets(body: &[u8]) -> Result<Vec<MarketCoin>, FetchError> {
    let rows: Vec<Value> = serde_json::from_slice(body)?;
    let total = rows.len();
    let coins: Vec<MarketCoin> = rows
        .into_iter()
        .filter_map(|row| serde_json::from_value::<MarketRow>(row).ok())
        .map(MarketCoin::from)
        .collect();

    if coins.len() < total {
        warn!(skipped = total - coins.len(), "Skipped malformed market rows");
    }
    Ok(coins)
}

/// CoinGecko price provider and market data source.
pub struct CoinGeckoProvider {
    /// Shared HTTP client (rate limited for the free tier).
    client: HttpClient,
    /// API base URL (no trailing slash).
    base_url: String,
    /// Config overrides for the symbol → id table.
    id_overrides: HashMap<String, String>,
    /// Rows requested from `/coins/markets`.
    markets_per_page: u32,
}

impl CoinGeckoProvider {
    pub fn new(
        client: HttpClient,
        base_url: &str,
        id_overrides: HashMap<String, String>,
        markets_per_page: u32,
    ) -> Self {
        let id_overrides = id_overrides
            .into_iter()
            .map(|(symbol, id)| (symbol.to_uppercase(), id))
            .collect();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            id_overrides,
            markets_per_page,
        }
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64, FetchError> {
        let id = coin_id_for(symbol, &self.id_overrides);
        let url = format!("{}/api/v3/simple/price", self.base_url);
        let query = [("ids", id.clone()), ("vs_currencies", "usd".to_string())];

        let body = self.client.get_bytes(&url, &query).await?;
        let price = parse_simple_price(&body, &id)?;
        debug!(symbol, id = %id, price, "CoinGecko simple price");
        Ok(price)
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoProvider {
    #[instrument(skip(self))]
    async fn fetch_markets(&self) -> Result<Vec<MarketCoin>, FetchError> {
        let url = format!("{}/api/v3/coins/markets", self.base_url);
        let query = [
            ("vs_currency", "usd".to_string()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", self.markets_per_page.to_string()),
            ("page", "1".to_string()),
            ("sparkline", "false".to_string()),
            ("price_change_percentage", "24h".to_string()),
        ];
        let body = self.client.get_bytes(&url, &query).await?;
        let coins = parse_markets(&body)?;
        debug!(count = coins.len(), "CoinGecko markets fetched");
        Ok(coins)
    }
}
