//! Price Provider Adapters - REST Spot Price Sources
//!
//! The three links of the default fallback chain:
//! - Coinbase: primary, spot price endpoint
//! - Binance: secondary, latest close from the klines endpoint
//! - CoinGecko: tertiary, simple-price aggregator (also serves the
//!   market listing used by the heat map)

pub mod binance;
pub mod coinbase;
pub mod coingecko;

pub use binance::BinanceProvider;
pub use coinbase::CoinbaseProvider;
pub use coingecko::CoinGeckoProvider;

use serde_json::Value;

use crate::domain::quote::is_valid_price;
use crate::error::FetchError;

/// Read a price that upstream may encode as a JSON number or a string.
pub(crate) fn price_from_value(value: &Value) -> Result<f64, FetchError> {
    let price = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| FetchError::InvalidInput(format!("price out of range: {n}")))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| FetchError::InvalidInput(format!("unparseable price {s:?}")))?,
        other => return Err(FetchError::Decode(format!("price is not numeric: {other}"))),
    };

    if !is_valid_price(price) {
        return Err(FetchError::InvalidInput(format!("non-positive price {price}")));
    }
    Ok(price)
}
