//! Quote domain types.
//!
//! A `Quote` is an immutable price snapshot for one symbol, tagged with the
//! rank of the provider that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of a provider in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteSource {
    /// First provider tried (exchange spot API).
    Primary,
    /// Second provider (exchange candle endpoint).
    Secondary,
    /// Third provider (aggregator simple-price API).
    Tertiary,
}

impl QuoteSource {
    /// Map a zero-based chain position to a source tag.
    ///
    /// Chains longer than three report every extra provider as tertiary.
    pub const fn from_rank(rank: usize) -> Self {
        match rank {
            0 => Self::Primary,
            1 => Self::Secondary,
            _ => Self::Tertiary,
        }
    }
}

impl std::fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "PRIMARY"),
            Self::Secondary => write!(f, "SECONDARY"),
            Self::Tertiary => write!(f, "TERTIARY"),
        }
    }
}

/// Price snapshot for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Normalized (uppercase) symbol, e.g. "BTC".
    pub symbol: String,
    /// Last price in the quote currency. Always finite and > 0.
    pub price: f64,
    /// Chain position of the provider that answered.
    pub source: QuoteSource,
    /// Provider name, e.g. "coinbase".
    pub provider: String,
    /// When the quote was resolved.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Build a quote, rejecting non-positive or non-finite prices.
    pub fn new(
        symbol: &str,
        price: f64,
        source: QuoteSource,
        provider: &str,
    ) -> Option<Self> {
        if !is_valid_price(price) {
            return None;
        }
        Some(Self {
            symbol: normalize_symbol(symbol),
            price,
            source,
            provider: provider.to_string(),
            timestamp: Utc::now(),
        })
    }
}

/// Prices must be finite and strictly positive to be published.
pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Trim and uppercase a ticker symbol.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
