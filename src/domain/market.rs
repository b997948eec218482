//! Market listing: coin rows, segment filters, search and sorting.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::treemap::Tile;

/// One row of the market listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCoin {
    /// Aggregator coin id, e.g. "bitcoin".
    pub id: String,
    /// Uppercase ticker.
    pub symbol: String,
    /// Human-readable name.
    pub name: String,
    /// Last price in USD.
    pub price: f64,
    /// 24h change in percent.
    pub daily_change_pct: f64,
    /// 24h traded volume in USD.
    pub volume: f64,
    /// Market capitalisation in USD.
    pub market_cap: f64,
}

impl MarketCoin {
    /// Heat-map tile: weighted by market cap, coloured by 24h change.
    pub fn to_tile(&self) -> Tile {
        Tile::new(self.symbol.clone(), self.market_cap, self.daily_change_pct)
    }
}

/// Listing segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarketSegment {
    #[default]
    All,
    Favorites,
    Gainers,
    Losers,
}

/// Sortable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    Coin,
    Price,
    DailyChange,
    Volume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Current sort column and direction; `None` keeps source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortState {
    pub field: Option<SortField>,
    pub direction: SortDirection,
}

impl SortState {
    /// Same field flips direction; a new field starts ascending.
    pub fn toggle(&mut self, field: SortField) {
        if self.field == Some(field) {
            self.direction = match self.direction {
                SortDirection::Ascending => SortDirection::Descending,
                SortDirection::Descending => SortDirection::Ascending,
            };
        } else {
            self.field = Some(field);
            self.direction = SortDirection::Ascending;
        }
    }
}

/// Filter + sort request for the listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketQuery {
    pub search: String,
    pub segment: MarketSegment,
    pub sort: SortState,
}

/// Apply search, then segment, then sort.
///
/// `favorites` holds uppercase symbols.
pub fn apply_query(coins: &[MarketCoin], favorites: &[String], query: &MarketQuery) -> Vec<MarketCoin> {
    let needle = query.search.trim().to_lowercase();

    let mut rows: Vec<MarketCoin> = coins
        .iter()
        .filter(|c| {
            needle.is_empty()
                || c.symbol.to_lowercase().contains(&needle)
                || c.name.to_lowercase().contains(&needle)
        })
        .filter(|c| match query.segment {
            MarketSegment::All => true,
            MarketSegment::Favorites => favorites.iter().any(|f| f.eq_ignore_ascii_case(&c.symbol)),
            MarketSegment::Gainers => c.daily_change_pct > 0.0,
            MarketSegment::Losers => c.daily_change_pct < 0.0,
        })
        .cloned()
        .collect();

    if let Some(field) = query.sort.field {
        rows.sort_by(|a, b| {
            let ord = compare(a, b, field);
            match query.sort.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        });
    }
    rows
}

fn compare(a: &MarketCoin, b: &MarketCoin, field: SortField) -> Ordering {
    match field {
        SortField::Coin => a.symbol.to_lowercase().cmp(&b.symbol.to_lowercase()),
        SortField::Price => a.price.total_cmp(&b.price),
        SortField::DailyChange => a.daily_change_pct.total_cmp(&b.daily_change_pct),
        SortField::Volume => a.volume.total_cmp(&b.volume),
    }
}
