//! Domain layer - Core market-data types and algorithms.
//!
//! Pure logic only (hexagonal architecture inner ring): quotes, news
//! articles and their merge/pagination rules, the squarified treemap,
//! and the market listing filters. No network or file I/O here.

pub mod article;
pub mod market;
pub mod quote;
pub mod treemap;

// Re-export core types for convenience
pub use article::{Article, ArticlePage, FeedSource};
pub use market::{MarketCoin, MarketQuery, MarketSegment, SortDirection, SortField, SortState};
pub use quote::{Quote, QuoteSource};
pub use treemap::{PlacedTile, Rect, Tile};
