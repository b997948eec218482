//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires from
//! the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `PriceProvider` / `PriceResolver`: single-source prices and the cascade
//! - `FeedFetcher`: raw syndication feed bytes
//! - `MarketDataSource`: market listing rows (heat-map input)
//! - `PreferenceStore`: external key-value store for saved lists

pub mod feed_fetcher;
pub mod market_data;
pub mod preferences;
pub mod price_provider;

pub use feed_fetcher::FeedFetcher;
pub use market_data::MarketDataSource;
pub use preferences::PreferenceStore;
pub use price_provider::{PriceProvider, PriceResolver};
