//! Use Cases Layer - Application Logic
//!
//! Orchestrates domain logic with port interfaces. Each use case owns
//! one piece of mutable service state.
//!
//! Use cases:
//! - `SourceCascade`: ordered price provider fallback
//! - `PollingScheduler` / `QuoteBoard`: periodic quotes with stale-drop
//! - `NewsDesk`: feed refresh, merged batch, read markers
//! - `HeatMap`: market tiles, memoized layouts, resize debounce
//! - `SavedList`: favorites and bookmarks over the preference store
//! - `MarketAggregator`: facade over all of the above

pub mod aggregator;
pub mod cascade;
pub mod heatmap;
pub mod news;
pub mod poller;
pub mod watchlist;

pub use aggregator::{AggregatorDeps, AggregatorSettings, MarketAggregator};
pub use cascade::SourceCascade;
pub use heatmap::{HeatMap, HeatMapSettings, TileLayout};
pub use news::{NewsDesk, NewsStatus};
pub use poller::{PollingScheduler, QuoteBoard};
pub use watchlist::SavedList;
