//! News Feed Adapters - RSS Download and Parsing
//!
//! - `http_fetcher`: implements `FeedFetcher` over the shared client
//! - `rss`: tolerant RSS 2.0 parser producing `Article`s

pub mod http_fetcher;
pub mod rss;

pub use http_fetcher::HttpFeedFetcher;
