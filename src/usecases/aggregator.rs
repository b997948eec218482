//! Market Aggregator - Single Facade for Presentation Clients
//!
//! Owns the polling scheduler, the news desk, the heat map and the two
//! saved lists. Clients read snapshots and subscribe to change
//! notifications; they never touch providers or feeds directly.
//!
//! `start` spawns the background work:
//! - news refresh loop (skipped when the refresh period is zero)
//! - heat map refresh loop
//! - resize debouncer

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::adapters::metrics::MetricsRegistry;
use crate::config::AppConfig;
use crate::domain::market::apply_query;
use crate::domain::{Article, ArticlePage, FeedSource, MarketCoin, MarketQuery, Quote, Rect};
use crate::error::{FetchError, NewsError};
use crate::ports::{FeedFetcher, MarketDataSource, PreferenceStore, PriceResolver};

use super::heatmap::{HeatMap, HeatMapSettings, HeatMapStatus, TileLayout};
use super::news::{NewsDesk, NewsStatus};
use super::poller::{PollingScheduler, QuoteBoard};
use super::watchlist::SavedList;

/// Collaborators behind the ports.
pub struct AggregatorDeps {
  pub resolver: Arc<dyn PriceResolver>,
  pub feeds: Arc<dyn FeedFetcher>,
  pub markets: Arc<dyn MarketDataSource>,
  pub preferences: Arc<dyn PreferenceStore>,
  pub metrics: Option<Arc<MetricsRegistry>>,
}

/// Timing and sizing knobs.
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
  pub poll_interval: Duration,
  pub feed_sources: Vec<FeedSource>,
  /// Zero disables the background news loop.
  pub news_refresh: Duration,
  /// Page size used when a caller passes 0.
  pub page_size: usize,
  pub heatmap_refresh: Duration,
  pub heatmap: HeatMapSettings,
}

impl AggregatorSettings {
  pub fn from_config(config: &AppConfig) -> Self {
    Self {
      poll_interval: config.polling.interval(),
      feed_sources: config.feeds.clone(),
      news_refresh: Duration::from_secs(config.news.refresh_secs),
      page_size: config.news.page_size,
      heatmap_refresh: config.heatmap.refresh_interval(),
      heatmap: config.heatmap.settings(),
    }
  }
}

impl Default for AggregatorSettings {
  fn default() -> Self {
    Self::from_config(&AppConfig::default())
  }
}

pub struct MarketAggregator {
  scheduler: PollingScheduler,
  news: Arc<NewsDesk>,
  heat_map: Arc<HeatMap>,
  favorites: SavedList,
  bookmarks: SavedList,
  settings: AggregatorSettings,
  tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MarketAggregator {
  /// Wire the facade and load both saved lists.
  pub async fn new(deps: AggregatorDeps, settings: AggregatorSettings) -> Result<Self> {
    let mut board = QuoteBoard::new();
    let mut news = NewsDesk::new(deps.feeds, settings.feed_sources.clone());
    let mut heat_map = HeatMap::new(deps.markets, settings.heatmap.clone());
    if let Some(metrics) = deps.metrics {
      board = board.with_metrics(Arc::clone(&metrics));
      news = news.with_metrics(Arc::clone(&metrics));
      heat_map = heat_map.with_metrics(metrics);
    }

    let favorites = SavedList::favorites(Arc::clone(&deps.preferences)).await?;
    let bookmarks = SavedList::bookmarks(deps.preferences).await?;

    Ok(Self {
      scheduler: PollingScheduler::new(deps.resolver, Arc::new(board), settings.poll_interval),
      news: Arc::new(news),
      heat_map: Arc::new(heat_map),
      favorites,
      bookmarks,
      settings,
      tasks: Mutex::new(Vec::new()),
    })
  }

  /// Spawn the refresh loops and the resize debouncer.
  #[instrument(skip(self, shutdown_tx))]
  pub fn start(&self, shutdown_tx: &broadcast::Sender<()>) {
    let mut handles = Vec::with_capacity(3);

    if self.settings.news_refresh.is_zero() {
      info!("Background news refresh disabled");
    } else {
      handles.push(tokio::spawn(
        Arc::clone(&self.news).run_refresh_loop(self.settings.news_refresh, shutdown_tx.subscribe()),
      ));
    }
    handles.push(tokio::spawn(
      Arc::clone(&self.heat_map).run_refresh_loop(self.settings.heatmap_refresh, shutdown_tx.subscribe()),
    ));
    handles.push(tokio::spawn(
      Arc::clone(&self.heat_map).run_resize_debouncer(shutdown_tx.subscribe()),
    ));

    info!(tasks = handles.len(), "Aggregator started");
    self
      .tasks
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .extend(handles);
  }

  /// Cancel all polling and background loops. No quote is applied
  /// after this returns.
  pub fn stop(&self) {
    self.scheduler.stop();
    let handles: Vec<JoinHandle<()>> = self
      .tasks
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .drain(..)
      .collect();
    for handle in &handles {
      handle.abort();
    }
    info!(aborted = handles.len(), "Aggregator stopped");
  }

  // ── Quotes ──────────────────────────────────────────────

  pub fn current_quote(&self, symbol: &str) -> Option<Quote> {
    self.scheduler.board().current(symbol)
  }

  pub fn quotes(&self) -> Vec<Quote> {
    self.scheduler.board().snapshot()
  }

  pub fn subscribe_quotes(&self) -> broadcast::Receiver<Quote> {
    self.scheduler.board().subscribe()
  }

  pub fn track(&self, symbol: &str) -> Option<String> {
    self.scheduler.track(symbol)
  }

  pub fn switch_symbol(&self, symbol: &str) -> Option<String> {
    self.scheduler.switch_symbol(symbol)
  }

  pub fn untrack(&self, symbol: &str) -> bool {
    self.scheduler.untrack(symbol)
  }

  pub fn tracked(&self) -> Vec<String> {
    self.scheduler.tracked()
  }

  // ── News ────────────────────────────────────────────────

  /// One page of the current batch; `page_size == 0` uses the default.
  pub async fn article_page(&self, page: usize, page_size: usize) -> ArticlePage {
    let size = if page_size == 0 {
      self.settings.page_size
    } else {
      page_size
    };
    self.news.page(page, size).await
  }

  pub async fn refresh_news(&self) -> Result<usize, NewsError> {
    self.news.refresh().await
  }

  pub async fn news_status(&self) -> NewsStatus {
    self.news.status().await
  }

  pub async fn search_articles(&self, query: &str) -> Vec<Article> {
    self.news.search(query).await
  }

  pub async fn toggle_read(&self, url: &str) -> bool {
    self.news.toggle_read(url).await
  }

  pub async fn is_read(&self, url: &str) -> bool {
    self.news.is_read(url).await
  }

  // ── Heat map ────────────────────────────────────────────

  pub async fn tile_layout(&self, container: Rect) -> Arc<TileLayout> {
    self.heat_map.layout_for(container).await
  }

  pub fn request_resize(&self, container: Rect) {
    self.heat_map.request_resize(container);
  }

  pub fn subscribe_layouts(&self) -> broadcast::Receiver<Arc<TileLayout>> {
    self.heat_map.subscribe()
  }

  pub async fn refresh_heat_map(&self) -> Result<usize, FetchError> {
    self.heat_map.refresh().await
  }

  pub async fn heat_map_status(&self) -> HeatMapStatus {
    self.heat_map.status().await
  }

  // ── Market listing and favorites ────────────────────────

  pub async fn market_listing(&self, query: &MarketQuery) -> Vec<MarketCoin> {
    let coins = self.heat_map.coins().await;
    let favorites = self.favorites.items().await;
    apply_query(&coins, &favorites, query)
  }

  pub async fn favorites(&self) -> Vec<String> {
    self.favorites.items().await
  }

  pub async fn is_favorite(&self, symbol: &str) -> bool {
    self.favorites.contains(symbol).await
  }

  /// Returns whether the symbol is a favorite afterwards.
  pub async fn toggle_favorite(&self, symbol: &str) -> Result<bool> {
    self.favorites.toggle(symbol).await
  }

  pub async fn move_favorite(&self, from: usize, to: usize) -> Result<()> {
    self.favorites.move_item(from, to).await
  }

  // ── Bookmarks ───────────────────────────────────────────

  pub async fn bookmarks(&self) -> Vec<String> {
    self.bookmarks.items().await
  }

  pub async fn is_bookmarked(&self, url: &str) -> bool {
    self.bookmarks.contains(url).await
  }

  /// Returns whether the URL is bookmarked afterwards.
  pub async fn toggle_bookmark(&self, url: &str) -> Result<bool> {
    self.bookmarks.toggle(url).await
  }

  /// Bookmarked articles present in the current batch, newest first.
  pub async fn bookmarked_articles(&self) -> Vec<Article> {
    let saved = self.bookmarks.items().await;
    self
      .news
      .articles()
      .await
      .iter()
      .filter(|a| saved.contains(&a.url))
      .cloned()
      .collect()
  }
}

impl Drop for MarketAggregator {
  fn drop(&mut self) {
    for handle in self.tasks.lock().unwrap_or_else(PoisonError::into_inner).iter() {
      handle.abort();
    }
  }
}
