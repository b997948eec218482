//! News Desk - Feed Refresh, Batch Ownership and Read Markers
//!
//! A refresh downloads every configured feed concurrently, parses each
//! body, merges the results and swaps the batch in one step. Individual
//! feed failures are logged and skipped. If every feed fails the previous
//! batch stays in place and the failure is recorded for the client's
//! retry affordance.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::time::MissedTickBehavior;
use tracing::{info, instrument, warn};

use crate::adapters::feeds::rss;
use crate::adapters::metrics::MetricsRegistry;
use crate::domain::article::{self, merge_batches, paginate};
use crate::domain::{Article, ArticlePage, FeedSource};
use crate::error::NewsError;
use crate::ports::FeedFetcher;

/// Refresh bookkeeping surfaced to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewsStatus {
  /// When the current batch was installed.
  pub last_refreshed: Option<DateTime<Utc>>,
  /// Error of the latest refresh, cleared by the next success.
  #[serde(skip)]
  pub last_error: Option<NewsError>,
  /// Articles in the current batch.
  pub article_count: usize,
  /// Sources that failed during the latest refresh.
  pub failed_sources: Vec<String>,
}

#[derive(Debug, Default)]
struct DeskState {
  articles: Arc<Vec<Article>>,
  read: HashSet<String>,
  status: NewsStatus,
}

/// Owner of the current article batch.
pub struct NewsDesk {
  fetcher: Arc<dyn FeedFetcher>,
  sources: Vec<FeedSource>,
  state: RwLock<DeskState>,
  /// Serializes refreshes so batches install in request order.
  refresh_gate: Mutex<()>,
  metrics: Option<Arc<MetricsRegistry>>,
}

impl NewsDesk {
  pub fn new(fetcher: Arc<dyn FeedFetcher>, sources: Vec<FeedSource>) -> Self {
    Self {
      fetcher,
      sources,
      state: RwLock::new(DeskState::default()),
      refresh_gate: Mutex::new(()),
      metrics: None,
    }
  }

  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  pub fn sources(&self) -> &[FeedSource] {
    &self.sources
  }

  async fn fetch_one(&self, source: &FeedSource) -> Option<Vec<Article>> {
    let outcome = self.fetcher.fetch(source).await;
    let label = outcome.as_ref().map_or_else(|e| e.kind(), |_| "success");
    if let Some(metrics) = &self.metrics {
      metrics
        .feed_fetches
        .with_label_values(&[source.source_name.as_str(), label])
        .inc();
    }

    match outcome {
      Ok(body) => Some(rss::parse(&body, &source.source_name)),
      Err(e) => {
        warn!(source = %source.source_name, url = %source.url, error = %e, "Feed fetch failed");
        None
      }
    }
  }

  /// Fetch, merge and install a new batch. Returns the batch size.
  #[instrument(skip(self), fields(feeds = self.sources.len()))]
  pub async fn refresh(&self) -> Result<usize, NewsError> {
    if self.sources.is_empty() {
      return Err(NewsError::NoFeeds);
    }
    let _gate = self.refresh_gate.lock().await;

    let results = join_all(self.sources.iter().map(|s| self.fetch_one(s))).await;

    let mut failed = Vec::new();
    let mut batches = Vec::new();
    for (source, result) in self.sources.iter().zip(results) {
      match result {
        Some(batch) => batches.push(batch),
        None => failed.push(source.source_name.clone()),
      }
    }

    let mut state = self.state.write().await;
    if batches.is_empty() {
      let err = NewsError::AllFeedsFailed(failed.len());
      warn!(kept = state.articles.len(), "All feeds failed, keeping previous batch");
      state.status.last_error = Some(err.clone());
      state.status.failed_sources = failed;
      return Err(err);
    }

    let merged = merge_batches(batches);
    let count = merged.len();
    state.articles = Arc::new(merged);
    state.status = NewsStatus {
      last_refreshed: Some(Utc::now()),
      last_error: None,
      article_count: count,
      failed_sources: failed,
    };
    drop(state);

    if let Some(metrics) = &self.metrics {
      metrics
        .articles_available
        .set(i64::try_from(count).unwrap_or(i64::MAX));
    }
    info!(articles = count, "News batch installed");
    Ok(count)
  }

  /// Current batch, newest first.
  pub async fn articles(&self) -> Arc<Vec<Article>> {
    Arc::clone(&self.state.read().await.articles)
  }

  pub async fn page(&self, page: usize, page_size: usize) -> ArticlePage {
    let articles = self.articles().await;
    paginate(&articles, page, page_size)
  }

  /// Case-insensitive title search over the current batch.
  pub async fn search(&self, query: &str) -> Vec<Article> {
    let articles = self.articles().await;
    article::search(&articles, query)
      .into_iter()
      .cloned()
      .collect()
  }

  pub async fn status(&self) -> NewsStatus {
    self.state.read().await.status.clone()
  }

  /// Flip the read marker for `url`; returns the new state.
  pub async fn toggle_read(&self, url: &str) -> bool {
    let mut state = self.state.write().await;
    if state.read.remove(url) {
      false
    } else {
      state.read.insert(url.to_string());
      true
    }
  }

  pub async fn is_read(&self, url: &str) -> bool {
    self.state.read().await.read.contains(url)
  }

  /// Refresh every `period` (first refresh immediately) until shutdown.
  #[instrument(skip(self, shutdown_rx), name = "news_refresh")]
  pub async fn run_refresh_loop(self: Arc<Self>, period: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => break,
        _ = ticker.tick() => {
          // Outcome is recorded in the status.
          let _ = self.refresh().await;
        }
      }
    }
    info!("News refresh loop stopped");
  }
}
