//! Heat Map - Market Tiles, Memoized Layouts and Resize Debounce
//!
//! Market rows are refreshed periodically; a failed refresh keeps the
//! previous rows. Each successful refresh bumps the tile-set version.
//! Layouts are memoized by (version, container) so repeated reads of the
//! same size never recompute. Container changes go through a watch
//! channel and are only laid out once the size has been quiet for the
//! debounce window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tracing::{debug, info, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::treemap::{collapse_others, color_bound, layout, tile_cap_for_width};
use crate::domain::{MarketCoin, PlacedTile, Rect, Tile};
use crate::error::FetchError;
use crate::ports::MarketDataSource;

/// Capacity of the layout notification channel.
const LAYOUT_CHANNEL_CAPACITY: usize = 16;

/// Layout tuning.
#[derive(Debug, Clone)]
pub struct HeatMapSettings {
  /// Upper bound on individually shown tiles (before Others).
  pub max_tiles: usize,
  /// Container width granted to each shown tile.
  pub pixels_per_tile: f64,
  /// Gap between neighbouring tiles.
  pub spacing: f64,
  /// Quiet period before a resize is laid out.
  pub debounce: Duration,
}

impl Default for HeatMapSettings {
  fn default() -> Self {
    Self {
      max_tiles: 30,
      pixels_per_tile: 80.0,
      spacing: 2.0,
      debounce: Duration::from_millis(150),
    }
  }
}

/// A computed heat map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileLayout {
  /// Tile-set version the layout was computed from.
  pub version: u64,
  pub container: Rect,
  /// Tiles with rectangles, heaviest first, Others last.
  pub tiles: Vec<PlacedTile>,
  /// Symmetric colour scale bound for `value`.
  pub color_bound: f64,
}

#[derive(Debug, Default)]
struct HeatState {
  coins: Arc<Vec<MarketCoin>>,
  version: u64,
  last_refreshed: Option<DateTime<Utc>>,
  last_error: Option<FetchError>,
  container: Option<Rect>,
  memo: Option<Arc<TileLayout>>,
}

/// Refresh bookkeeping surfaced to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatMapStatus {
  pub version: u64,
  pub coins: usize,
  pub last_refreshed: Option<DateTime<Utc>>,
  #[serde(skip)]
  pub last_error: Option<FetchError>,
}

pub struct HeatMap {
  source: Arc<dyn MarketDataSource>,
  settings: HeatMapSettings,
  state: RwLock<HeatState>,
  /// Serializes refreshes so tile sets install in request order.
  refresh_gate: Mutex<()>,
  layout_tx: broadcast::Sender<Arc<TileLayout>>,
  resize_tx: watch::Sender<Option<Rect>>,
  metrics: Option<Arc<MetricsRegistry>>,
}

impl HeatMap {
  pub fn new(source: Arc<dyn MarketDataSource>, settings: HeatMapSettings) -> Self {
    let (layout_tx, _) = broadcast::channel(LAYOUT_CHANNEL_CAPACITY);
    let (resize_tx, _) = watch::channel(None);
    Self {
      source,
      settings,
      state: RwLock::new(HeatState::default()),
      refresh_gate: Mutex::new(()),
      layout_tx,
      resize_tx,
      metrics: None,
    }
  }

  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  /// Latest market rows (also the input of the market listing).
  pub async fn coins(&self) -> Arc<Vec<MarketCoin>> {
    Arc::clone(&self.state.read().await.coins)
  }

  pub async fn status(&self) -> HeatMapStatus {
    let state = self.state.read().await;
    HeatMapStatus {
      version: state.version,
      coins: state.coins.len(),
      last_refreshed: state.last_refreshed,
      last_error: state.last_error.clone(),
    }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<Arc<TileLayout>> {
    self.layout_tx.subscribe()
  }

  /// Pull fresh market rows. On failure the previous rows stay.
  #[instrument(skip(self))]
  pub async fn refresh(&self) -> Result<usize, FetchError> {
    let _gate = self.refresh_gate.lock().await;
    let fetched = self.source.fetch_markets().await;

    let mut state = self.state.write().await;
    let coins = match fetched {
      Ok(coins) => coins,
      Err(e) => {
        warn!(error = %e, kept = state.coins.len(), "Market refresh failed, keeping previous tiles");
        state.last_error = Some(e.clone());
        return Err(e);
      }
    };

    let count = coins.len();
    state.coins = Arc::new(coins);
    state.version += 1;
    state.last_refreshed = Some(Utc::now());
    state.last_error = None;
    state.memo = None;
    info!(coins = count, version = state.version, "Market tiles refreshed");

    if let Some(container) = state.container {
      let computed = self.compute(&mut state, container);
      drop(state);
      let _ = self.layout_tx.send(computed);
    }
    Ok(count)
  }

  /// Layout for `container`, memoized per tile-set version.
  pub async fn layout_for(&self, container: Rect) -> Arc<TileLayout> {
    {
      let state = self.state.read().await;
      if let Some(memo) = state.memo.as_ref().filter(|m| Self::memo_hit(m, state.version, container)) {
        return Arc::clone(memo);
      }
    }
    let mut state = self.state.write().await;
    self.compute(&mut state, container)
  }

  fn memo_hit(memo: &TileLayout, version: u64, container: Rect) -> bool {
    memo.version == version && memo.container == container
  }

  fn compute(&self, state: &mut HeatState, container: Rect) -> Arc<TileLayout> {
    if let Some(memo) = state.memo.as_ref().filter(|m| Self::memo_hit(m, state.version, container)) {
      return Arc::clone(memo);
    }

    let cap = tile_cap_for_width(container.width, self.settings.pixels_per_tile, self.settings.max_tiles);
    let tiles: Vec<Tile> = state.coins.iter().map(MarketCoin::to_tile).collect();
    let tiles = collapse_others(tiles, cap);
    let rects = layout(&tiles, container, self.settings.spacing);
    let bound = color_bound(&tiles);

    let computed = Arc::new(TileLayout {
      version: state.version,
      container,
      tiles: tiles
        .into_iter()
        .zip(rects)
        .map(|(tile, rect)| PlacedTile { tile, rect })
        .collect(),
      color_bound: bound,
    });

    if let Some(metrics) = &self.metrics {
      metrics.layout_computations.inc();
    }
    debug!(version = state.version, cap, width = container.width, height = container.height, "Layout computed");
    state.memo = Some(Arc::clone(&computed));
    computed
  }

  /// Record a container size; the debouncer lays it out once it settles.
  pub fn request_resize(&self, container: Rect) {
    self.resize_tx.send_replace(Some(container));
  }

  async fn apply_container(&self, container: Rect) {
    let mut state = self.state.write().await;
    state.container = Some(container);
    let computed = self.compute(&mut state, container);
    drop(state);
    let _ = self.layout_tx.send(computed);
  }

  /// Lay out each settled container size until shutdown.
  #[instrument(skip(self, shutdown_rx), name = "heatmap_resize")]
  pub async fn run_resize_debouncer(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut sizes = self.resize_tx.subscribe();
    // A size requested before startup still needs its first layout.
    sizes.mark_changed();
    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => break,
        changed = sizes.changed() => if changed.is_err() { break },
      }

      loop {
        tokio::select! {
          biased;
          _ = shutdown_rx.recv() => return,
          changed = sizes.changed() => if changed.is_err() { return },
          () = tokio::time::sleep(self.settings.debounce) => break,
        }
      }

      let settled = *sizes.borrow_and_update();
      if let Some(container) = settled {
        self.apply_container(container).await;
      }
    }
    debug!("Resize debouncer stopped");
  }

  /// Refresh market rows every `period` (first refresh immediately).
  #[instrument(skip(self, shutdown_rx), name = "heatmap_refresh")]
  pub async fn run_refresh_loop(self: Arc<Self>, period: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => break,
        _ = ticker.tick() => {
          // Failures are logged and recorded in the status.
          let _ = self.refresh().await;
        }
      }
    }
    info!("Heat map refresh loop stopped");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::treemap::OTHERS_LABEL;
  use crate::ports::market_data::MockMarketDataSource;

  fn coin(symbol: &str, cap: f64, change: f64) -> MarketCoin {
    MarketCoin {
      id: symbol.to_lowercase(),
      symbol: symbol.to_string(),
      name: symbol.to_string(),
      price: 1.0,
      daily_change_pct: change,
      volume: 0.0,
      market_cap: cap,
    }
  }

  fn source(coins: Vec<MarketCoin>) -> Arc<dyn MarketDataSource> {
    let mut mock = MockMarketDataSource::new();
    mock.expect_fetch_markets().returning(move || Ok(coins.clone()));
    Arc::new(mock)
  }

  fn settings() -> HeatMapSettings {
    HeatMapSettings {
      max_tiles: 2,
      pixels_per_tile: 80.0,
      spacing: 0.0,
      debounce: Duration::from_millis(100),
    }
  }

  #[tokio::test]
  async fn test_layout_collapses_and_memoizes() {
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let heat = HeatMap::new(
      source(vec![coin("BTC", 50.0, 2.0), coin("ETH", 30.0, -1.0), coin("SOL", 15.0, 4.0), coin("XRP", 5.0, -20.0)]),
      settings(),
    )
    .with_metrics(Arc::clone(&metrics));
    heat.refresh().await.unwrap();

    let container = Rect::new(0.0, 0.0, 400.0, 100.0);
    let first = heat.layout_for(container).await;
    let labels: Vec<&str> = first.tiles.iter().map(|t| t.tile.label.as_str()).collect();
    assert_eq!(labels, ["BTC", "ETH", OTHERS_LABEL]);
    assert!((first.tiles[2].tile.value - (4.0 * 15.0 - 20.0 * 5.0) / 20.0).abs() < 1e-9);
    assert_eq!(first.color_bound, 10.0);

    let total: f64 = first.tiles.iter().map(|t| t.rect.area()).sum();
    assert!((total - container.area()).abs() < 1e-6);

    let again = heat.layout_for(container).await;
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(metrics.layout_computations.get(), 1);
  }

  #[tokio::test]
  async fn test_narrow_container_lowers_cap() {
    let heat = HeatMap::new(
      source(vec![coin("BTC", 50.0, 0.0), coin("ETH", 30.0, 0.0), coin("SOL", 20.0, 0.0)]),
      settings(),
    );
    heat.refresh().await.unwrap();
    let layout = heat.layout_for(Rect::new(0.0, 0.0, 100.0, 100.0)).await;
    assert_eq!(layout.tiles.len(), 2);
    assert_eq!(layout.tiles[1].tile.label, OTHERS_LABEL);
  }

  #[tokio::test]
  async fn test_failed_refresh_keeps_tiles() {
    let mut mock = MockMarketDataSource::new();
    let mut calls = 0;
    mock.expect_fetch_markets().returning(move || {
      calls += 1;
      if calls == 1 {
        Ok(vec![coin("BTC", 1.0, 0.0)])
      } else {
        Err(FetchError::Status(429))
      }
    });
    let heat = HeatMap::new(Arc::new(mock), settings());

    heat.refresh().await.unwrap();
    assert_eq!(heat.refresh().await, Err(FetchError::Status(429)));
    let status = heat.status().await;
    assert_eq!(status.coins, 1);
    assert_eq!(status.version, 1);
    assert_eq!(status.last_error, Some(FetchError::Status(429)));
  }

  #[tokio::test(start_paused = true)]
  async fn test_resize_is_debounced() {
    let heat = Arc::new(HeatMap::new(source(vec![coin("BTC", 1.0, 0.0)]), settings()));
    heat.refresh().await.unwrap();
    let mut layouts = heat.subscribe();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(Arc::clone(&heat).run_resize_debouncer(shutdown_rx));
    tokio::task::yield_now().await;

    for width in [100.0, 200.0, 300.0] {
      heat.request_resize(Rect::new(0.0, 0.0, width, 50.0));
      tokio::time::sleep(Duration::from_millis(30)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let settled = layouts.try_recv().unwrap();
    assert_eq!(settled.container.width, 300.0);
    assert!(layouts.try_recv().is_err());

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
  }

  #[tokio::test(start_paused = true)]
  async fn test_resize_requested_before_debouncer_starts_is_laid_out() {
    let heat = Arc::new(HeatMap::new(source(vec![coin("BTC", 1.0, 0.0)]), settings()));
    heat.request_resize(Rect::new(0.0, 0.0, 300.0, 200.0));

    let mut layouts = heat.subscribe();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(Arc::clone(&heat).run_resize_debouncer(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let initial = layouts.try_recv().unwrap();
    assert_eq!(initial.container.width, 300.0);

    heat.refresh().await.unwrap();
    let refreshed = layouts.try_recv().unwrap();
    assert_eq!(refreshed.tiles.len(), 1);
    assert_eq!(refreshed.container.height, 200.0);

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
  }

  /// First fetch is slow, every later one is fast.
  struct SlowFirstSource {
    calls: std::sync::atomic::AtomicUsize,
  }

  #[async_trait::async_trait]
  impl MarketDataSource for SlowFirstSource {
    async fn fetch_markets(&self) -> Result<Vec<MarketCoin>, FetchError> {
      let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
      if call == 0 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(vec![coin("OLD", 1.0, 0.0)])
      } else {
        Ok(vec![coin("NEW", 1.0, 0.0)])
      }
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_overlapping_refreshes_install_in_call_order() {
    let heat = HeatMap::new(
      Arc::new(SlowFirstSource {
        calls: std::sync::atomic::AtomicUsize::new(0),
      }),
      settings(),
    );

    let (first, second) = tokio::join!(heat.refresh(), async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      heat.refresh().await
    });
    assert_eq!(first, Ok(1));
    assert_eq!(second, Ok(1));

    let status = heat.status().await;
    assert_eq!(status.version, 2);
    assert_eq!(heat.coins().await[0].symbol, "NEW");
  }
}
