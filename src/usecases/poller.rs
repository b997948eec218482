//! Polling Scheduler - Periodic Quote Resolution per Symbol
//!
//! Each tracked symbol owns one timer task. Every tick issues a fresh
//! generation number and spawns the resolution, so a slow cascade never
//! delays the next tick. Completions land on the `QuoteBoard`, which only
//! accepts a quote whose generation is newer than the last one applied
//! and newer than the symbol's cancellation floor. Out-of-order and
//! post-cancellation completions are therefore dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::Quote;
use crate::domain::quote::normalize_symbol;
use crate::ports::PriceResolver;

/// Capacity of the quote notification channel.
const QUOTE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct Slot {
  /// Latest accepted quote; survives failures and cancellation.
  quote: Option<Quote>,
  /// Generation of `quote`.
  applied: u64,
  /// Completions at or below this generation are stale.
  floor: u64,
  /// Timer session allowed to issue generations, if any.
  session: Option<u64>,
}

#[derive(Debug, Default)]
struct BoardState {
  slots: HashMap<String, Slot>,
}

/// Per-symbol quote slots guarded by the generation check.
pub struct QuoteBoard {
  state: Mutex<BoardState>,
  /// Global monotonic counter for sessions and generations.
  counter: AtomicU64,
  tx: broadcast::Sender<Quote>,
  metrics: Option<Arc<MetricsRegistry>>,
}

impl Default for QuoteBoard {
  fn default() -> Self {
    Self::new()
  }
}

impl QuoteBoard {
  pub fn new() -> Self {
    let (tx, _) = broadcast::channel(QUOTE_CHANNEL_CAPACITY);
    Self {
      state: Mutex::new(BoardState::default()),
      counter: AtomicU64::new(0),
      tx,
      metrics: None,
    }
  }

  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  fn lock(&self) -> MutexGuard<'_, BoardState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn next_number(&self) -> u64 {
    self.counter.fetch_add(1, Ordering::SeqCst) + 1
  }

  /// Open a new timer session for `symbol`, fencing off everything the
  /// previous session issued. Returns the session id.
  pub fn activate(&self, symbol: &str) -> u64 {
    let mut state = self.lock();
    let session = self.next_number();
    let slot = state.slots.entry(symbol.to_string()).or_default();
    slot.floor = session;
    slot.session = Some(session);
    session
  }

  /// Close the symbol's session; in-flight completions become stale.
  pub fn deactivate(&self, symbol: &str) {
    let mut state = self.lock();
    if let Some(slot) = state.slots.get_mut(symbol) {
      slot.floor = self.next_number();
      slot.session = None;
    }
  }

  /// Issue a generation for one attempt, or `None` if `session` is no
  /// longer the symbol's live session.
  pub fn issue(&self, symbol: &str, session: u64) -> Option<u64> {
    let state = self.lock();
    let live = state.slots.get(symbol).and_then(|s| s.session);
    (live == Some(session)).then(|| self.next_number())
  }

  /// Apply a completion. Returns whether it was accepted.
  pub fn apply(&self, symbol: &str, generation: u64, quote: Quote) -> bool {
    let mut state = self.lock();
    let slot = state.slots.entry(symbol.to_string()).or_default();

    if generation <= slot.applied || generation <= slot.floor {
      debug!(
        symbol,
        generation,
        applied = slot.applied,
        floor = slot.floor,
        "Dropping stale completion"
      );
      if let Some(metrics) = &self.metrics {
        metrics.stale_completions.with_label_values(&[symbol]).inc();
      }
      return false;
    }

    slot.applied = generation;
    slot.quote = Some(quote.clone());

    // Sent under the lock: notifications follow generation order and
    // none are published after a deactivate returns.
    if let Some(metrics) = &self.metrics {
      metrics
        .quote_price
        .with_label_values(&[symbol])
        .set(quote.price);
    }
    // No subscribers is fine.
    let _ = self.tx.send(quote);
    drop(state);
    true
  }

  pub fn current(&self, symbol: &str) -> Option<Quote> {
    self
      .lock()
      .slots
      .get(&normalize_symbol(symbol))
      .and_then(|s| s.quote.clone())
  }

  /// Every known quote, sorted by symbol.
  pub fn snapshot(&self) -> Vec<Quote> {
    let mut quotes: Vec<Quote> = self
      .lock()
      .slots
      .values()
      .filter_map(|s| s.quote.clone())
      .collect();
    quotes.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    quotes
  }

  pub fn subscribe(&self) -> broadcast::Receiver<Quote> {
    self.tx.subscribe()
  }
}

/// Drives one timer per tracked symbol.
pub struct PollingScheduler {
  resolver: Arc<dyn PriceResolver>,
  board: Arc<QuoteBoard>,
  interval: Duration,
  timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl PollingScheduler {
  pub fn new(resolver: Arc<dyn PriceResolver>, board: Arc<QuoteBoard>, interval: Duration) -> Self {
    Self {
      resolver,
      board,
      interval: interval.max(Duration::from_millis(1)),
      timers: Mutex::new(HashMap::new()),
    }
  }

  pub fn board(&self) -> &Arc<QuoteBoard> {
    &self.board
  }

  fn timers(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
    self.timers.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Start polling `symbol`: one immediate resolution, then one per
  /// interval. Tracking an already tracked symbol restarts its schedule.
  ///
  /// Returns the normalized symbol, or `None` for a blank one.
  #[instrument(skip(self))]
  pub fn track(&self, symbol: &str) -> Option<String> {
    let symbol = normalize_symbol(symbol);
    if symbol.is_empty() {
      warn!("Ignoring blank symbol");
      return None;
    }
    let mut timers = self.timers();
    self.start_timer(&mut timers, &symbol);
    Some(symbol)
  }

  /// Single-symbol mode: cancel every other schedule, then track `symbol`.
  ///
  /// The timer map stays locked for the whole switch, so a concurrent
  /// `track` lands either before (and is cancelled) or after it.
  #[instrument(skip(self))]
  pub fn switch_symbol(&self, symbol: &str) -> Option<String> {
    let target = normalize_symbol(symbol);
    if target.is_empty() {
      return None;
    }

    let mut timers = self.timers();
    let others: Vec<String> = timers.keys().filter(|s| **s != target).cloned().collect();
    for other in &others {
      if let Some(handle) = timers.remove(other) {
        handle.abort();
      }
      self.board.deactivate(other);
    }
    if !others.is_empty() {
      info!(cancelled = ?others, "Switched away from symbols");
    }
    self.start_timer(&mut timers, &target);
    Some(target)
  }

  /// (Re)start the timer for an already normalized `symbol`. Caller holds
  /// the timer map.
  fn start_timer(&self, timers: &mut HashMap<String, JoinHandle<()>>, symbol: &str) {
    if let Some(previous) = timers.remove(symbol) {
      previous.abort();
    }
    let session = self.board.activate(symbol);
    let handle = tokio::spawn(run_timer(
      Arc::clone(&self.resolver),
      Arc::clone(&self.board),
      symbol.to_string(),
      session,
      self.interval,
    ));
    timers.insert(symbol.to_string(), handle);

    info!(symbol, interval_ms = self.interval.as_millis() as u64, "Tracking symbol");
  }

  /// Stop polling `symbol`. Its last quote stays readable.
  pub fn untrack(&self, symbol: &str) -> bool {
    let symbol = normalize_symbol(symbol);
    let mut timers = self.timers();
    let removed = timers.remove(&symbol);
    self.board.deactivate(&symbol);
    drop(timers);
    match removed {
      Some(handle) => {
        handle.abort();
        info!(symbol = %symbol, "Untracked symbol");
        true
      }
      None => false,
    }
  }

  /// Stop every schedule. No quote is applied after this returns.
  pub fn stop(&self) {
    let mut timers = self.timers();
    let stopped = timers.len();
    for (symbol, handle) in timers.drain() {
      self.board.deactivate(&symbol);
      handle.abort();
    }
    drop(timers);
    info!(stopped, "Polling stopped");
  }

  /// Currently tracked symbols, sorted.
  pub fn tracked(&self) -> Vec<String> {
    let mut symbols: Vec<String> = self.timers().keys().cloned().collect();
    symbols.sort();
    symbols
  }
}

impl Drop for PollingScheduler {
  fn drop(&mut self) {
    for handle in self.timers().values() {
      handle.abort();
    }
  }
}

async fn run_timer(
  resolver: Arc<dyn PriceResolver>,
  board: Arc<QuoteBoard>,
  symbol: String,
  session: u64,
  period: Duration,
) {
  let mut ticker = tokio::time::interval(period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    ticker.tick().await;
    let Some(generation) = board.issue(&symbol, session) else {
      break;
    };

    let resolver = Arc::clone(&resolver);
    let board = Arc::clone(&board);
    let symbol = symbol.clone();
    tokio::spawn(async move {
      match resolver.resolve(&symbol).await {
        Ok(quote) => {
          board.apply(&symbol, generation, quote);
        }
        Err(e) => {
          warn!(symbol = %symbol, generation, error = %e, "Resolution failed, keeping last quote");
        }
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use std::collections::VecDeque;

  use async_trait::async_trait;

  use super::*;
  use crate::domain::QuoteSource;
  use crate::error::{CascadeError, FetchError};

  /// Resolver that answers from a script of (delay, price) steps; `None`
  /// prices fail.
  struct ScriptedResolver {
    script: Mutex<VecDeque<(u64, Option<f64>)>>,
    calls: AtomicU64,
  }

  impl ScriptedResolver {
    fn new(steps: &[(u64, Option<f64>)]) -> Arc<Self> {
      Arc::new(Self {
        script: Mutex::new(steps.iter().copied().collect()),
        calls: AtomicU64::new(0),
      })
    }
  }

  #[async_trait]
  impl PriceResolver for ScriptedResolver {
    async fn resolve(&self, symbol: &str) -> Result<Quote, CascadeError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let step = self.script.lock().unwrap().pop_front();
      let (delay_ms, price) = step.unwrap_or((0, Some(1.0)));
      tokio::time::sleep(Duration::from_millis(delay_ms)).await;
      price
        .and_then(|p| Quote::new(symbol, p, QuoteSource::Primary, "scripted"))
        .ok_or(CascadeError::AllProvidersFailed {
          symbol: symbol.to_string(),
          attempts: 1,
          last: FetchError::Status(500),
        })
    }
  }

  fn scheduler(resolver: Arc<ScriptedResolver>) -> PollingScheduler {
    PollingScheduler::new(resolver, Arc::new(QuoteBoard::new()), Duration::from_secs(5))
  }

  #[tokio::test(start_paused = true)]
  async fn test_track_resolves_immediately_then_every_interval() {
    let resolver = ScriptedResolver::new(&[(0, Some(100.0)), (0, Some(101.0)), (0, Some(102.0))]);
    let poller = scheduler(Arc::clone(&resolver));

    assert_eq!(poller.track(" btc ").as_deref(), Some("BTC"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(poller.board().current("BTC").unwrap().price, 100.0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(poller.board().current("btc").unwrap().price, 101.0);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_generation_is_discarded() {
    // First attempt is slow, second is fast and overtakes it.
    let resolver = ScriptedResolver::new(&[(8_000, Some(100.0)), (1_000, Some(200.0))]);
    let poller = scheduler(resolver);
    poller.track("BTC");

    tokio::time::sleep(Duration::from_millis(6_500)).await;
    assert_eq!(poller.board().current("BTC").unwrap().price, 200.0);

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(poller.board().current("BTC").unwrap().price, 200.0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failure_keeps_previous_quote() {
    let resolver = ScriptedResolver::new(&[(0, Some(100.0)), (0, None)]);
    let poller = scheduler(resolver);
    poller.track("ETH");

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(poller.board().current("ETH").unwrap().price, 100.0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_no_updates_after_stop() {
    let resolver = ScriptedResolver::new(&[(3_000, Some(100.0))]);
    let poller = scheduler(Arc::clone(&resolver));
    let mut rx = poller.board().subscribe();
    poller.track("BTC");

    tokio::time::sleep(Duration::from_millis(100)).await;
    poller.stop();
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert!(poller.board().current("BTC").is_none());
    assert!(rx.try_recv().is_err());
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    assert!(poller.tracked().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_switch_symbol_cancels_others() {
    let resolver = ScriptedResolver::new(&[]);
    let poller = scheduler(resolver);
    poller.track("BTC");
    poller.track("ETH");
    assert_eq!(poller.tracked(), ["BTC", "ETH"]);

    poller.switch_symbol("sol");
    assert_eq!(poller.tracked(), ["SOL"]);
    assert!(!poller.untrack("BTC"));
    assert!(poller.untrack("SOL"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_retrack_fences_in_flight_attempt() {
    let resolver = ScriptedResolver::new(&[(3_000, Some(100.0)), (0, Some(300.0))]);
    let poller = scheduler(resolver);
    poller.track("BTC");
    tokio::time::sleep(Duration::from_millis(100)).await;

    poller.track("BTC");
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(poller.board().current("BTC").unwrap().price, 300.0);
  }

  #[test]
  fn test_notifications_follow_generation_order_across_threads() {
    for _ in 0..50 {
      let board = Arc::new(QuoteBoard::new());
      let session = board.activate("BTC");
      let generations: Vec<u64> = (0..64).filter_map(|_| board.issue("BTC", session)).collect();
      let mut rx = board.subscribe();

      let workers: Vec<_> = [0usize, 1]
        .into_iter()
        .map(|offset| {
          let board = Arc::clone(&board);
          let mine: Vec<u64> = generations.iter().copied().skip(offset).step_by(2).collect();
          std::thread::spawn(move || {
            for generation in mine {
              #[allow(clippy::cast_precision_loss)]
              let quote = Quote::new("BTC", generation as f64, QuoteSource::Primary, "t").unwrap();
              board.apply("BTC", generation, quote);
            }
          })
        })
        .collect();
      for worker in workers {
        worker.join().unwrap();
      }

      let mut last_seen: Option<Quote> = None;
      while let Ok(quote) = rx.try_recv() {
        if let Some(previous) = &last_seen {
          assert!(quote.price > previous.price, "notification went backwards");
        }
        last_seen = Some(quote);
      }
      assert_eq!(
        last_seen.map(|q| q.price),
        board.current("BTC").map(|q| q.price)
      );
    }
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_concurrent_track_and_switch_keep_board_sessions_consistent() {
    let poller = Arc::new(PollingScheduler::new(
      ScriptedResolver::new(&[]),
      Arc::new(QuoteBoard::new()),
      Duration::from_secs(60),
    ));
    let symbols = ["BTC", "ETH", "SOL", "ADA"];

    let mut workers = Vec::new();
    for worker in 0..4usize {
      let poller = Arc::clone(&poller);
      workers.push(tokio::task::spawn_blocking(move || {
        for round in 0..200usize {
          let symbol = symbols[(worker + round) % symbols.len()];
          match (worker + round) % 3 {
            0 => {
              poller.switch_symbol(symbol);
            }
            1 => {
              poller.track(symbol);
            }
            _ => {
              poller.untrack(symbol);
            }
          }
        }
      }));
    }
    for worker in workers {
      worker.await.unwrap();
    }

    // Every listed timer owns a live board session and vice versa.
    let tracked = poller.tracked();
    let state = poller.board().lock();
    for symbol in symbols {
      let live = state.slots.get(symbol).is_some_and(|s| s.session.is_some());
      assert_eq!(live, tracked.iter().any(|t| t == symbol), "{symbol} out of sync");
    }
    drop(state);

    poller.switch_symbol("ADA");
    assert_eq!(poller.tracked(), ["ADA"]);
  }

  #[test]
  fn test_board_generation_rules() {
    let board = QuoteBoard::new();
    let quote = |p| Quote::new("BTC", p, QuoteSource::Primary, "t").unwrap();

    let session = board.activate("BTC");
    let g1 = board.issue("BTC", session).unwrap();
    let g2 = board.issue("BTC", session).unwrap();
    assert!(board.apply("BTC", g2, quote(2.0)));
    assert!(!board.apply("BTC", g1, quote(1.0)));
    assert_eq!(board.current("BTC").unwrap().price, 2.0);

    let g3 = board.issue("BTC", session).unwrap();
    board.deactivate("BTC");
    assert!(board.issue("BTC", session).is_none());
    assert!(!board.apply("BTC", g3, quote(3.0)));
    assert_eq!(board.snapshot().len(), 1);
  }
}
