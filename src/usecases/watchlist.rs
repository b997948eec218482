//! Saved Lists - Favorites and Bookmarks over the Preference Store
//!
//! Each list is read once at startup and written back in full on every
//! change. The async mutex is held across the write, so two concurrent
//! toggles serialize instead of overwriting each other. A failed write
//! leaves the in-memory list unchanged.

use std::sync::Arc;

use anyhow::{Context, Result, ensure};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::domain::quote::normalize_symbol;
use crate::ports::PreferenceStore;

/// Preference key for favorite coin symbols.
pub const FAVORITES_KEY: &str = "favoriteCoinSymbols";
/// Preference key for bookmarked article URLs.
pub const BOOKMARKS_KEY: &str = "bookmarkedArticleURLs";

fn trimmed(value: &str) -> String {
  value.trim().to_string()
}

/// Ordered, duplicate-free list persisted under one key.
pub struct SavedList {
  key: &'static str,
  store: Arc<dyn PreferenceStore>,
  items: Mutex<Vec<String>>,
  normalize: fn(&str) -> String,
}

impl SavedList {
  /// Load the list under `key`, normalizing and deduplicating entries.
  pub async fn load(
    store: Arc<dyn PreferenceStore>,
    key: &'static str,
    normalize: fn(&str) -> String,
  ) -> Result<Self> {
    let stored = store
      .load_list(key)
      .await
      .with_context(|| format!("Failed to load saved list {key}"))?;

    let mut items: Vec<String> = Vec::with_capacity(stored.len());
    for value in stored.iter().map(|v| normalize(v)) {
      if !value.is_empty() && !items.contains(&value) {
        items.push(value);
      }
    }
    info!(key, count = items.len(), "Saved list loaded");

    Ok(Self {
      key,
      store,
      items: Mutex::new(items),
      normalize,
    })
  }

  /// Favorite coin symbols, stored uppercase.
  pub async fn favorites(store: Arc<dyn PreferenceStore>) -> Result<Self> {
    Self::load(store, FAVORITES_KEY, normalize_symbol).await
  }

  /// Bookmarked article URLs.
  pub async fn bookmarks(store: Arc<dyn PreferenceStore>) -> Result<Self> {
    Self::load(store, BOOKMARKS_KEY, trimmed).await
  }

  pub const fn key(&self) -> &'static str {
    self.key
  }

  pub async fn items(&self) -> Vec<String> {
    self.items.lock().await.clone()
  }

  pub async fn contains(&self, item: &str) -> bool {
    let item = (self.normalize)(item);
    self.items.lock().await.contains(&item)
  }

  /// Persist `next` and install it. Caller holds the list lock.
  async fn commit(&self, items: &mut Vec<String>, next: Vec<String>) -> Result<()> {
    self
      .store
      .save_list(self.key, &next)
      .await
      .with_context(|| format!("Failed to save list {}", self.key))?;
    *items = next;
    debug!(key = self.key, count = items.len(), "Saved list written");
    Ok(())
  }

  /// Add `item` if absent, remove it if present. Returns whether it is
  /// now in the list.
  #[instrument(skip(self), fields(key = self.key))]
  pub async fn toggle(&self, item: &str) -> Result<bool> {
    let item = (self.normalize)(item);
    ensure!(!item.is_empty(), "cannot save a blank entry");

    let mut items = self.items.lock().await;
    let mut next = items.clone();
    let now_present = if let Some(pos) = next.iter().position(|i| *i == item) {
      next.remove(pos);
      false
    } else {
      next.push(item);
      true
    };
    self.commit(&mut items, next).await?;
    Ok(now_present)
  }

  /// Move the entry at `from` to position `to` (clamped to the end).
  #[instrument(skip(self), fields(key = self.key))]
  pub async fn move_item(&self, from: usize, to: usize) -> Result<()> {
    let mut items = self.items.lock().await;
    ensure!(from < items.len(), "index {from} out of range for {} items", items.len());
    if from == to {
      return Ok(());
    }

    let mut next = items.clone();
    let entry = next.remove(from);
    let to = to.min(next.len());
    next.insert(to, entry);
    self.commit(&mut items, next).await
  }
}
