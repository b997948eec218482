//! Preference Store Port - External Key-Value Collaborator
//!
//! Models the platform preference store: flat string lists keyed by name,
//! always read and written wholesale.

use async_trait::async_trait;

/// Key-value store of string lists.
///
/// Writes replace the whole list. Callers are responsible for serializing
/// read-modify-write cycles.
#[async_trait]
pub trait PreferenceStore: Send + Sync + 'static {
  /// Load the list under `key`; a missing key is an empty list.
  async fn load_list(&self, key: &str) -> anyhow::Result<Vec<String>>;

  /// Replace the list under `key`.
  async fn save_list(&self, key: &str, values: &[String]) -> anyhow::Result<()>;
}
