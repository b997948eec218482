//! Preference Store - Atomic JSON Key-Value File
//!
//! Keeps every saved list in one `preferences.json` document shaped
//! `{ "key": ["value", ...] }`. Each save rewrites the whole document via
//! a tmp file and a rename, so the file on disk is always either the old
//! or the new version.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::ports::PreferenceStore;

type Document = BTreeMap<String, Vec<String>>;

/// JSON file preference store.
pub struct JsonPreferenceStore {
    /// Path to preferences.json.
    path: PathBuf,
    /// Temporary path for atomic writes.
    tmp_path: PathBuf,
    /// In-memory copy of the document; the lock also orders file writes.
    document: Mutex<Document>,
}

impl JsonPreferenceStore {
    /// Open (or create) the store in `data_dir`.
    ///
    /// An unreadable or corrupt document is logged and replaced by an
    /// empty one on the next save.
    pub async fn open(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir);
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create data directory {data_dir}"))?;

        let path = dir.join("preferences.json");
        let document = match fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str::<Document>(&json).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Corrupt preferences file, starting empty");
                Document::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No preferences file found, starting fresh");
                Document::new()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        Ok(Self {
            tmp_path: dir.join("preferences.json.tmp"),
            path,
            document: Mutex::new(document),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PreferenceStore for JsonPreferenceStore {
    async fn load_list(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.document.lock().await.get(key).cloned().unwrap_or_default())
    }

    #[instrument(skip(self, values), fields(count = values.len()))]
    async fn save_list(&self, key: &str, values: &[String]) -> Result<()> {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        next.insert(key.to_string(), values.to_vec());

        let json = serde_json::to_string_pretty(&next).context("Failed to serialize preferences")?;
        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp preferences file")?;
        fs::rename(&self.tmp_path, &self.path)
            .await
            .context("Failed to rename preferences file")?;

        *document = next;
        debug!(path = %self.path.display(), "Preferences saved");
        Ok(())
    }
}
