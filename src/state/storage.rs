//! Storage abstraction for the notification state.
//!
//! Implementations only persist; TTL and cap logic live in
//! [`NotificationState`](super::NotificationState).

use crate::state::DedupEntry;
use crate::types::lenient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Durable backing store for dedup entries.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Everything persisted so far. A missing store is empty, not an error.
    async fn load_all(&self) -> Result<HashMap<String, DedupEntry>>;

    /// Insert or replace one entry.
    async fn upsert(&self, key: &str, entry: &DedupEntry) -> Result<()>;

    /// Remove the given keys. Unknown keys are ignored.
    async fn remove(&self, keys: &[String]) -> Result<()>;

    async fn health_check(&self) -> Result<bool>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Process-local storage. Shared through an `Arc`, it also stands in for a
/// durable store across two `NotificationState`s in tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, DedupEntry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStorage for MemoryStorage {
    async fn load_all(&self) -> Result<HashMap<String, DedupEntry>> {
        Ok(self.entries.lock().await.clone())
    }

    async fn upsert(&self, key: &str, entry: &DedupEntry) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// A single pretty-printed JSON object `key -> entry`, rewritten on every
/// change through a temp file and rename.
pub struct JsonFileStorage {
    path: PathBuf,
    mirror: Mutex<HashMap<String, DedupEntry>>,
}

impl JsonFileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mirror: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, entries: &HashMap<String, DedupEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create state directory {:?}", parent))?;
            }
        }

        let contents =
            serde_json::to_string_pretty(entries).context("Failed to serialize notification state")?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .with_context(|| format!("Failed to create temp state file {:?}", temp_path))?;
        file.write_all(contents.as_bytes())
            .await
            .with_context(|| format!("Failed to write temp state file {:?}", temp_path))?;
        file.sync_all()
            .await
            .with_context(|| format!("Failed to sync temp state file {:?}", temp_path))?;
        drop(file);
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace state file {:?}", self.path))?;

        debug!("Wrote {} entries to {:?}", entries.len(), self.path);
        Ok(())
    }
}

#[async_trait]
impl StateStorage for JsonFileStorage {
    async fn load_all(&self) -> Result<HashMap<String, DedupEntry>> {
        let mut mirror = self.mirror.lock().await;

        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            info!("No state file at {:?}, starting fresh", self.path);
            mirror.clear();
            return Ok(HashMap::new());
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read state file {:?}", self.path))?;
        let entries: HashMap<String, DedupEntry> = if contents.trim().is_empty() {
            HashMap::new()
        } else {
            let raw: serde_json::Value = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse state file {:?}", self.path))?;
            if !raw.is_object() {
                bail!("State file {:?} is not a JSON object", self.path);
            }
            // A single unreadable entry is dropped, not the whole file
            lenient::record_map_from(raw)
        };

        *mirror = entries.clone();
        Ok(entries)
    }

    async fn upsert(&self, key: &str, entry: &DedupEntry) -> Result<()> {
        let mut mirror = self.mirror.lock().await;
        mirror.insert(key.to_string(), entry.clone());
        self.write(&mirror).await
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let mut mirror = self.mirror.lock().await;
        let before = mirror.len();
        for key in keys {
            mirror.remove(key);
        }
        if mirror.len() == before {
            return Ok(());
        }
        self.write(&mirror).await
    }

    async fn health_check(&self) -> Result<bool> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                Ok(tokio::fs::try_exists(parent).await.unwrap_or(false))
            }
            _ => Ok(true),
        }
    }

    fn describe(&self) -> String {
        format!("json file {}", self.path.display())
    }
}
