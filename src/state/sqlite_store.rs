//! SQLite backend for the notification state.
//!
//! One row per dedup key in the `notified` table; timestamps are stored as
//! Unix milliseconds.

use crate::state::storage::StateStorage;
use crate::state::DedupEntry;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, Pool, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(FromRow)]
struct NotifiedRow {
    key: String,
    label: String,
    score: f64,
    notified_at: i64,
}

pub struct SqliteStateStorage {
    pool: Pool<Sqlite>,
    location: String,
}

impl SqliteStateStorage {
    /// Open (creating if needed) the database at `path`.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create database directory {:?}", parent))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{}?mode=rwc", path.display()))
            .await
            .context("Failed to connect to SQLite database")?;

        Self::create_schema(&pool).await?;
        info!("SQLite notification state at {}", path.display());

        Ok(Self {
            pool,
            location: path.display().to_string(),
        })
    }

    /// In-memory database, for tests. A single connection keeps it alive.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;

        Self::create_schema(&pool).await?;

        Ok(Self {
            pool,
            location: ":memory:".to_string(),
        })
    }

    async fn create_schema(pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notified (
                key TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                score REAL NOT NULL,
                notified_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await
        .context("Failed to create notified table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_notified_at ON notified(notified_at);")
            .execute(pool)
            .await
            .context("Failed to create notified_at index")?;

        Ok(())
    }
}

#[async_trait]
impl StateStorage for SqliteStateStorage {
    async fn load_all(&self) -> Result<HashMap<String, DedupEntry>> {
        let rows: Vec<NotifiedRow> =
            sqlx::query_as("SELECT key, label, score, notified_at FROM notified")
                .fetch_all(&self.pool)
                .await
                .context("Failed to load notified rows")?;

        let mut entries = HashMap::with_capacity(rows.len());
        for row in rows {
            match DateTime::from_timestamp_millis(row.notified_at) {
                Some(notified_at) => {
                    entries.insert(row.key, DedupEntry::new(row.label, row.score, notified_at));
                }
                None => warn!("Skipping row {} with invalid timestamp {}", row.key, row.notified_at),
            }
        }

        debug!("Loaded {} rows from notified", entries.len());
        Ok(entries)
    }

    async fn upsert(&self, key: &str, entry: &DedupEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notified (key, label, score, notified_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                label = excluded.label,
                score = excluded.score,
                notified_at = excluded.notified_at
            "#,
        )
        .bind(key)
        .bind(&entry.label)
        .bind(entry.score)
        .bind(entry.notified_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert notified key {}", key))?;

        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for key in keys {
            sqlx::query("DELETE FROM notified WHERE key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to delete notified key {}", key))?;
        }
        tx.commit().await.context("Failed to commit removals")?;

        debug!("Removed {} notified rows", keys.len());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let result = sqlx::query("SELECT 1").fetch_one(&self.pool).await;
        Ok(result.is_ok())
    }

    fn describe(&self) -> String {
        format!("sqlite {}", self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_upsert_replaces_row() {
        let storage = SqliteStateStorage::in_memory().await.unwrap();
        let now = Utc::now();

        storage.upsert("So1A", &DedupEntry::new("A", 10.0, now)).await.unwrap();
        storage
            .upsert("So1A", &DedupEntry::new("A", 55.5, now + Duration::minutes(5)))
            .await
            .unwrap();

        let loaded = storage.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["So1A"].score, 55.5);
        assert_eq!(
            loaded["So1A"].notified_at.timestamp_millis(),
            (now + Duration::minutes(5)).timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_remove_batch() {
        let storage = SqliteStateStorage::in_memory().await.unwrap();
        let now = Utc::now();
        for key in ["a", "b", "c"] {
            storage.upsert(key, &DedupEntry::new(key, 1.0, now)).await.unwrap();
        }

        storage
            .remove(&["a".to_string(), "c".to_string(), "zzz".to_string()])
            .await
            .unwrap();

        let loaded = storage.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("b"));
        assert!(storage.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        let storage = SqliteStateStorage::new(&path).await.unwrap();
        storage.upsert("grad_So1B", &DedupEntry::new("B", 42.0, Utc::now())).await.unwrap();
        drop(storage);

        let reopened = SqliteStateStorage::new(&path).await.unwrap();
        assert!(reopened.load_all().await.unwrap().contains_key("grad_So1B"));
    }
}
