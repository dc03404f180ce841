//! Notification deduplication store.
//!
//! Remembers which events were already surfaced so the same token (or airdrop,
//! or NFT collection) is not announced twice within the TTL window. Entries
//! expire lazily on lookup; [`NotificationState::cleanup`] sweeps the rest and
//! enforces the entry cap.
//!
//! The in-memory map is authoritative. The backing [`StateStorage`] only has to
//! survive restarts: a failed load starts empty and a failed write switches the
//! store to memory-only for the rest of the process lifetime.

pub mod sqlite_store;
pub mod storage;

pub use sqlite_store::SqliteStateStorage;
pub use storage::{JsonFileStorage, MemoryStorage, StateStorage};

use crate::config::{DedupConfig, StateBackend};
use crate::types::Candidate;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Upper bound on the TTL (about a century).
const MAX_TTL_HOURS: u64 = 24 * 365 * 100;

/// One "already notified" marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupEntry {
    #[serde(alias = "symbol", default, deserialize_with = "crate::types::lenient::string")]
    pub label: String,
    #[serde(default, deserialize_with = "crate::types::lenient::f64")]
    pub score: f64,
    pub notified_at: DateTime<Utc>,
}

impl DedupEntry {
    pub fn new(label: impl Into<String>, score: f64, notified_at: DateTime<Utc>) -> Self {
        Self {
            label: label.into(),
            score,
            notified_at,
        }
    }
}

/// Whether a marker set at `notified_at` has outlived `ttl` by `now`.
pub fn is_expired(notified_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now - notified_at >= ttl
}

/// Notification category. Each one owns a disjoint key namespace, so the same
/// token can be announced once as a listing and once as a graduation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Token,
    Graduation,
    Airdrop,
    NftFloor,
}

impl EventCategory {
    pub fn prefix(&self) -> &'static str {
        match self {
            EventCategory::Token => "",
            EventCategory::Graduation => "grad_",
            EventCategory::Airdrop => "airdrop_",
            EventCategory::NftFloor => "nft_",
        }
    }

    /// Identities in this category are human-readable names, not addresses.
    pub fn uses_names(&self) -> bool {
        matches!(self, EventCategory::Airdrop | EventCategory::NftFloor)
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventCategory::Token => "token",
            EventCategory::Graduation => "graduation",
            EventCategory::Airdrop => "airdrop",
            EventCategory::NftFloor => "nft_floor",
        };
        f.write_str(name)
    }
}

/// Canonical form of a human-readable identity.
///
/// Lower-cases, collapses whitespace runs to `_` and drops anything outside
/// `[a-z0-9_-]`. A name with no ASCII letter or digit at all (e.g. written in
/// Japanese) keeps its collapsed form instead, so it still gets a key of its own.
pub fn normalize_key(raw: &str) -> String {
    let collapsed = raw.to_lowercase().split_whitespace().collect::<Vec<_>>().join("_");
    let normalized: String = collapsed
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect();
    if normalized.chars().any(|c| c.is_ascii_alphanumeric()) {
        normalized
    } else {
        collapsed
    }
}

/// A namespaced dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    category: EventCategory,
    key: String,
}

impl DedupKey {
    /// Token addresses are used verbatim; names are normalized first.
    pub fn new(category: EventCategory, identity: &str) -> Self {
        let identity = if category.uses_names() {
            normalize_key(identity)
        } else {
            identity.to_string()
        };
        Self {
            category,
            key: format!("{}{}", category.prefix(), identity),
        }
    }

    pub fn for_candidate(category: EventCategory, candidate: &Candidate) -> Self {
        if category.uses_names() {
            let name = if candidate.name.trim().is_empty() {
                candidate.label()
            } else {
                candidate.name.as_str()
            };
            Self::new(category, name)
        } else {
            Self::new(category, candidate.identity())
        }
    }

    pub fn category(&self) -> EventCategory {
        self.category
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl AsRef<str> for DedupKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Counters for monitoring the store.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DedupStats {
    pub lookups: u64,
    pub hits: u64,
    pub marks: u64,
    pub lazy_evictions: u64,
    pub expired_evictions: u64,
    pub cap_evictions: u64,
    pub persist_failures: u64,
}

/// Result of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired: usize,
    pub capped: usize,
    pub remaining: usize,
}

struct Inner {
    entries: HashMap<String, DedupEntry>,
    stats: DedupStats,
}

/// The dedup store.
pub struct NotificationState {
    inner: Mutex<Inner>,
    storage: Arc<dyn StateStorage>,
    degraded: AtomicBool,
    ttl: Duration,
    max_entries: usize,
}

impl NotificationState {
    /// Load persisted entries. Unreadable or corrupt state starts empty.
    pub async fn open(storage: Arc<dyn StateStorage>, ttl_hours: u64, max_entries: usize) -> Self {
        let entries = match storage.load_all().await {
            Ok(entries) => {
                info!(
                    "Loaded {} notified entries from {}",
                    entries.len(),
                    storage.describe()
                );
                entries
            }
            Err(e) => {
                warn!(
                    "Failed to load notification state from {}, starting empty: {:#}",
                    storage.describe(),
                    e
                );
                HashMap::new()
            }
        };

        Self {
            inner: Mutex::new(Inner {
                entries,
                stats: DedupStats::default(),
            }),
            storage,
            degraded: AtomicBool::new(false),
            ttl: Duration::hours(ttl_hours.min(MAX_TTL_HOURS) as i64),
            max_entries,
        }
    }

    /// Memory-only store, nothing survives the process.
    pub async fn in_memory(ttl_hours: u64, max_entries: usize) -> Self {
        Self::open(Arc::new(MemoryStorage::new()), ttl_hours, max_entries).await
    }

    /// Open the configured backend. A SQLite connection failure degrades to memory.
    pub async fn from_config(config: &DedupConfig) -> Self {
        let storage: Arc<dyn StateStorage> = match config.backend {
            StateBackend::Json => Arc::new(JsonFileStorage::new(&config.state_path)),
            StateBackend::Memory => Arc::new(MemoryStorage::new()),
            StateBackend::Sqlite => match SqliteStateStorage::new(&config.sqlite_path).await {
                Ok(storage) => Arc::new(storage),
                Err(e) => {
                    warn!(
                        "SQLite state unavailable at {:?}, keeping notifications in memory: {:#}",
                        config.sqlite_path, e
                    );
                    let state = Self::in_memory(config.ttl_hours, config.max_entries).await;
                    state.degraded.store(true, Ordering::SeqCst);
                    return state;
                }
            },
        };
        Self::open(storage, config.ttl_hours, config.max_entries).await
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// True once a persistence failure has switched the store to memory-only.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub async fn is_notified(&self, key: impl AsRef<str>) -> bool {
        self.is_notified_at(key, Utc::now()).await
    }

    /// Lookup with lazy eviction: an expired entry is removed and reported unseen.
    pub async fn is_notified_at(&self, key: impl AsRef<str>, now: DateTime<Utc>) -> bool {
        let key = key.as_ref();
        let mut inner = self.inner.lock().await;
        inner.stats.lookups += 1;

        let expired = match inner.entries.get(key) {
            None => return false,
            Some(entry) => is_expired(entry.notified_at, now, self.ttl),
        };

        if expired {
            inner.entries.remove(key);
            inner.stats.lazy_evictions += 1;
            debug!("Lazily evicted expired key {}", key);
            self.persist_removal(&mut inner, &[key.to_string()]).await;
            false
        } else {
            inner.stats.hits += 1;
            true
        }
    }

    pub async fn mark_notified(&self, key: impl AsRef<str>, label: &str, score: f64) {
        self.mark_notified_at(key, label, score, Utc::now()).await
    }

    #[instrument(skip(self, key))]
    pub async fn mark_notified_at(
        &self,
        key: impl AsRef<str>,
        label: &str,
        score: f64,
        now: DateTime<Utc>,
    ) {
        let key = key.as_ref();
        let score = if score.is_finite() {
            score
        } else {
            debug!("Non-finite score {} for {} stored as 0", score, key);
            0.0
        };
        let entry = DedupEntry::new(label, score, now);
        let mut inner = self.inner.lock().await;
        inner.entries.insert(key.to_string(), entry.clone());
        inner.stats.marks += 1;

        if self.is_degraded() {
            return;
        }
        if let Err(e) = self.storage.upsert(key, &entry).await {
            self.degrade(&mut inner, "upsert", &e);
        }
    }

    pub async fn cleanup(&self) -> CleanupReport {
        self.cleanup_at(Utc::now()).await
    }

    /// Evict every expired entry, then if still above the cap keep only the
    /// newest `max_entries / 2`.
    #[instrument(skip(self))]
    pub async fn cleanup_at(&self, now: DateTime<Utc>) -> CleanupReport {
        let mut inner = self.inner.lock().await;

        let mut removed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| is_expired(e.notified_at, now, self.ttl))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &removed {
            inner.entries.remove(key);
        }
        let expired = removed.len();

        let mut capped = 0;
        if inner.entries.len() > self.max_entries {
            let keep = self.max_entries / 2;
            let mut by_age: Vec<(String, DateTime<Utc>)> = inner
                .entries
                .iter()
                .map(|(k, e)| (k.clone(), e.notified_at))
                .collect();
            // Newest first, key as tie-break so the survivors are deterministic
            by_age.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            for (key, _) in by_age.into_iter().skip(keep) {
                inner.entries.remove(&key);
                removed.push(key);
                capped += 1;
            }
        }

        inner.stats.expired_evictions += expired as u64;
        inner.stats.cap_evictions += capped as u64;
        if !removed.is_empty() {
            self.persist_removal(&mut inner, &removed).await;
        }

        let report = CleanupReport {
            expired,
            capped,
            remaining: inner.entries.len(),
        };
        info!(
            "Notification state cleanup: {} expired, {} over cap, {} remaining",
            report.expired, report.capped, report.remaining
        );
        report
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Raw presence check, ignoring TTL and without evicting.
    pub async fn contains_raw(&self, key: impl AsRef<str>) -> bool {
        self.inner.lock().await.entries.contains_key(key.as_ref())
    }

    pub async fn get(&self, key: impl AsRef<str>) -> Option<DedupEntry> {
        self.inner.lock().await.entries.get(key.as_ref()).cloned()
    }

    /// All entries, newest first.
    pub async fn snapshot(&self) -> Vec<(String, DedupEntry)> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<(String, DedupEntry)> = inner
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();
        entries.sort_by(|a, b| b.1.notified_at.cmp(&a.1.notified_at).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    pub async fn stats(&self) -> DedupStats {
        self.inner.lock().await.stats.clone()
    }

    pub fn storage_description(&self) -> String {
        self.storage.describe()
    }

    async fn persist_removal(&self, inner: &mut Inner, keys: &[String]) {
        if self.is_degraded() {
            return;
        }
        if let Err(e) = self.storage.remove(keys).await {
            self.degrade(inner, "remove", &e);
        }
    }

    fn degrade(&self, inner: &mut Inner, op: &str, error: &anyhow::Error) {
        inner.stats.persist_failures += 1;
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!(
                "Notification state {} failed on {}, continuing in memory only: {:#}",
                op,
                self.storage.describe(),
                error
            );
        }
    }
}
