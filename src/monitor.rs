//! Monitoring cycle.
//!
//! One cycle: sweep the dedup store, fetch candidates, prefilter, score and
//! select per category, deliver, then mark what was delivered. The daemon runs
//! cycles back to back on a fixed interval; a cycle never overlaps the next.

use crate::config::ScreeningConfig;
use crate::oracle::scorer::CompositeScorer;
use crate::oracle::selection::{exclude_dangerous, prefilter, select_top_at, Selected};
use crate::oracle::types::ScoringContext;
use crate::state::{CleanupReport, EventCategory, NotificationState};
use crate::types::{Candidate, SafetyReport, SmartMoneyReport};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Where candidates come from.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Candidate>>;

    /// Safety and smart money reports for the candidates of the last fetch.
    async fn context(&self, candidates: &[Candidate]) -> Result<ScoringContext>;
}

/// Where selected candidates go.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one batch. Nothing is marked notified unless this returns `Ok`.
    async fn deliver(&self, batch: &NotificationBatch) -> Result<()>;
}

/// Ordered selection for one category.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationBatch {
    pub category: EventCategory,
    pub entries: Vec<Selected>,
    pub generated_at: DateTime<Utc>,
}

/// Summary of one cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub eligible: usize,
    pub excluded_danger: usize,
    pub notified_tokens: usize,
    pub notified_graduations: usize,
    pub delivery_failures: usize,
    pub cleanup: CleanupReport,
}

pub struct MonitorCycle {
    scorer: CompositeScorer,
    state: Arc<NotificationState>,
    source: Arc<dyn CandidateSource>,
    sink: Arc<dyn NotificationSink>,
    screening: ScreeningConfig,
}

impl MonitorCycle {
    pub fn new(
        scorer: CompositeScorer,
        state: Arc<NotificationState>,
        source: Arc<dyn CandidateSource>,
        sink: Arc<dyn NotificationSink>,
        screening: ScreeningConfig,
    ) -> Self {
        Self {
            scorer,
            state,
            source,
            sink,
            screening,
        }
    }

    pub fn state(&self) -> &Arc<NotificationState> {
        &self.state
    }

    pub async fn run_once(&self) -> Result<CycleReport> {
        self.run_once_at(Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let mut report = CycleReport {
            cleanup: self.state.cleanup_at(now).await,
            ..Default::default()
        };

        let (eligible, graduated, context) = self.gather(&mut report).await?;

        let notified = self
            .select_and_deliver(eligible, &context, EventCategory::Token, now, &mut report)
            .await;
        report.notified_tokens = notified;
        if !graduated.is_empty() {
            let notified = self
                .select_and_deliver(graduated, &context, EventCategory::Graduation, now, &mut report)
                .await;
            report.notified_graduations = notified;
        }

        info!(
            "Cycle done: fetched={} eligible={} notified={} graduations={} (dedup entries: {})",
            report.fetched,
            report.eligible,
            report.notified_tokens,
            report.notified_graduations,
            self.state.len().await
        );
        Ok(report)
    }

    /// What the next cycle would deliver, per category, with at most `n` entries
    /// each. Nothing is delivered or marked.
    pub async fn preview(&self, n: usize) -> Result<Vec<NotificationBatch>> {
        self.preview_at(n, Utc::now()).await
    }

    pub async fn preview_at(&self, n: usize, now: DateTime<Utc>) -> Result<Vec<NotificationBatch>> {
        let mut report = CycleReport::default();
        let (eligible, graduated, context) = self.gather(&mut report).await?;

        let mut batches = Vec::new();
        for (category, candidates) in [
            (EventCategory::Token, eligible),
            (EventCategory::Graduation, graduated),
        ] {
            let entries =
                select_top_at(&self.scorer, candidates, n, &self.state, &context, category, now).await;
            if !entries.is_empty() {
                batches.push(NotificationBatch {
                    category,
                    entries,
                    generated_at: now,
                });
            }
        }
        Ok(batches)
    }

    /// Fetch, prefilter and drop dangerous candidates. Returns the eligible
    /// candidates, the graduated subset and the scoring context.
    async fn gather(
        &self,
        report: &mut CycleReport,
    ) -> Result<(Vec<Candidate>, Vec<Candidate>, ScoringContext)> {
        let candidates = self.source.fetch().await.context("Failed to fetch candidates")?;
        report.fetched = candidates.len();

        let context = match self.source.context(&candidates).await {
            Ok(context) => context,
            Err(e) => {
                warn!("Safety/smart money context unavailable, scoring without it: {:#}", e);
                ScoringContext::new()
            }
        };

        let mut eligible = prefilter(candidates, &self.screening);
        if self.screening.danger_auto_exclude {
            let before = eligible.len();
            eligible = exclude_dangerous(eligible, &context);
            report.excluded_danger = before - eligible.len();
        }
        report.eligible = eligible.len();

        let graduated: Vec<Candidate> = if self.screening.notify_graduations {
            eligible.iter().filter(|c| c.is_graduated).cloned().collect()
        } else {
            Vec::new()
        };
        Ok((eligible, graduated, context))
    }

    /// Returns how many entries were delivered and marked.
    async fn select_and_deliver(
        &self,
        candidates: Vec<Candidate>,
        context: &ScoringContext,
        category: EventCategory,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> usize {
        let entries = select_top_at(
            &self.scorer,
            candidates,
            self.screening.top_n,
            &self.state,
            context,
            category,
            now,
        )
        .await;
        if entries.is_empty() {
            debug!("Nothing new to notify for {}", category);
            return 0;
        }

        let batch = NotificationBatch {
            category,
            entries,
            generated_at: now,
        };
        if let Err(e) = self.sink.deliver(&batch).await {
            error!("Failed to deliver {} batch, nothing marked: {:#}", category, e);
            report.delivery_failures += 1;
            return 0;
        }

        for entry in &batch.entries {
            self.state
                .mark_notified_at(&entry.key, entry.candidate.label(), entry.total_score, now)
                .await;
        }
        batch.entries.len()
    }

    /// Run cycles every `interval` until `shutdown` resolves. A cycle in flight
    /// when shutdown arrives is abandoned.
    pub async fn run_daemon<F>(&self, interval: std::time::Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("Monitor daemon running every {:?}", interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping monitor");
                    break;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = &mut shutdown => {
                            warn!("Shutdown requested mid-cycle, abandoning it");
                            break;
                        }
                        result = self.run_once() => {
                            if let Err(e) = result {
                                error!("Monitoring cycle failed: {:#}", e);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Snapshot written by the fetch layer: candidates plus reports keyed by token address.
///
/// Records are parsed one by one; an unreadable record is skipped, not the whole feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSnapshot {
    #[serde(deserialize_with = "crate::types::lenient::records")]
    pub candidates: Vec<Candidate>,
    #[serde(deserialize_with = "crate::types::lenient::record_map")]
    pub safety: HashMap<String, SafetyReport>,
    #[serde(deserialize_with = "crate::types::lenient::record_map")]
    pub smart_money: HashMap<String, SmartMoneyReport>,
}

/// Reads candidates from a JSON [`FeedSnapshot`] file on every fetch.
pub struct JsonFeedSource {
    path: PathBuf,
    last_context: Mutex<ScoringContext>,
}

impl JsonFeedSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            last_context: Mutex::new(ScoringContext::new()),
        }
    }
}

#[async_trait]
impl CandidateSource for JsonFeedSource {
    async fn fetch(&self) -> Result<Vec<Candidate>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            warn!("Feed file {:?} not found, no candidates this cycle", self.path);
            *self.last_context.lock().await = ScoringContext::new();
            return Ok(Vec::new());
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read feed file {:?}", self.path))?;
        let snapshot: FeedSnapshot = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse feed file {:?}", self.path))?;

        debug!(
            "Feed: {} candidates, {} safety reports, {} smart money reports",
            snapshot.candidates.len(),
            snapshot.safety.len(),
            snapshot.smart_money.len()
        );
        *self.last_context.lock().await = ScoringContext {
            safety: snapshot.safety,
            smart_money: snapshot.smart_money,
        };
        Ok(snapshot.candidates)
    }

    async fn context(&self, _candidates: &[Candidate]) -> Result<ScoringContext> {
        Ok(self.last_context.lock().await.clone())
    }
}

/// Writes each batch to the log.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, batch: &NotificationBatch) -> Result<()> {
        info!("=== {} notifications ({}) ===", batch.category, batch.entries.len());
        for (rank, entry) in batch.entries.iter().enumerate() {
            info!(
                "#{} {} [{}] score {:.1} - {}",
                rank + 1,
                entry.candidate.label(),
                entry.key,
                entry.total_score,
                entry.breakdown.reason
            );
        }
        Ok(())
    }
}
