//! End-to-end scoring scenarios and monitoring cycles

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sol_screener::config::ScreeningConfig;
use sol_screener::monitor::{CandidateSource, MonitorCycle, NotificationBatch, NotificationSink};
use sol_screener::oracle::{select_top_at, Component, CompositeScorer, ScoringContext};
use sol_screener::state::{DedupKey, EventCategory, NotificationState};
use sol_screener::types::{Authority, Candidate, RiskLevel, SafetyReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

fn reference_candidate(address: &str, now: DateTime<Utc>) -> Candidate {
    let mut c = Candidate::new(address, "REF");
    c.liquidity_usd = 50_000.0;
    c.volume_24h_usd = 20_000.0;
    c.price_change_24h = 15.0;
    c.tx_count_24h = 500.0;
    c.makers_24h = 80.0;
    c.created_at = Some(now - Duration::hours(6));
    c.twitter_handle = Some("ref_token".to_string());
    c.website_url = Some("https://ref.example".to_string());
    c
}

fn reference_safety(risk_level: RiskLevel) -> SafetyReport {
    SafetyReport {
        risk_level,
        lp_locked_pct: Some(95.0),
        mint_authority: Authority::Renounced,
        top_holders_pct: Some(18.0),
        insider_count: Some(0),
        ..Default::default()
    }
}

#[test]
fn test_safe_reference_candidate() {
    let now = Utc::now();
    let scorer = CompositeScorer::default();
    let mut candidate = reference_candidate("So1Ref", now);
    let safety = reference_safety(RiskLevel::Safe);

    let total = scorer.score_at(&mut candidate, Some(&safety), None, now);
    let breakdown = candidate.scores.clone().unwrap();

    for component in [
        Component::Liquidity,
        Component::Volume,
        Component::PriceChange,
        Component::TxCount,
        Component::Makers,
        Component::SafetyData,
        Component::Age,
    ] {
        let value = breakdown.components.get(component);
        assert!((80.0..=100.0).contains(&value), "{} = {}", component.as_str(), value);
    }
    // twitter 40 + website 30
    assert_eq!(breakdown.components.get(Component::Social), 70.0);

    assert_eq!(breakdown.adjustments.safety, 5.0);
    assert_eq!(breakdown.adjustments.graduation, 0.0);
    assert_eq!(breakdown.adjustments.smart_money, 0.0);
    assert!(breakdown.adjustments.trust_combo >= 5.0);
    assert!(total <= 100.0 && total > 85.0, "total {}", total);
}

#[test]
fn test_danger_penalty_dominates() {
    let now = Utc::now();
    let scorer = CompositeScorer::default();

    let mut safe = reference_candidate("So1Ref", now);
    let safe_total = scorer.score_at(&mut safe, Some(&reference_safety(RiskLevel::Safe)), None, now);

    let mut danger = reference_candidate("So1Ref", now);
    let danger_total =
        scorer.score_at(&mut danger, Some(&reference_safety(RiskLevel::Danger)), None, now);

    assert!(safe_total - danger_total >= 25.0, "{} vs {}", safe_total, danger_total);
    assert_eq!(danger.scores.unwrap().adjustments.safety, -25.0);
}

#[tokio::test]
async fn test_categories_deduplicate_independently() {
    let now = Utc::now();
    let scorer = CompositeScorer::default();
    let state = NotificationState::in_memory(24, 1000).await;
    let context = ScoringContext::new();

    let mut graduated = reference_candidate("So1Grad", now);
    graduated.is_graduated = true;

    let grads = select_top_at(
        &scorer,
        vec![graduated.clone()],
        5,
        &state,
        &context,
        EventCategory::Graduation,
        now,
    )
    .await;
    assert_eq!(grads.len(), 1);
    assert_eq!(grads[0].key.as_str(), "grad_So1Grad");
    state
        .mark_notified_at(&grads[0].key, grads[0].candidate.label(), grads[0].total_score, now)
        .await;

    let tokens = select_top_at(
        &scorer,
        vec![graduated.clone()],
        5,
        &state,
        &context,
        EventCategory::Token,
        now + Duration::minutes(5),
    )
    .await;
    assert_eq!(tokens.len(), 1, "graduation marker must not suppress the listing");
    assert_eq!(tokens[0].key.as_str(), "So1Grad");

    let again = select_top_at(
        &scorer,
        vec![graduated],
        5,
        &state,
        &context,
        EventCategory::Graduation,
        now + Duration::minutes(10),
    )
    .await;
    assert!(again.is_empty());
}

struct StaticSource {
    candidates: Vec<Candidate>,
    context: ScoringContext,
    fail_context: bool,
}

#[async_trait]
impl CandidateSource for StaticSource {
    async fn fetch(&self) -> Result<Vec<Candidate>> {
        Ok(self.candidates.clone())
    }

    async fn context(&self, _candidates: &[Candidate]) -> Result<ScoringContext> {
        if self.fail_context {
            Err(anyhow!("safety provider timed out"))
        } else {
            Ok(self.context.clone())
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<NotificationBatch>>,
    fail: AtomicBool,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, batch: &NotificationBatch) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("channel unavailable"));
        }
        self.batches.lock().await.push(batch.clone());
        Ok(())
    }
}

fn cycle_fixture(now: DateTime<Utc>) -> (Vec<Candidate>, ScoringContext) {
    let mut grad = reference_candidate("So1Grad", now);
    grad.is_graduated = true;
    let plain = reference_candidate("So1Plain", now);
    let rug = reference_candidate("So1Rug", now);
    let mut dust = reference_candidate("So1Dust", now);
    dust.liquidity_usd = 200.0;

    let context = ScoringContext::new()
        .with_safety("So1Plain", reference_safety(RiskLevel::Safe))
        .with_safety("So1Rug", reference_safety(RiskLevel::Danger));
    (vec![grad, plain, rug, dust], context)
}

#[tokio::test]
async fn test_monitor_cycle_marks_only_delivered() {
    let now = Utc::now();
    let (candidates, context) = cycle_fixture(now);
    let state = Arc::new(NotificationState::in_memory(24, 1000).await);
    let sink = Arc::new(RecordingSink::default());
    let cycle = MonitorCycle::new(
        CompositeScorer::default(),
        state.clone(),
        Arc::new(StaticSource {
            candidates,
            context,
            fail_context: false,
        }),
        sink.clone(),
        ScreeningConfig::default(),
    );

    // Failed delivery marks nothing
    sink.fail.store(true, Ordering::SeqCst);
    let report = cycle.run_once_at(now).await.unwrap();
    assert_eq!(report.fetched, 4);
    assert_eq!(report.eligible, 2);
    assert_eq!(report.excluded_danger, 1);
    assert_eq!(report.notified_tokens, 0);
    assert_eq!(report.delivery_failures, 2);
    assert!(state.is_empty().await);

    sink.fail.store(false, Ordering::SeqCst);
    let report = cycle.run_once_at(now + Duration::minutes(5)).await.unwrap();
    assert_eq!(report.notified_tokens, 2);
    assert_eq!(report.notified_graduations, 1);

    {
        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].category, EventCategory::Token);
        // safe report and its trust signals outrank the unknown-safety candidate
        assert_eq!(batches[0].entries[0].key.as_str(), "So1Plain");
        assert!(batches[0].entries[0].total_score >= batches[0].entries[1].total_score);
        assert_eq!(batches[1].category, EventCategory::Graduation);
        assert_eq!(batches[1].entries[0].key.as_str(), "grad_So1Grad");
    }

    assert!(state.contains_raw("So1Plain").await);
    assert!(state.contains_raw(DedupKey::new(EventCategory::Graduation, "So1Grad")).await);
    assert!(!state.contains_raw("So1Rug").await);

    // Nothing new inside the TTL window
    let report = cycle.run_once_at(now + Duration::minutes(10)).await.unwrap();
    assert_eq!(report.notified_tokens, 0);
    assert_eq!(report.notified_graduations, 0);
    assert_eq!(sink.batches.lock().await.len(), 2);

    // Everything is eligible again once the TTL has passed
    let report = cycle.run_once_at(now + Duration::hours(25)).await.unwrap();
    assert_eq!(report.cleanup.expired, 3);
    assert_eq!(report.notified_tokens, 2);
}

#[tokio::test]
async fn test_preview_matches_next_cycle_without_marking() {
    let now = Utc::now();
    let (candidates, context) = cycle_fixture(now);
    let state = Arc::new(NotificationState::in_memory(24, 1000).await);
    let sink = Arc::new(RecordingSink::default());
    let cycle = MonitorCycle::new(
        CompositeScorer::default(),
        state.clone(),
        Arc::new(StaticSource {
            candidates,
            context,
            fail_context: false,
        }),
        sink.clone(),
        ScreeningConfig::default(),
    );

    // a previously notified listing is hidden from the preview as well
    state.mark_notified_at("So1Grad", "REF", 90.0, now).await;

    let preview = cycle.preview_at(5, now).await.unwrap();
    let keys = |batches: &[NotificationBatch]| -> Vec<Vec<String>> {
        batches
            .iter()
            .map(|b| b.entries.iter().map(|e| e.key.to_string()).collect())
            .collect()
    };
    // danger and dust candidates never show up
    assert_eq!(keys(&preview), vec![vec!["So1Plain".to_string()], vec!["grad_So1Grad".to_string()]]);
    assert_eq!(state.len().await, 1);
    assert!(sink.batches.lock().await.is_empty());

    cycle.run_once_at(now).await.unwrap();
    assert_eq!(keys(&sink.batches.lock().await), keys(&preview));
}

#[tokio::test]
async fn test_monitor_cycle_survives_missing_context() {
    let now = Utc::now();
    let (candidates, context) = cycle_fixture(now);
    let state = Arc::new(NotificationState::in_memory(24, 1000).await);
    let sink = Arc::new(RecordingSink::default());
    let cycle = MonitorCycle::new(
        CompositeScorer::default(),
        state,
        Arc::new(StaticSource {
            candidates,
            context,
            fail_context: true,
        }),
        sink.clone(),
        ScreeningConfig {
            top_n: 1,
            ..ScreeningConfig::default()
        },
    );

    let report = cycle.run_once_at(now).await.unwrap();
    // without safety data nothing is excluded
    assert_eq!(report.excluded_danger, 0);
    assert_eq!(report.eligible, 3);
    assert_eq!(report.notified_tokens, 1);

    let batches = sink.batches.lock().await;
    let breakdown = &batches[0].entries[0].breakdown;
    assert_eq!(breakdown.components.get(Component::SafetyData), 30.0);
    assert_eq!(breakdown.adjustments.safety, 0.0);
}

/// Sink that never finishes a delivery.
struct StalledSink {
    entered: Arc<Notify>,
}

#[async_trait]
impl NotificationSink for StalledSink {
    async fn deliver(&self, _batch: &NotificationBatch) -> Result<()> {
        self.entered.notify_one();
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn test_shutdown_during_delivery_marks_nothing() {
    let now = Utc::now();
    let (candidates, context) = cycle_fixture(now);
    let state = Arc::new(NotificationState::in_memory(24, 1000).await);
    let entered = Arc::new(Notify::new());
    let cycle = MonitorCycle::new(
        CompositeScorer::default(),
        state.clone(),
        Arc::new(StaticSource {
            candidates,
            context,
            fail_context: false,
        }),
        Arc::new(StalledSink {
            entered: entered.clone(),
        }),
        ScreeningConfig::default(),
    );

    let shutdown = async move { entered.notified().await };
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        cycle.run_daemon(std::time::Duration::from_secs(3600), shutdown),
    )
    .await
    .expect("daemon did not stop while delivery was stalled");

    assert!(state.is_empty().await);
    assert!(!state.contains_raw("So1Plain").await);
}
